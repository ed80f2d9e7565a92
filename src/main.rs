use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use filewatcher::{FileEvent, Settings, WatchError, Watcher, log_event, logging};

#[derive(Parser)]
#[command(name = "filewatcher")]
#[command(about = "Report created, modified and deleted entries in watched directories")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./filewatcher.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and print events as they arrive
    Watch {
        /// Directories to watch (not recursive)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Delay between polls in milliseconds (overrides config)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Watch {
            paths,
            interval_ms,
            count,
            json,
        } => {
            let interval = Duration::from_millis(interval_ms.unwrap_or(settings.poll_interval_ms));
            run_watch(&settings, &paths, interval, count, json)
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn run_watch(
    settings: &Settings,
    paths: &[PathBuf],
    interval: Duration,
    count: Option<usize>,
    json: bool,
) -> Result<()> {
    let watcher = Watcher::with_settings(settings).context("failed to create watcher")?;

    for path in paths {
        match watcher.watch(path) {
            Ok(()) => log_event!("cli", "watching", "{}", path.display()),
            Err(e @ WatchError::RegistrationFailed { .. }) => eprintln!("warning: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    if watcher.watch_count() == 0 {
        bail!("none of the given paths could be watched");
    }

    let mut delivered = 0usize;
    loop {
        match watcher.poll() {
            Ok(Some(event)) => {
                print_event(&event, json)?;
                delivered += 1;
                if count.is_some_and(|limit| delivered >= limit) {
                    break;
                }
            }
            Ok(None) => sleep(interval),
            Err(WatchError::Decode(e)) => eprintln!("warning: dropped malformed events: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    watcher.destroy();
    Ok(())
}

fn print_event(event: &FileEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{event}");
    }
    Ok(())
}
