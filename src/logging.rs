//! Diagnostic logging for the watcher.
//!
//! Events go through `tracing` with a `[component]` prefix. Watcher
//! diagnostics (state transitions, failure paths) are gated on the
//! `FILEWATCHER_DEBUG` toggle, read once per process.
//!
//! # Environment Variables
//!
//! ```bash
//! FILEWATCHER_DEBUG=0 filewatcher watch /tmp   # silence watcher diagnostics
//! RUST_LOG=filewatcher=trace filewatcher watch /tmp
//! ```
//!
//! `RUST_LOG` takes precedence over the `[logging]` config section.

use std::ffi::OsStr;
use std::sync::{Once, OnceLock};

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Environment variable holding the debug toggle.
pub const DEBUG_ENV: &str = "FILEWATCHER_DEBUG";

static INIT: Once = Once::new();
static DEBUG: OnceLock<bool> = OnceLock::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Whether watcher diagnostics are enabled.
///
/// Read from `FILEWATCHER_DEBUG` on first call; later changes to the
/// environment are not observed.
pub fn debug_enabled() -> bool {
    *DEBUG.get_or_init(|| parse_debug_flag(std::env::var_os(DEBUG_ENV).as_deref()))
}

/// Interpret a debug toggle value. Unset means enabled.
pub fn parse_debug_flag(value: Option<&OsStr>) -> bool {
    let Some(value) = value else {
        return true;
    };

    let value = value.to_string_lossy();
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
/// Output goes to stderr.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config, debug_enabled()))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with default configuration.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Build an `EnvFilter` directive string from config.
///
/// The debug toggle raises this crate to `debug` unless a module entry
/// already names it.
pub fn filter_directives(config: &LoggingConfig, debug: bool) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    if debug && !config.modules.contains_key("filewatcher") {
        directives.push_str(",filewatcher=debug");
    }
    directives
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("cli", "watching", "{}", path.display());
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        ::tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        ::tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug event, emitted only while the debug toggle is on.
///
/// # Examples
/// ```ignore
/// debug_event!("watcher", "state", "Created -> Open");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        if $crate::logging::debug_enabled() {
            ::tracing::debug!("[{}] {}", $component, $event)
        }
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        if $crate::logging::debug_enabled() {
            ::tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
        }
    };
}

/// Failure-path event, emitted only while the debug toggle is on.
#[macro_export]
macro_rules! warn_event {
    ($component:expr, $event:expr) => {
        if $crate::logging::debug_enabled() {
            ::tracing::warn!("[{}] {}", $component, $event)
        }
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        if $crate::logging::debug_enabled() {
            ::tracing::warn!("[{}] {}: {}", $component, $event, format!($($arg)*))
        }
    };
}
