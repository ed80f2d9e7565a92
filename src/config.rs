//! Configuration for the file watcher.
//!
//! Layered sources, later ones win:
//! - Default values
//! - TOML configuration file (`filewatcher.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FILEWATCHER_` and use double
//! underscores to separate nested levels:
//! - `FILEWATCHER_BUFFER_SIZE=65536` sets `buffer_size`
//! - `FILEWATCHER_LOGGING__DEFAULT=info` sets `logging.default`
//!
//! The debug toggle `FILEWATCHER_DEBUG` is not part of `Settings`; see
//! [`crate::logging::debug_enabled`].

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::watcher::parser::{HEADER_SIZE, MIN_BUFFER_SIZE};

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "filewatcher.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Size in bytes of each watcher's kernel read buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Delay between polls in the CLI loop
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_buffer_size() -> usize {
    1024 * (HEADER_SIZE + 16)
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            poll_interval_ms: default_poll_interval_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, reading `filewatcher.toml` from
    /// the current directory if present.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration using an explicit config file path.
    ///
    /// A missing file is not an error; defaults and env still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FILEWATCHER_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Read buffer size, raised to hold at least one maximal record.
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(MIN_BUFFER_SIZE)
    }
}
