pub mod config;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use watcher::{
    DecodeError, EventKind, FileEvent, WatchError, WatchResult, Watcher, WatcherId,
    WatcherRegistry, WatcherState,
};
