//! Watch multiplexer core.
//!
//! One kernel event source serves many watched directories. Raw kernel
//! records are decoded lazily from a read buffer and resolved back to the
//! caller's paths through the watch table.
//!
//! # Architecture
//!
//! ```text
//! WatcherRegistry (handle -> Watcher)
//!   |
//! Watcher (one lock)
//!   - EventSource (inotify fd, or NullSource)
//!   - WatchTable (handle <-> path)
//!   - ReadBuffer + parser (record cursor)
//! ```

mod error;
mod event;
mod multiplexer;
pub mod parser;
mod registry;
pub mod source;
mod watch_table;

pub use error::{DecodeError, WatchError, WatchResult};
pub use event::{EventKind, EventMask, FileEvent, RawEvent, WatchHandle};
pub use multiplexer::{Watcher, WatcherState};
pub use registry::{SourceFactory, WatcherId, WatcherRegistry};
pub use source::{EventSource, NullSource};
pub use watch_table::WatchTable;

#[cfg(target_os = "linux")]
pub use source::InotifySource;
