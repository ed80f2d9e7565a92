//! Error types for the watcher core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {source}")]
    RegistrationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed event buffer: {0}")]
    Decode(#[from] DecodeError),

    #[error("Watcher handle is closed, destroyed or unknown")]
    InvalidHandle,

    #[error("Kernel event source error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from decoding a kernel event buffer.
///
/// Only reachable with a buffer the kernel did not produce; a successful
/// read always ends on a record boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated record header at offset {offset}: {available} of {needed} bytes")]
    TruncatedHeader {
        offset: usize,
        available: usize,
        needed: usize,
    },

    #[error("record name at offset {offset} claims {len} bytes, only {available} remain")]
    TruncatedName {
        offset: usize,
        len: usize,
        available: usize,
    },
}

pub type WatchResult<T> = Result<T, WatchError>;
