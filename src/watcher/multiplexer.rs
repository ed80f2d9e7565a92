//! Watch multiplexer: one kernel event source, many watched paths.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Settings;
use crate::{debug_event, warn_event};

use super::error::{WatchError, WatchResult};
use super::event::{EventMask, FileEvent};
use super::parser::{self, MIN_BUFFER_SIZE};
use super::source::{self, EventSource};
use super::watch_table::WatchTable;

/// Lifecycle of a [`Watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Kernel source open, nothing registered yet.
    Created,
    /// At least one successful `watch`; events may be polled.
    Open,
    /// Kernel source released; the table is kept for inspection.
    Closed,
    /// Everything released; only `close`/`destroy` remain callable.
    Destroyed,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatcherState::Created => "Created",
            WatcherState::Open => "Open",
            WatcherState::Closed => "Closed",
            WatcherState::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

/// Bytes from the last kernel read and the cursor into them.
#[derive(Debug)]
struct ReadBuffer {
    bytes: Vec<u8>,
    pos: usize,
    len: usize,
}

impl ReadBuffer {
    fn with_capacity(size: usize) -> Self {
        Self {
            bytes: vec![0; size.max(MIN_BUFFER_SIZE)],
            pos: 0,
            len: 0,
        }
    }

    fn is_drained(&self) -> bool {
        self.pos >= self.len
    }

    fn pending(&self) -> &[u8] {
        &self.bytes[self.pos..self.len]
    }

    fn fill(&mut self, len: usize) {
        self.pos = 0;
        self.len = len.min(self.bytes.len());
    }

    fn advance(&mut self, consumed: usize) {
        self.pos += consumed;
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.len = 0;
    }

    fn release(&mut self) {
        self.reset();
        self.bytes = Vec::new();
    }
}

struct Inner {
    state: WatcherState,
    source: Option<Box<dyn EventSource>>,
    table: WatchTable,
    buffer: ReadBuffer,
}

impl Inner {
    fn transition(&mut self, to: WatcherState) {
        debug_event!("watcher", "state", "{} -> {}", self.state, to);
        self.state = to;
    }

    /// `watch`/`unwatch` need `Created` or `Open`.
    fn ensure_registrable(&self, op: &str) -> WatchResult<()> {
        match (self.state, &self.source) {
            (WatcherState::Created | WatcherState::Open, Some(_)) => Ok(()),
            (state, _) => {
                warn_event!("watcher", "rejected", "{op} on {state} watcher");
                Err(WatchError::InvalidHandle)
            }
        }
    }

    fn close(&mut self) {
        if matches!(self.state, WatcherState::Closed | WatcherState::Destroyed) {
            return;
        }
        // Dropping the source releases the kernel handle and every registration
        if let Some(source) = self.source.take() {
            debug_event!("watcher", "released", "{} source", source.name());
        }
        self.buffer.reset();
        self.transition(WatcherState::Closed);
    }

    fn destroy(&mut self) {
        if self.state == WatcherState::Destroyed {
            return;
        }
        self.close();
        self.table.clear();
        self.buffer.release();
        self.transition(WatcherState::Destroyed);
    }

    fn poll(&mut self) -> WatchResult<Option<FileEvent>> {
        match self.state {
            WatcherState::Destroyed => return Err(WatchError::InvalidHandle),
            WatcherState::Closed => return Ok(None),
            WatcherState::Created | WatcherState::Open => {}
        }

        let mut read_attempted = false;
        loop {
            if self.buffer.is_drained() {
                if read_attempted {
                    return Ok(None);
                }
                read_attempted = true;

                let Some(source) = self.source.as_mut() else {
                    return Ok(None);
                };
                let n = match source.read(&mut self.buffer.bytes) {
                    Ok(n) => n,
                    Err(e) => {
                        warn_event!("watcher", "read failed", "{e}");
                        self.buffer.reset();
                        return Err(e.into());
                    }
                };
                if n == 0 {
                    return Ok(None);
                }
                self.buffer.fill(n);
            }

            let offset = self.buffer.pos;
            let (raw, consumed) = match parser::decode_record(self.buffer.pending(), offset) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn_event!("watcher", "discarding buffer", "{e}");
                    self.buffer.reset();
                    return Err(e.into());
                }
            };
            self.buffer.advance(consumed);

            if raw.is_watch_removed() {
                if let Some(path) = self.table.remove(raw.handle) {
                    debug_event!(
                        "watcher",
                        "kernel dropped watch",
                        "{} {}",
                        raw.handle,
                        path.display()
                    );
                }
                continue;
            }

            let base = self.table.lookup(raw.handle);
            if base.is_none() {
                debug_event!("watcher", "unresolved handle", "{} {:?}", raw.handle, raw.mask);
            }
            return Ok(Some(raw.resolve(base)));
        }
    }
}

/// Multiplexes change events for many directories over one kernel source.
///
/// All operations take one internal lock for their whole critical section,
/// so a `Watcher` can be shared between a thread managing watches and a
/// thread polling events. No operation blocks beyond a single
/// non-blocking system call.
///
/// # Examples
///
/// ```no_run
/// use filewatcher::Watcher;
///
/// let watcher = Watcher::new()?;
/// watcher.watch("/tmp")?;
/// while let Some(event) = watcher.poll()? {
///     println!("{event}");
/// }
/// # Ok::<(), filewatcher::WatchError>(())
/// ```
pub struct Watcher {
    inner: Mutex<Inner>,
}

impl Watcher {
    /// Create a watcher on the platform's kernel event source.
    pub fn new() -> WatchResult<Self> {
        Self::with_settings(&Settings::default())
    }

    /// Create a watcher using the buffer size from `settings`.
    pub fn with_settings(settings: &Settings) -> WatchResult<Self> {
        let source = source::open_default().map_err(|e| {
            warn_event!("watcher", "create failed", "{e}");
            WatchError::InitFailed {
                reason: e.to_string(),
            }
        })?;
        Ok(Self::with_source(source, settings.effective_buffer_size()))
    }

    /// Create a watcher over an explicit event source.
    pub fn with_source(source: Box<dyn EventSource>, buffer_size: usize) -> Self {
        debug_event!(
            "watcher",
            "created",
            "{} source, {} byte buffer",
            source.name(),
            buffer_size.max(MIN_BUFFER_SIZE)
        );

        Self {
            inner: Mutex::new(Inner {
                state: WatcherState::Created,
                source: Some(source),
                table: WatchTable::new(),
                buffer: ReadBuffer::with_capacity(buffer_size),
            }),
        }
    }

    /// Start watching `path` for entries created, modified, deleted or
    /// renamed in and out.
    ///
    /// A kernel refusal (missing path, permissions, watch limit) is
    /// `RegistrationFailed` and is not retried.
    pub fn watch(&self, path: impl AsRef<Path>) -> WatchResult<()> {
        let path = path.as_ref();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.ensure_registrable("watch")?;
        let Some(source) = inner.source.as_mut() else {
            return Err(WatchError::InvalidHandle);
        };
        let handle = match source.add_watch(path, EventMask::WATCH_INTEREST) {
            Ok(handle) => handle,
            Err(source) => {
                warn_event!("watcher", "watch failed", "{}: {source}", path.display());
                return Err(WatchError::RegistrationFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        inner.table.insert(handle, path.to_path_buf());
        debug_event!("watcher", "watching", "{} {}", handle, path.display());

        if inner.state == WatcherState::Created {
            inner.transition(WatcherState::Open);
        }
        Ok(())
    }

    /// Stop watching `path`, releasing every kernel registration for it.
    ///
    /// A path that is not watched is a no-op.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> WatchResult<()> {
        let path = path.as_ref();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.ensure_registrable("unwatch")?;
        let Some(source) = inner.source.as_mut() else {
            return Err(WatchError::InvalidHandle);
        };
        let handles = inner.table.remove_by_path(path);
        if handles.is_empty() {
            debug_event!("watcher", "unwatch ignored", "{} not watched", path.display());
            return Ok(());
        }

        for handle in handles {
            // The kernel may already have dropped it (path deleted)
            match source.remove_watch(handle) {
                Ok(()) => {
                    debug_event!("watcher", "unwatched", "{} {}", handle, path.display());
                }
                Err(e) => {
                    warn_event!("watcher", "remove watch failed", "{handle}: {e}");
                }
            }
        }
        Ok(())
    }

    /// Next pending event, without blocking.
    ///
    /// Serves records from the last kernel read first, then tries a single
    /// non-blocking read. `Ok(None)` means nothing is pending, and is what a
    /// closed watcher returns forever. A malformed buffer is discarded and
    /// reported as `Decode`; the next call reads afresh.
    pub fn poll(&self) -> WatchResult<Option<FileEvent>> {
        self.inner.lock().poll()
    }

    /// Poll until no event is pending.
    pub fn drain(&self) -> WatchResult<Vec<FileEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.poll()? {
            events.push(event);
        }
        Ok(events)
    }

    /// Release the kernel source. Idempotent.
    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// Release everything. Idempotent; closes first if needed.
    pub fn destroy(&self) {
        self.inner.lock().destroy();
    }

    pub fn state(&self) -> WatcherState {
        self.inner.lock().state
    }

    /// Distinct paths in the watch table, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let inner = self.inner.lock();
        let mut paths: Vec<PathBuf> = inner.table.paths().map(Path::to_path_buf).collect();
        paths.sort();
        paths
    }

    /// Check if `path` has a live entry in the watch table.
    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.inner.lock().table.contains_path(path.as_ref())
    }

    /// Number of kernel registrations in the watch table.
    pub fn watch_count(&self) -> usize {
        self.inner.lock().table.len()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Watcher")
            .field("state", &inner.state)
            .field("source", &inner.source.as_ref().map(|s| s.name()))
            .field("watches", &inner.table.len())
            .finish()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.inner.get_mut().destroy();
    }
}
