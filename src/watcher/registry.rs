//! Handle-based access to watchers for a binding layer.
//!
//! A `WatcherRegistry` replaces process-wide state: the binding layer
//! creates one at initialization and passes it to every call. Watchers are
//! addressed by an opaque [`WatcherId`] that is never reused.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::Settings;
use crate::{debug_event, warn_event};

use super::error::{WatchError, WatchResult};
use super::event::FileEvent;
use super::multiplexer::Watcher;
use super::source::EventSource;

/// Opaque watcher handle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

/// Builds the event source for each new watcher.
pub type SourceFactory = dyn Fn() -> std::io::Result<Box<dyn EventSource>> + Send + Sync;

/// Owner of every watcher a binding layer has created.
pub struct WatcherRegistry {
    watchers: DashMap<WatcherId, Arc<Watcher>>,
    next_id: AtomicU64,
    settings: Settings,
    factory: Option<Box<SourceFactory>>,
}

impl WatcherRegistry {
    /// Registry whose watchers use the platform's kernel source.
    pub fn new(settings: Settings) -> Self {
        Self {
            watchers: DashMap::new(),
            next_id: AtomicU64::new(1),
            settings,
            factory: None,
        }
    }

    /// Registry whose watchers use sources from `factory`.
    pub fn with_source_factory(
        settings: Settings,
        factory: impl Fn() -> std::io::Result<Box<dyn EventSource>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            watchers: DashMap::new(),
            next_id: AtomicU64::new(1),
            settings,
            factory: Some(Box::new(factory)),
        }
    }

    /// Create a watcher and return its handle.
    pub fn create(&self) -> WatchResult<WatcherId> {
        let watcher = match &self.factory {
            Some(factory) => {
                let source = factory().map_err(|e| {
                    warn_event!("watcher", "create failed", "{e}");
                    WatchError::InitFailed {
                        reason: e.to_string(),
                    }
                })?;
                Watcher::with_source(source, self.settings.effective_buffer_size())
            }
            None => Watcher::with_settings(&self.settings)?,
        };

        let id = WatcherId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.watchers.insert(id, Arc::new(watcher));
        debug_event!("watcher", "registered", "{id}");
        Ok(id)
    }

    /// Watch `path`. `Ok(false)` when the kernel refused the path.
    pub fn watch(&self, id: WatcherId, path: impl AsRef<Path>) -> WatchResult<bool> {
        let watcher = self.get(id)?;
        match watcher.watch(path) {
            Ok(()) => Ok(true),
            Err(WatchError::RegistrationFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stop watching `path`. Unknown, closed or destroyed handles are ignored.
    pub fn unwatch(&self, id: WatcherId, path: impl AsRef<Path>) {
        let Some(watcher) = self.lookup(id) else {
            return;
        };
        if let Err(e) = watcher.unwatch(path) {
            debug_event!("watcher", "unwatch ignored", "{id}: {e}");
        }
    }

    /// Next pending event for `id`, without blocking.
    ///
    /// A malformed kernel buffer is logged and reported as no event.
    pub fn next_event(&self, id: WatcherId) -> WatchResult<Option<FileEvent>> {
        let watcher = self.get(id)?;
        match watcher.poll() {
            Err(WatchError::Decode(e)) => {
                warn_event!("watcher", "dropped malformed buffer", "{id}: {e}");
                Ok(None)
            }
            other => other,
        }
    }

    /// Close the kernel source for `id`. Unknown handles are ignored.
    pub fn close(&self, id: WatcherId) {
        if let Some(watcher) = self.lookup(id) {
            watcher.close();
        }
    }

    /// Destroy `id` and forget it. Unknown handles are ignored.
    pub fn destroy(&self, id: WatcherId) {
        if let Some((_, watcher)) = self.watchers.remove(&id) {
            watcher.destroy();
            debug_event!("watcher", "unregistered", "{id}");
        }
    }

    /// Look up a live watcher.
    pub fn get(&self, id: WatcherId) -> WatchResult<Arc<Watcher>> {
        self.lookup(id).ok_or_else(|| {
            warn_event!("watcher", "unknown handle", "{id}");
            WatchError::InvalidHandle
        })
    }

    fn lookup(&self, id: WatcherId) -> Option<Arc<Watcher>> {
        self.watchers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of watchers not yet destroyed.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Drop for WatcherRegistry {
    fn drop(&mut self) {
        for entry in self.watchers.iter() {
            entry.value().destroy();
        }
    }
}
