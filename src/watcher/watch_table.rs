//! Bidirectional map between kernel watch handles and watched paths.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::event::WatchHandle;

/// Table of live watch registrations.
///
/// Holds at most one path per handle. A path may be held by several
/// handles when the kernel hands out distinct ones; the table does not
/// deduplicate them.
#[derive(Debug, Default)]
pub struct WatchTable {
    /// handle -> watched path.
    by_handle: HashMap<WatchHandle, PathBuf>,
    /// watched path -> every handle registered for it.
    by_path: HashMap<PathBuf, HashSet<WatchHandle>>,
}

impl WatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `handle` watches `path`.
    ///
    /// A reused handle silently replaces its previous entry.
    pub fn insert(&mut self, handle: WatchHandle, path: PathBuf) {
        if let Some(previous) = self.by_handle.insert(handle, path.clone()) {
            self.detach(&previous, handle);
        }
        self.by_path.entry(path).or_default().insert(handle);
    }

    /// Remove the entry for `handle`, returning its path.
    pub fn remove(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let path = self.by_handle.remove(&handle)?;
        self.detach(&path, handle);
        Some(path)
    }

    /// Path watched by `handle`.
    pub fn lookup(&self, handle: WatchHandle) -> Option<&Path> {
        self.by_handle.get(&handle).map(PathBuf::as_path)
    }

    /// Remove every entry for `path`, returning the released handles.
    ///
    /// Handles come back in ascending order; empty when the path was not
    /// watched.
    pub fn remove_by_path(&mut self, path: &Path) -> Vec<WatchHandle> {
        let Some(handles) = self.by_path.remove(path) else {
            return Vec::new();
        };

        let mut handles: Vec<WatchHandle> = handles.into_iter().collect();
        handles.sort_unstable();
        for handle in &handles {
            self.by_handle.remove(handle);
        }
        handles
    }

    /// Check if any handle watches `path`.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    /// Number of entries (handles).
    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    /// Check if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Distinct watched paths.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.by_path.keys().map(PathBuf::as_path)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.by_handle.clear();
        self.by_path.clear();
    }

    fn detach(&mut self, path: &Path, handle: WatchHandle) {
        if let Some(handles) = self.by_path.get_mut(path) {
            handles.remove(&handle);
            if handles.is_empty() {
                self.by_path.remove(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wd(raw: i32) -> WatchHandle {
        WatchHandle::from_raw(raw)
    }

    #[test]
    fn test_watch_table_basic() {
        let mut table = WatchTable::new();

        table.insert(wd(1), PathBuf::from("/project/src"));
        table.insert(wd(2), PathBuf::from("/project/tests"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(wd(1)), Some(Path::new("/project/src")));
        assert_eq!(table.lookup(wd(3)), None);
        assert!(table.contains_path(Path::new("/project/tests")));
    }

    #[test]
    fn test_watch_table_remove() {
        let mut table = WatchTable::new();
        table.insert(wd(1), PathBuf::from("/a"));

        assert_eq!(table.remove(wd(1)), Some(PathBuf::from("/a")));
        assert_eq!(table.remove(wd(1)), None);
        assert!(!table.contains_path(Path::new("/a")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reused_handle_overwrites() {
        let mut table = WatchTable::new();
        table.insert(wd(5), PathBuf::from("/old"));
        table.insert(wd(5), PathBuf::from("/new"));

        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(wd(5)), Some(Path::new("/new")));
        // Old path no longer reachable
        assert!(!table.contains_path(Path::new("/old")));
        assert!(table.remove_by_path(Path::new("/old")).is_empty());
    }

    #[test]
    fn test_same_handle_same_path_is_idempotent() {
        let mut table = WatchTable::new();
        table.insert(wd(1), PathBuf::from("/a"));
        table.insert(wd(1), PathBuf::from("/a"));

        assert_eq!(table.len(), 1);
        assert_eq!(table.remove_by_path(Path::new("/a")), vec![wd(1)]);
    }

    #[test]
    fn test_remove_by_path_releases_all_handles() {
        let mut table = WatchTable::new();
        table.insert(wd(3), PathBuf::from("/shared"));
        table.insert(wd(1), PathBuf::from("/shared"));
        table.insert(wd(2), PathBuf::from("/other"));

        let released = table.remove_by_path(Path::new("/shared"));

        assert_eq!(released, vec![wd(1), wd(3)]);
        assert_eq!(table.lookup(wd(1)), None);
        assert_eq!(table.lookup(wd(3)), None);
        assert_eq!(table.lookup(wd(2)), Some(Path::new("/other")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_by_unknown_path() {
        let mut table = WatchTable::new();
        assert!(table.remove_by_path(Path::new("/nope")).is_empty());
    }

    #[test]
    fn test_removing_one_of_shared_handles_keeps_path() {
        let mut table = WatchTable::new();
        table.insert(wd(1), PathBuf::from("/shared"));
        table.insert(wd(2), PathBuf::from("/shared"));

        table.remove(wd(1));

        assert!(table.contains_path(Path::new("/shared")));
        assert_eq!(table.paths().count(), 1);
    }

    #[test]
    fn test_clear_empties_both_directions() {
        let mut table = WatchTable::new();
        table.insert(wd(1), PathBuf::from("/a"));
        table.insert(wd(2), PathBuf::from("/b"));

        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.paths().count(), 0);
        assert_eq!(table.lookup(wd(1)), None);
        assert!(!table.contains_path(Path::new("/b")));
    }
}
