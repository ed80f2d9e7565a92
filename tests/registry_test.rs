//! Handle-based surface used by binding layers.

use filewatcher::watcher::{EventSource, NullSource};
use filewatcher::{Settings, WatchError, WatcherId, WatcherRegistry};

fn null_registry() -> WatcherRegistry {
    WatcherRegistry::with_source_factory(Settings::default(), || {
        Ok(Box::new(NullSource::new()) as Box<dyn EventSource>)
    })
}

#[test]
fn test_operations_after_destroy_fail() {
    let registry = null_registry();
    let id = registry.create().unwrap();
    assert!(registry.watch(id, "/srv").unwrap());

    registry.destroy(id);

    assert!(matches!(
        registry.watch(id, "/srv"),
        Err(WatchError::InvalidHandle)
    ));
    assert!(matches!(
        registry.next_event(id),
        Err(WatchError::InvalidHandle)
    ));
}

#[test]
fn test_ids_are_not_reused() {
    let registry = null_registry();
    let first = registry.create().unwrap();
    registry.destroy(first);
    let second = registry.create().unwrap();

    assert_ne!(first, second);
    assert!(second.as_u64() > first.as_u64());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_shared_registry_across_threads() {
    let registry = std::sync::Arc::new(null_registry());
    let ids: Vec<WatcherId> = (0..8)
        .map(|_| {
            let registry = std::sync::Arc::clone(&registry);
            std::thread::spawn(move || {
                let id = registry.create().unwrap();
                assert!(registry.watch(id, "/data").unwrap());
                assert!(registry.next_event(id).unwrap().is_none());
                id
            })
        })
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(registry.len(), 8);
    for id in ids {
        registry.destroy(id);
    }
    assert!(registry.is_empty());
}

#[cfg(target_os = "linux")]
mod kernel {
    use super::*;
    use filewatcher::EventKind;
    use tempfile::TempDir;

    #[test]
    fn test_watch_reports_false_for_missing_path() {
        let registry = WatcherRegistry::default();
        let id = registry.create().unwrap();

        assert!(!registry.watch(id, "/definitely/not/here").unwrap());
        registry.destroy(id);
    }

    #[test]
    fn test_next_event_through_registry() {
        let dir = TempDir::new().unwrap();
        let registry = WatcherRegistry::default();
        let id = registry.create().unwrap();
        assert!(registry.watch(id, dir.path()).unwrap());

        std::fs::create_dir(dir.path().join("made")).unwrap();

        let event = registry.next_event(id).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.path, dir.path().join("made"));

        registry.unwatch(id, dir.path());
        registry.unwatch(id, dir.path());
        registry.close(id);
        assert!(registry.next_event(id).unwrap().is_none());
        registry.destroy(id);
    }
}
