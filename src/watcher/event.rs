//! Event model: kernel masks, raw records and normalized events.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Kernel event bits as reported in a record header (inotify ABI values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
        const UNMOUNT = 0x0000_2000;
        const Q_OVERFLOW = 0x0000_4000;
        const IGNORED = 0x0000_8000;
        const ISDIR = 0x4000_0000;
    }
}

impl EventMask {
    /// Interest registered for every watched path.
    pub const WATCH_INTEREST: EventMask = EventMask::CREATE
        .union(EventMask::DELETE)
        .union(EventMask::MODIFY)
        .union(EventMask::MOVED_FROM)
        .union(EventMask::MOVED_TO);
}

/// Kernel-assigned identifier for one path registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd{}", self.0)
    }
}

/// Normalized change kind delivered to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Overflow,
}

impl EventKind {
    /// Classify a kernel mask.
    ///
    /// Precedence when several bits are set: creation (including rename-in)
    /// over modification over deletion (including rename-out) over queue
    /// overflow. A mask carrying none of those bits is reported as a
    /// modification.
    pub fn classify(mask: EventMask) -> Self {
        if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
            EventKind::Created
        } else if mask.contains(EventMask::MODIFY) {
            EventKind::Modified
        } else if mask.intersects(EventMask::DELETE | EventMask::MOVED_FROM) {
            EventKind::Deleted
        } else if mask.contains(EventMask::Q_OVERFLOW) {
            EventKind::Overflow
        } else {
            EventKind::Modified
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "CREATED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
            EventKind::Overflow => "OVERFLOW",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded kernel record, before path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: WatchHandle,
    pub mask: EventMask,
    /// Links the two halves of a rename; zero otherwise.
    pub cookie: u32,
    /// Entry name inside the watched directory, for directory-content events.
    pub name: Option<OsString>,
}

impl RawEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::classify(self.mask)
    }

    /// Kernel notice that the registration behind `handle` is gone.
    pub fn is_watch_removed(&self) -> bool {
        self.mask.contains(EventMask::IGNORED)
    }

    /// Build the caller-facing event against the watched path, if known.
    ///
    /// Without a base path the event is still produced: the bare name, or an
    /// empty path for records that carry no name (overflow).
    pub fn resolve(&self, base: Option<&Path>) -> FileEvent {
        let path = match (base, &self.name) {
            (Some(base), Some(name)) => base.join(name),
            (Some(base), None) => base.to_path_buf(),
            (None, Some(name)) => PathBuf::from(name),
            (None, None) => PathBuf::new(),
        };

        FileEvent {
            kind: self.kind(),
            path,
        }
    }
}

/// A change event with its full path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileEvent {
    pub kind: EventKind,
    pub path: PathBuf,
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(mask: EventMask, name: Option<&str>) -> RawEvent {
        RawEvent {
            handle: WatchHandle::from_raw(1),
            mask,
            cookie: 0,
            name: name.map(OsString::from),
        }
    }

    #[test]
    fn test_classify_single_bits() {
        assert_eq!(EventKind::classify(EventMask::CREATE), EventKind::Created);
        assert_eq!(EventKind::classify(EventMask::MOVED_TO), EventKind::Created);
        assert_eq!(EventKind::classify(EventMask::MODIFY), EventKind::Modified);
        assert_eq!(EventKind::classify(EventMask::DELETE), EventKind::Deleted);
        assert_eq!(EventKind::classify(EventMask::MOVED_FROM), EventKind::Deleted);
        assert_eq!(
            EventKind::classify(EventMask::Q_OVERFLOW),
            EventKind::Overflow
        );
    }

    #[test]
    fn test_classify_precedence() {
        // Creation wins over a co-occurring modification
        assert_eq!(
            EventKind::classify(EventMask::CREATE | EventMask::MODIFY),
            EventKind::Created
        );
        assert_eq!(
            EventKind::classify(EventMask::MODIFY | EventMask::DELETE),
            EventKind::Modified
        );
        assert_eq!(
            EventKind::classify(EventMask::MOVED_FROM | EventMask::Q_OVERFLOW),
            EventKind::Deleted
        );
        assert_eq!(
            EventKind::classify(EventMask::CREATE | EventMask::ISDIR),
            EventKind::Created
        );
    }

    #[test]
    fn test_classify_unrelated_bits_fall_back_to_modified() {
        assert_eq!(EventKind::classify(EventMask::empty()), EventKind::Modified);
        assert_eq!(EventKind::classify(EventMask::ATTRIB), EventKind::Modified);
    }

    #[test]
    fn test_resolve_joins_name_onto_watched_path() {
        let event = raw(EventMask::CREATE, Some("foo.txt")).resolve(Some(Path::new("/tmp/x")));
        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.path, PathBuf::from("/tmp/x/foo.txt"));
    }

    #[test]
    fn test_resolve_without_name_uses_watched_path() {
        let event = raw(EventMask::MODIFY, None).resolve(Some(Path::new("/tmp/x")));
        assert_eq!(event.path, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_resolve_degraded_paths() {
        let event = raw(EventMask::DELETE, Some("gone.txt")).resolve(None);
        assert_eq!(event.kind, EventKind::Deleted);
        assert_eq!(event.path, PathBuf::from("gone.txt"));

        let overflow = raw(EventMask::Q_OVERFLOW, None).resolve(None);
        assert_eq!(overflow.kind, EventKind::Overflow);
        assert_eq!(overflow.path, PathBuf::new());
    }

    #[test]
    fn test_watch_removed_detection() {
        assert!(raw(EventMask::IGNORED, None).is_watch_removed());
        assert!(!raw(EventMask::DELETE, Some("a")).is_watch_removed());
    }

    #[test]
    fn test_event_display_and_json() {
        let event = FileEvent {
            kind: EventKind::Deleted,
            path: PathBuf::from("/tmp/x/a.txt"),
        };
        assert_eq!(event.to_string(), "DELETED /tmp/x/a.txt");

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"kind":"deleted","path":"/tmp/x/a.txt"}"#);
    }
}
