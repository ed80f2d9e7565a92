//! Kernel event sources behind the watcher core.
//!
//! The core talks to the kernel only through [`EventSource`]. Dropping a
//! source releases its kernel handle.

use std::io;
use std::path::Path;

use super::event::{EventMask, WatchHandle};

#[cfg(target_os = "linux")]
pub use inotify::InotifySource;

/// Kernel facility that reports changes for registered paths.
pub trait EventSource: Send {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Register interest in `path`.
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<WatchHandle>;

    /// Release a registration returned by `add_watch`.
    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()>;

    /// Read pending records into `buffer` without blocking.
    ///
    /// Returns the number of bytes written; `0` when nothing is pending.
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
}

/// Open the kernel event source for the current platform.
#[cfg(target_os = "linux")]
pub fn open_default() -> io::Result<Box<dyn EventSource>> {
    Ok(Box::new(InotifySource::init()?))
}

#[cfg(not(target_os = "linux"))]
pub fn open_default() -> io::Result<Box<dyn EventSource>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no kernel event source on this platform, use NullSource",
    ))
}

/// Source that accepts every watch and never reports events.
#[derive(Debug, Default)]
pub struct NullSource {
    next_handle: i32,
}

impl NullSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSource for NullSource {
    fn name(&self) -> &'static str {
        "null"
    }

    fn add_watch(&mut self, _path: &Path, _mask: EventMask) -> io::Result<WatchHandle> {
        self.next_handle += 1;
        Ok(WatchHandle::from_raw(self.next_handle))
    }

    fn remove_watch(&mut self, _handle: WatchHandle) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, _buffer: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

#[cfg(target_os = "linux")]
mod inotify {
    use std::ffi::CString;
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    use super::EventSource;
    use crate::watcher::event::{EventMask, WatchHandle};

    /// inotify instance opened non-blocking and close-on-exec.
    #[derive(Debug)]
    pub struct InotifySource {
        fd: OwnedFd,
    }

    impl InotifySource {
        pub fn init() -> io::Result<Self> {
            // SAFETY: no pointers involved; the result is checked below
            let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: inotify_init1 returned a fresh descriptor we now own
            let fd = unsafe { OwnedFd::from_raw_fd(fd) };
            Ok(Self { fd })
        }
    }

    impl EventSource for InotifySource {
        fn name(&self) -> &'static str {
            "inotify"
        }

        fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<WatchHandle> {
            let c_path = CString::new(path.as_os_str().as_bytes())?;
            // SAFETY: the descriptor is owned by self and `c_path` outlives the call
            let wd = unsafe {
                libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask.bits())
            };
            if wd == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(WatchHandle::from_raw(wd))
        }

        fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
            // SAFETY: the descriptor is owned by self; a stale handle only yields EINVAL
            let rc = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), handle.as_raw()) };
            if rc == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            // SAFETY: pointer and length come from a live `&mut [u8]` held for the call
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };

            if n < 0 {
                let error = io::Error::last_os_error();
                return match error.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(0),
                    _ => Err(error),
                };
            }
            Ok(n as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_source_hands_out_distinct_handles() {
        let mut source = NullSource::new();
        let a = source.add_watch(Path::new("/a"), EventMask::WATCH_INTEREST).unwrap();
        let b = source.add_watch(Path::new("/a"), EventMask::WATCH_INTEREST).unwrap();
        assert_ne!(a, b);
        assert!(source.remove_watch(a).is_ok());
    }

    #[test]
    fn test_null_source_never_reads() {
        let mut source = NullSource::new();
        let mut buffer = [0u8; 64];
        assert_eq!(source.read(&mut buffer).unwrap(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_inotify_rejects_missing_path() {
        let mut source = InotifySource::init().unwrap();
        let err = source
            .add_watch(
                Path::new("/definitely/not/a/real/path"),
                EventMask::WATCH_INTEREST,
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_inotify_read_without_activity_returns_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut source = InotifySource::init().unwrap();
        source.add_watch(dir.path(), EventMask::WATCH_INTEREST).unwrap();

        let mut buffer = vec![0u8; crate::watcher::parser::MIN_BUFFER_SIZE];
        assert_eq!(source.read(&mut buffer).unwrap(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_inotify_reads_records_and_rejects_stale_handles() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut source = InotifySource::init().unwrap();
        let handle = source.add_watch(dir.path(), EventMask::WATCH_INTEREST).unwrap();

        std::fs::create_dir(dir.path().join("fresh")).unwrap();

        let mut buffer = vec![0u8; crate::watcher::parser::MIN_BUFFER_SIZE];
        let n = source.read(&mut buffer).unwrap();
        let (event, consumed) = crate::watcher::parser::decode_record(&buffer[..n], 0).unwrap();
        assert!(consumed <= n);
        assert_eq!(event.handle, handle);
        assert_eq!(event.name.as_deref(), Some(std::ffi::OsStr::new("fresh")));

        source.remove_watch(handle).unwrap();
        let err = source.remove_watch(handle).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
