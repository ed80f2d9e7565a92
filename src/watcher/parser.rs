//! Decoding of raw kernel event buffers.
//!
//! A buffer is a concatenation of records, each a fixed 16-byte header
//! (`wd: i32`, `mask: u32`, `cookie: u32`, `len: u32`, native endian)
//! followed by `len` bytes of NUL-padded entry name.
//!
//! [`decode_record`] decodes one record at a cursor; the watcher steps
//! through its read buffer with it so a record can be handed out between
//! polls. [`parse`] is the one-shot form of the same decoder for callers
//! holding a complete buffer.

use std::ffi::OsString;

use super::error::DecodeError;
use super::event::{EventMask, RawEvent, WatchHandle};

/// Size of the fixed record header.
pub const HEADER_SIZE: usize = 16;

/// Longest name the kernel reports, plus its terminator.
pub const MAX_NAME_SIZE: usize = 256;

/// Smallest buffer guaranteed to hold any single record.
pub const MIN_BUFFER_SIZE: usize = HEADER_SIZE + MAX_NAME_SIZE;

/// Decode the record at the start of `bytes`.
///
/// Returns the event and the number of bytes it occupied. `offset` is only
/// used for error reporting.
pub fn decode_record(bytes: &[u8], offset: usize) -> Result<(RawEvent, usize), DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::TruncatedHeader {
            offset,
            available: bytes.len(),
            needed: HEADER_SIZE,
        });
    }

    let wd = i32::from_ne_bytes(word(bytes, 0));
    let mask = u32::from_ne_bytes(word(bytes, 4));
    let cookie = u32::from_ne_bytes(word(bytes, 8));
    let len = u32::from_ne_bytes(word(bytes, 12)) as usize;

    let available = bytes.len() - HEADER_SIZE;
    if len > available {
        return Err(DecodeError::TruncatedName {
            offset,
            len,
            available,
        });
    }

    let name = if len > 0 {
        let field = &bytes[HEADER_SIZE..HEADER_SIZE + len];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        if end > 0 {
            Some(name_from_bytes(&field[..end]))
        } else {
            None
        }
    } else {
        None
    };

    let event = RawEvent {
        handle: WatchHandle::from_raw(wd),
        mask: EventMask::from_bits_retain(mask),
        cookie,
        name,
    };

    Ok((event, HEADER_SIZE + len))
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

#[cfg(unix)]
fn name_from_bytes(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(bytes).to_os_string()
}

#[cfg(not(unix))]
fn name_from_bytes(bytes: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Lazily decode every record in `buffer`, in order.
pub fn parse(buffer: &[u8]) -> EventRecords<'_> {
    EventRecords {
        buffer,
        offset: 0,
        failed: false,
    }
}

/// Iterator over the records of one kernel buffer.
///
/// Yields at most one `DecodeError` and then stops.
#[derive(Debug)]
pub struct EventRecords<'a> {
    buffer: &'a [u8],
    offset: usize,
    failed: bool,
}

impl EventRecords<'_> {
    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for EventRecords<'_> {
    type Item = Result<RawEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buffer.len() {
            return None;
        }

        match decode_record(&self.buffer[self.offset..], self.offset) {
            Ok((event, consumed)) => {
                self.offset += consumed;
                Some(Ok(event))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for EventRecords<'_> {}

/// Test helper: encode a record the way the kernel lays it out.
#[cfg(test)]
pub(crate) fn encode_record(wd: i32, mask: EventMask, cookie: u32, name: Option<&str>) -> Vec<u8> {
    let name_field = match name {
        Some(name) => {
            // Kernel pads to a multiple of the header alignment, NUL-terminated
            let raw = name.len() + 1;
            let padded = raw.div_ceil(4) * 4;
            let mut field = name.as_bytes().to_vec();
            field.resize(padded, 0);
            field
        }
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + name_field.len());
    out.extend_from_slice(&wd.to_ne_bytes());
    out.extend_from_slice(&mask.bits().to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&(name_field.len() as u32).to_ne_bytes());
    out.extend_from_slice(&name_field);
    out
}
