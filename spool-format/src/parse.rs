//! Sans-IO decoding primitives for the spool wire format.
//!
//! These functions work on byte slices without any I/O traits. They return
//! `(value, bytes_consumed)` on success and [`ParseError::NeedMoreBytes`] when
//! the slice ends before the field does, leaving buffer management to the
//! caller.
//!
//! Record layout, all integers unsigned little-endian:
//!
//! ```text
//! 0        6        12       18       24
//! ┌────────┬────────┬────────┬────────┬──────────────┬─────────┬──────────┐
//! │ length │ ctime  │ mtime  │ atime  │ path ... NUL │ payload │ checksum │
//! └────────┴────────┴────────┴────────┴──────────────┴─────────┴──────────┘
//! ```
//!
//! `length` counts every byte after itself. Payload and checksum are present
//! only when the payload is non-empty.

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum::CHECKSUM_LEN;
use crate::error::FormatError;
use crate::path::{RecordPath, MAX_PATH_LEN};
use crate::record::Timestamps;

/// Width of every integer field in a record header.
pub const U48_LEN: usize = 6;

/// Largest value a 48-bit field can carry.
pub const U48_MAX: u64 = (1 << 48) - 1;

/// The three timestamps following the length field.
pub const TIMESTAMPS_LEN: usize = 3 * U48_LEN;

/// Smallest valid total length: timestamps, a one-byte path and its terminator.
pub const MIN_RECORD_LEN: u64 = TIMESTAMPS_LEN as u64 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Need more bytes to complete parsing. Contains minimum additional bytes needed.
    NeedMoreBytes(usize),
    /// The bytes can never form a valid field.
    Invalid(FormatError),
}

impl From<FormatError> for ParseError {
    fn from(err: FormatError) -> Self {
        ParseError::Invalid(err)
    }
}

pub type ParseResult<T> = Result<(T, usize), ParseError>;

/// Parse a little-endian 48-bit unsigned integer.
#[inline]
pub fn parse_u48_le(data: &[u8]) -> ParseResult<u64> {
    if data.len() < U48_LEN {
        return Err(ParseError::NeedMoreBytes(U48_LEN - data.len()));
    }
    Ok((LittleEndian::read_uint(&data[..U48_LEN], U48_LEN), U48_LEN))
}

/// Parse the ctime, mtime, atime triple.
pub fn parse_timestamps(data: &[u8]) -> ParseResult<Timestamps> {
    if data.len() < TIMESTAMPS_LEN {
        return Err(ParseError::NeedMoreBytes(TIMESTAMPS_LEN - data.len()));
    }
    let (ctime, _) = parse_u48_le(data)?;
    let (mtime, _) = parse_u48_le(&data[U48_LEN..])?;
    let (atime, _) = parse_u48_le(&data[2 * U48_LEN..])?;
    Ok((
        Timestamps {
            ctime,
            mtime,
            atime,
        },
        TIMESTAMPS_LEN,
    ))
}

/// Parse a NUL-terminated path.
///
/// `limit` is the number of bytes the enclosing record leaves for the path
/// field (terminator included). If no terminator appears within `limit`
/// bytes, or within [`MAX_PATH_LEN`], the record is corrupt. `offset` is the
/// stream position of `data[0]`, used for error reporting.
pub fn parse_path(data: &[u8], limit: usize, offset: u64) -> ParseResult<RecordPath> {
    let limit = limit.min(MAX_PATH_LEN + 1);
    let window = &data[..data.len().min(limit)];

    match window.iter().position(|&b| b == 0) {
        Some(nul) => {
            let path = RecordPath::from_wire(&window[..nul]).map_err(|e| {
                FormatError::InvalidPath {
                    reason: e.as_str(),
                    offset,
                }
            })?;
            Ok((path, nul + 1))
        }
        None if data.len() >= limit => Err(FormatError::UnterminatedPath { offset }.into()),
        None => Err(ParseError::NeedMoreBytes(1)),
    }
}

/// Split a declared total record length into the payload size.
///
/// `path_field_len` includes the NUL terminator. The timestamps are taken off
/// first, then the path; whatever remains, if anything, is payload followed by
/// a 16-byte checksum. Returns `None` when the numbers cannot describe a
/// valid record.
pub fn decode_payload_size(total_len: u64, path_field_len: u64) -> Option<u64> {
    let rest = total_len
        .checked_sub(TIMESTAMPS_LEN as u64)?
        .checked_sub(path_field_len)?;

    if rest == 0 {
        return Some(0);
    }

    match rest.checked_sub(CHECKSUM_LEN as u64) {
        Some(payload) if payload > 0 => Some(payload),
        _ => None,
    }
}
