//! Sans-IO encoding primitives, the mirror image of [`crate::parse`].

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum::CHECKSUM_LEN;
use crate::error::FormatError;
use crate::parse::{TIMESTAMPS_LEN, U48_LEN, U48_MAX};
use crate::path::MAX_PATH_LEN;
use crate::record::{Record, Timestamps};

/// Encode a 48-bit little-endian integer, rejecting values that do not fit.
pub fn encode_u48_le(field: &'static str, value: u64) -> Result<[u8; U48_LEN], FormatError> {
    if value > U48_MAX {
        return Err(FormatError::OutOfRange {
            field,
            value: value as u128,
        });
    }
    let mut buf = [0u8; U48_LEN];
    LittleEndian::write_uint(&mut buf, value, U48_LEN);
    Ok(buf)
}

/// The value of the total length field for a record with the given path
/// length (without terminator) and payload size.
pub fn total_record_length(path_len: usize, payload: u64) -> Result<u64, FormatError> {
    let checksum = if payload > 0 { CHECKSUM_LEN as u64 } else { 0 };
    let total = (TIMESTAMPS_LEN as u128)
        + (path_len as u128 + 1)
        + payload as u128
        + checksum as u128;

    if total > U48_MAX as u128 {
        return Err(FormatError::OutOfRange {
            field: "length",
            value: total,
        });
    }
    Ok(total as u64)
}

pub fn encode_timestamps(times: &Timestamps, buf: &mut Vec<u8>) -> Result<(), FormatError> {
    buf.extend_from_slice(&encode_u48_le("ctime", times.ctime)?);
    buf.extend_from_slice(&encode_u48_le("mtime", times.mtime)?);
    buf.extend_from_slice(&encode_u48_le("atime", times.atime)?);
    Ok(())
}

/// Encode everything that precedes a record's payload: the total length,
/// the timestamps and the NUL-terminated path.
pub fn encode_record_header(record: &Record) -> Result<Vec<u8>, FormatError> {
    let path = record.path.as_bytes();
    if path.len() > MAX_PATH_LEN {
        return Err(FormatError::UnrepresentablePath {
            reason: "path exceeds the maximum record path length",
        });
    }

    let total = total_record_length(path.len(), record.size)?;

    let mut buf = Vec::with_capacity(U48_LEN + TIMESTAMPS_LEN + path.len() + 1);
    buf.extend_from_slice(&encode_u48_le("length", total)?);
    encode_timestamps(&record.times, &mut buf)?;
    buf.extend_from_slice(path);
    buf.push(0);
    Ok(buf)
}
