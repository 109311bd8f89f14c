//! Sans-IO archive writer state machine.
//!
//! `ArchiveWriter` frames records without performing any I/O. Frontends walk
//! the directory tree and read file contents, and ask the core for the bytes
//! that go around each payload.

use std::collections::HashSet;
use std::path::Path;

use crate::checksum::CHECKSUM_LEN;
use crate::encode;
use crate::error::{FormatError, PackError};
use crate::path::RecordPath;
use crate::record::Record;

use super::DEFAULT_CHUNK_SIZE;

/// Options for producing an archive.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Largest payload piece read from a file at once.
    pub chunk_size: usize,
    /// Archive-relative name for the root directory. Defaults to the root's
    /// own final path component.
    pub prefix: Option<String>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            prefix: None,
        }
    }
}

impl PackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn validate(&self) -> Result<(), PackError> {
        if self.chunk_size == 0 {
            return Err(PackError::InvalidOptions("chunk size must be positive"));
        }
        Ok(())
    }
}

/// Counters reported once an archive has been produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackStats {
    pub directories: u64,
    pub files: u64,
    pub payload_bytes: u64,
    /// Total archive bytes handed to the byte sink.
    pub bytes_written: u64,
}

/// Archive-relative name of the root directory record.
///
/// Uses the prefix from `options` when set, otherwise the final component of
/// `root`. A root without one (`.`, `/`) is named after the final component
/// of `resolved`, its canonical form.
pub fn root_record_path(
    root: &Path,
    resolved: Option<&Path>,
    options: &PackOptions,
) -> Result<RecordPath, PackError> {
    if let Some(prefix) = &options.prefix {
        return RecordPath::from_components(prefix.split('/').filter(|c| !c.is_empty()), true)
            .map_err(|_| PackError::InvalidOptions("prefix is not a valid record path"));
    }

    let name = root
        .file_name()
        .or_else(|| resolved.and_then(Path::file_name))
        .ok_or_else(|| PackError::UnrepresentableName(root.to_path_buf()))?;
    let name = name
        .to_str()
        .ok_or_else(|| PackError::UnrepresentableName(root.to_path_buf()))?;

    RecordPath::from_components([name], true).map_err(|e| {
        PackError::Format(
            FormatError::UnrepresentablePath {
                reason: e.as_str(),
            },
            root.to_path_buf(),
        )
    })
}

#[derive(Debug)]
struct InFlight {
    path: String,
    remaining: u64,
}

/// Sans-IO archive writer state machine.
///
/// For each entry the frontend calls [`begin_record`](Self::begin_record),
/// then, if the record carries a payload, reports every payload piece with
/// [`payload`](Self::payload) and closes the record with
/// [`end_record`](Self::end_record).
///
/// ```ignore
/// let mut core = ArchiveWriter::new();
/// sink.write_all(&core.begin_record(&record)?)?;
/// while let Some(chunk) = next_piece_of_file()? {
///     core.payload(chunk.len())?;
///     sink.write_all(chunk)?;
/// }
/// sink.write_all(&core.end_record(hasher.finalize())?)?;
/// let stats = core.finish()?;
/// ```
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    seen: HashSet<String>,
    offset: u64,
    current: Option<InFlight>,
    stats: PackStats,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream offset of the next byte the frontend will emit.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether a record's payload is still open.
    #[inline]
    pub fn in_record(&self) -> bool {
        self.current.is_some()
    }

    /// Payload bytes still owed for the open record.
    pub fn remaining(&self) -> u64 {
        self.current.as_ref().map(|c| c.remaining).unwrap_or(0)
    }

    pub fn stats(&self) -> PackStats {
        PackStats {
            bytes_written: self.offset,
            ..self.stats
        }
    }

    /// Frame a record, returning the length field, timestamps and path.
    pub fn begin_record(&mut self, record: &Record) -> Result<Vec<u8>, FormatError> {
        if self.current.is_some() {
            return Err(FormatError::OutOfSequence(
                "previous record's payload is incomplete",
            ));
        }
        if record.is_dir() && record.size > 0 {
            return Err(FormatError::DirectoryPayload {
                path: record.path.to_string(),
                offset: self.offset,
            });
        }
        let key = record.path.key();
        if self.seen.contains(&key) {
            return Err(FormatError::DuplicatePath {
                path: record.path.to_string(),
                offset: self.offset,
            });
        }

        let header = encode::encode_record_header(record)?;
        self.seen.insert(key);

        tracing::debug!(
            path = %record.path,
            size = record.size,
            offset = %format_args!("{:#x}", self.offset),
            "framing record"
        );

        self.offset += header.len() as u64;
        if record.is_dir() {
            self.stats.directories += 1;
        } else {
            self.stats.files += 1;
        }

        if record.has_payload() {
            self.current = Some(InFlight {
                path: record.path.to_string(),
                remaining: record.size,
            });
        }

        Ok(header)
    }

    /// Account for `len` payload bytes the frontend is about to emit.
    pub fn payload(&mut self, len: usize) -> Result<(), FormatError> {
        let current = self
            .current
            .as_mut()
            .ok_or(FormatError::OutOfSequence("payload outside of a record"))?;

        let len = len as u64;
        if len > current.remaining {
            return Err(FormatError::OutOfSequence(
                "payload exceeds the declared size",
            ));
        }

        tracing::trace!(
            path = %current.path,
            len,
            offset = %format_args!("{:#x}", self.offset),
            "payload chunk"
        );

        current.remaining -= len;
        self.offset += len;
        self.stats.payload_bytes += len;
        Ok(())
    }

    /// Close the open record with the digest of its payload.
    pub fn end_record(
        &mut self,
        checksum: [u8; CHECKSUM_LEN],
    ) -> Result<[u8; CHECKSUM_LEN], FormatError> {
        match &self.current {
            None => return Err(FormatError::OutOfSequence("checksum outside of a record")),
            Some(c) if c.remaining > 0 => {
                return Err(FormatError::OutOfSequence(
                    "checksum before the payload is complete",
                ))
            }
            Some(_) => {}
        }

        self.current = None;
        self.offset += CHECKSUM_LEN as u64;
        Ok(checksum)
    }

    /// Check that no record is left open and return the final counters.
    pub fn finish(&self) -> Result<PackStats, FormatError> {
        if self.current.is_some() {
            return Err(FormatError::OutOfSequence(
                "archive finished inside a record",
            ));
        }
        Ok(self.stats())
    }
}
