//! Sans-IO archive reader state machine.
//!
//! `ArchiveReader` owns an accumulation buffer with a read cursor. Callers
//! push bytes in with [`ArchiveReader::feed`] in chunks of any size and pull
//! [`RecordEvent`]s out with [`ArchiveReader::next_event`] until it returns
//! `None`, which means the buffer holds no complete field.

use std::collections::HashSet;

use crate::checksum::{Checksum, DefaultChecksum, CHECKSUM_LEN};
use crate::error::{ExtractError, FormatError};
use crate::parse::{
    decode_payload_size, parse_path, parse_timestamps, parse_u48_le, ParseError, ParseResult,
    MIN_RECORD_LEN, TIMESTAMPS_LEN,
};
use crate::path::RecordPath;
use crate::record::{Record, Timestamps};

use super::DEFAULT_CHUNK_SIZE;

/// What to do when a payload digest does not match its stored checksum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntegrityPolicy {
    /// Fail the whole read with an integrity error.
    #[default]
    Abort,
    /// Report the record as unverified and keep reading. Framing is still
    /// intact after a digest mismatch, so the following records can be
    /// trusted.
    Report,
}

/// Options for consuming an archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Size of the reads pulled from a byte source.
    pub chunk_size: usize,
    pub integrity: IntegrityPolicy,
    /// Apply archived access and modification times to extracted entries.
    pub restore_times: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            integrity: IntegrityPolicy::Abort,
            restore_times: true,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_integrity(mut self, integrity: IntegrityPolicy) -> Self {
        self.integrity = integrity;
        self
    }

    pub fn with_restore_times(mut self, restore_times: bool) -> Self {
        self.restore_times = restore_times;
        self
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.chunk_size == 0 {
            return Err(ExtractError::InvalidOptions("chunk size must be positive"));
        }
        Ok(())
    }
}

/// A record whose payload failed verification under [`IntegrityPolicy::Report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptRecord {
    pub path: RecordPath,
    /// Stream offset of the record's length field.
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub directories: u64,
    pub files: u64,
    pub payload_bytes: u64,
    pub corrupt: Vec<CorruptRecord>,
}

impl ExtractStats {
    /// Update the counters for an event taken from a reader whose current
    /// record starts at `record_offset`.
    pub fn observe(&mut self, event: &RecordEvent, record_offset: u64) {
        match event {
            RecordEvent::Record(record) if record.is_dir() => self.directories += 1,
            RecordEvent::Record(_) => self.files += 1,
            RecordEvent::Data(data) => self.payload_bytes += data.len() as u64,
            RecordEvent::Verified { record, ok: false } => self.corrupt.push(CorruptRecord {
                path: record.path.clone(),
                offset: record_offset,
            }),
            RecordEvent::Verified { .. } => {}
        }
    }
}

/// Where the parser is within the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Between records, waiting for the 6-byte length field.
    AwaitingTotalSize,
    AwaitingTimestamps {
        total: u64,
    },
    AwaitingPathTerminator {
        total: u64,
        times: Timestamps,
    },
    AwaitingPayload {
        remaining: u64,
    },
    AwaitingChecksum,
    /// The stream ended cleanly.
    Done,
}

/// One step of progress through the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// Header and path are known. A record without payload is complete at
    /// this point and no `Verified` event follows it.
    Record(Record),
    /// Payload bytes of the current record, not yet verified.
    Data(Vec<u8>),
    /// The stored checksum has been compared with the payload digest.
    Verified { record: Record, ok: bool },
}

fn need<T>(result: ParseResult<T>) -> Result<Option<(T, usize)>, FormatError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(ParseError::NeedMoreBytes(_)) => Ok(None),
        Err(ParseError::Invalid(err)) => Err(err),
    }
}

/// Sans-IO archive reader state machine.
///
/// Works the same whether the archive arrives one byte at a time or in a
/// single chunk. After the first fatal error the reader is poisoned and
/// keeps returning that error.
///
/// ```ignore
/// let mut core = ArchiveReader::<DefaultChecksum>::new(IntegrityPolicy::Abort);
/// while let Some(chunk) = source.next_chunk()? {
///     core.feed(chunk)?;
///     while let Some(event) = core.next_event()? {
///         handle(event);
///     }
/// }
/// core.finish()?;
/// ```
pub struct ArchiveReader<C: Checksum = DefaultChecksum> {
    buf: Vec<u8>,
    pos: usize,
    /// Stream offset of `buf[pos]`.
    offset: u64,
    record_start: u64,
    state: ParserState,
    current: Option<Record>,
    hasher: C,
    policy: IntegrityPolicy,
    seen: HashSet<String>,
    poisoned: Option<FormatError>,
}

impl<C: Checksum> ArchiveReader<C> {
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            offset: 0,
            record_start: 0,
            state: ParserState::AwaitingTotalSize,
            current: None,
            hasher: C::default(),
            policy,
            seen: HashSet::new(),
            poisoned: None,
        }
    }

    #[inline]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Stream offset of the first unconsumed byte.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Stream offset of the length field of the record being parsed.
    #[inline]
    pub fn record_offset(&self) -> u64 {
        self.record_start
    }

    /// Bytes fed but not yet consumed.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Append bytes to the accumulation buffer.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), FormatError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        if self.state == ParserState::Done {
            return Err(FormatError::OutOfSequence("bytes fed after the end of stream"));
        }

        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Advance the parser as far as the buffered bytes allow.
    pub fn next_event(&mut self) -> Result<Option<RecordEvent>, FormatError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        self.step().map_err(|err| self.poison(err))
    }

    /// Declare the end of the byte stream.
    ///
    /// Call once `next_event` has returned `None` for the last chunk. Ending
    /// between records is clean; ending anywhere else is a truncation.
    pub fn finish(&mut self) -> Result<(), FormatError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        match self.state {
            ParserState::Done => Ok(()),
            ParserState::AwaitingTotalSize if self.buffered() == 0 => {
                self.state = ParserState::Done;
                Ok(())
            }
            ParserState::AwaitingTotalSize => Err(self.poison(FormatError::Truncated {
                offset: self.offset,
            })),
            _ => Err(self.poison(FormatError::Truncated {
                offset: self.record_start,
            })),
        }
    }

    fn poison(&mut self, err: FormatError) -> FormatError {
        self.current = None;
        self.poisoned = Some(err.clone());
        err
    }

    #[inline]
    fn consume(&mut self, n: usize) {
        self.pos += n;
        self.offset += n as u64;
    }

    fn step(&mut self) -> Result<Option<RecordEvent>, FormatError> {
        loop {
            let avail = &self.buf[self.pos..];

            match self.state {
                ParserState::Done => return Ok(None),

                ParserState::AwaitingTotalSize => {
                    let Some((total, n)) = need(parse_u48_le(avail))? else {
                        return Ok(None);
                    };
                    self.record_start = self.offset;
                    if total < MIN_RECORD_LEN {
                        return Err(FormatError::SizeMismatch {
                            total,
                            path_len: 0,
                            offset: self.record_start,
                        });
                    }
                    self.consume(n);
                    self.state = ParserState::AwaitingTimestamps { total };
                }

                ParserState::AwaitingTimestamps { total } => {
                    let Some((times, n)) = need(parse_timestamps(avail))? else {
                        return Ok(None);
                    };
                    self.consume(n);
                    self.state = ParserState::AwaitingPathTerminator { total, times };
                }

                ParserState::AwaitingPathTerminator { total, times } => {
                    let limit =
                        usize::try_from(total - TIMESTAMPS_LEN as u64).unwrap_or(usize::MAX);
                    let Some((path, n)) = need(parse_path(avail, limit, self.offset))? else {
                        return Ok(None);
                    };

                    let size = decode_payload_size(total, n as u64).ok_or(
                        FormatError::SizeMismatch {
                            total,
                            path_len: n as u64,
                            offset: self.record_start,
                        },
                    )?;
                    if path.is_dir() && size > 0 {
                        return Err(FormatError::DirectoryPayload {
                            path: path.to_string(),
                            offset: self.record_start,
                        });
                    }
                    if !self.seen.insert(path.key()) {
                        return Err(FormatError::DuplicatePath {
                            path: path.to_string(),
                            offset: self.record_start,
                        });
                    }

                    self.consume(n);
                    let record = Record { path, size, times };

                    tracing::debug!(
                        path = %record.path,
                        size,
                        offset = %format_args!("{:#x}", self.record_start),
                        "parsed record"
                    );

                    if size == 0 {
                        self.state = ParserState::AwaitingTotalSize;
                    } else {
                        self.hasher = C::default();
                        self.current = Some(record.clone());
                        self.state = ParserState::AwaitingPayload { remaining: size };
                    }
                    return Ok(Some(RecordEvent::Record(record)));
                }

                ParserState::AwaitingPayload { remaining } => {
                    if avail.is_empty() {
                        return Ok(None);
                    }
                    let n = remaining.min(avail.len() as u64) as usize;
                    let data = avail[..n].to_vec();
                    self.hasher.update(&data);

                    tracing::trace!(
                        len = n,
                        offset = %format_args!("{:#x}", self.offset),
                        "payload chunk"
                    );

                    self.consume(n);
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 {
                        ParserState::AwaitingChecksum
                    } else {
                        ParserState::AwaitingPayload { remaining }
                    };
                    return Ok(Some(RecordEvent::Data(data)));
                }

                ParserState::AwaitingChecksum => {
                    if avail.len() < CHECKSUM_LEN {
                        return Ok(None);
                    }
                    let mut expected = [0u8; CHECKSUM_LEN];
                    expected.copy_from_slice(&avail[..CHECKSUM_LEN]);
                    self.consume(CHECKSUM_LEN);

                    let actual = std::mem::take(&mut self.hasher).finalize();
                    let record = self
                        .current
                        .take()
                        .ok_or(FormatError::OutOfSequence("checksum without a record"))?;
                    self.state = ParserState::AwaitingTotalSize;

                    let ok = actual == expected;
                    if !ok {
                        match self.policy {
                            IntegrityPolicy::Abort => {
                                return Err(FormatError::ChecksumMismatch {
                                    path: record.path.to_string(),
                                    offset: self.record_start,
                                });
                            }
                            IntegrityPolicy::Report => {
                                tracing::warn!(
                                    path = %record.path,
                                    offset = %format_args!("{:#x}", self.record_start),
                                    "checksum mismatch, continuing"
                                );
                            }
                        }
                    }
                    return Ok(Some(RecordEvent::Verified { record, ok }));
                }
            }
        }
    }
}
