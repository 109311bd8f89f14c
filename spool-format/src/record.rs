use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::FormatError;
use crate::parse::U48_MAX;
use crate::path::RecordPath;

/// Creation/change, modification and access times in milliseconds since the
/// Unix epoch, each limited to 48 bits on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timestamps {
    pub ctime: u64,
    pub mtime: u64,
    pub atime: u64,
}

fn to_millis(field: &'static str, time: SystemTime) -> Result<u64, FormatError> {
    let since = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| FormatError::PreEpoch { field })?;
    let millis = since.as_millis();
    if millis > U48_MAX as u128 {
        return Err(FormatError::OutOfRange {
            field,
            value: millis,
        });
    }
    Ok(millis as u64)
}

impl Timestamps {
    /// Convert filesystem times, truncating to whole milliseconds.
    pub fn from_system(
        ctime: SystemTime,
        mtime: SystemTime,
        atime: SystemTime,
    ) -> Result<Timestamps, FormatError> {
        Ok(Timestamps {
            ctime: to_millis("ctime", ctime)?,
            mtime: to_millis("mtime", mtime)?,
            atime: to_millis("atime", atime)?,
        })
    }

    #[inline]
    pub fn mtime_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.mtime)
    }

    #[inline]
    pub fn atime_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.atime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Directory,
    File,
}

/// One filesystem entry as framed in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Archive-relative path; a trailing `/` marks a directory.
    pub path: RecordPath,

    /// Declared payload length in bytes. Always zero for directories.
    pub size: u64,

    pub times: Timestamps,
}

impl Record {
    pub fn directory(path: RecordPath, times: Timestamps) -> Record {
        Record {
            path,
            size: 0,
            times,
        }
    }

    pub fn file(path: RecordPath, size: u64, times: Timestamps) -> Record {
        Record { path, size, times }
    }

    #[inline(always)]
    pub fn kind(&self) -> RecordKind {
        if self.path.is_dir() {
            RecordKind::Directory
        } else {
            RecordKind::File
        }
    }

    #[inline(always)]
    pub fn is_dir(&self) -> bool {
        self.kind() == RecordKind::Directory
    }

    #[inline(always)]
    pub fn is_file(&self) -> bool {
        self.kind() == RecordKind::File
    }

    /// Only records with a positive size carry payload bytes and a checksum.
    #[inline(always)]
    pub fn has_payload(&self) -> bool {
        self.size > 0
    }
}
