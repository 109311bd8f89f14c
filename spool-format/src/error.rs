//! Error taxonomy shared by the codec, the sans-IO cores and both frontends.

use std::path::PathBuf;

/// Broad classification of every failure this crate can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed header, unterminated path, or a stream cut short mid-record.
    StructuralCorruption,
    /// A payload digest did not match the checksum stored after it.
    IntegrityFailure,
    /// A record path resolves outside the extraction root.
    PathEscape,
    /// The filesystem or the byte sink/source failed underneath us.
    FilesystemFailure,
    /// The total record length cannot be split into timestamps, path, payload and checksum.
    SizeFieldInconsistency,
    /// The caller handed in something the format cannot represent.
    InvalidInput,
    /// The operation was aborted by the caller.
    Cancelled,
}

/// Failures produced by the codec and the sans-IO cores.
///
/// These never wrap I/O errors, so they can be cloned and handed out again
/// when a poisoned core is polled after its first failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Record path is not NUL-terminated. Offset: {offset:#x}")]
    UnterminatedPath { offset: u64 },

    #[error("Record path is invalid ({reason}). Offset: {offset:#x}")]
    InvalidPath { reason: &'static str, offset: u64 },

    #[error("Directory record '{path}' declares a payload. Offset: {offset:#x}")]
    DirectoryPayload { path: String, offset: u64 },

    #[error("Duplicate or overlapping record path '{path}'. Offset: {offset:#x}")]
    DuplicatePath { path: String, offset: u64 },

    #[error("Stream ended inside a record. Offset: {offset:#x}")]
    Truncated { offset: u64 },

    #[error(
        "Declared record length {total} does not fit a {path_len}-byte path. Offset: {offset:#x}"
    )]
    SizeMismatch {
        total: u64,
        path_len: u64,
        offset: u64,
    },

    #[error("Checksum mismatch for '{path}'. Offset: {offset:#x}")]
    ChecksumMismatch { path: String, offset: u64 },

    #[error("Record path '{path}' escapes the output root. Offset: {offset:#x}")]
    PathEscape { path: String, offset: u64 },

    #[error("Field `{field}` value {value} does not fit in 48 bits")]
    OutOfRange { field: &'static str, value: u128 },

    #[error("Field `{field}` precedes the Unix epoch")]
    PreEpoch { field: &'static str },

    #[error("Cannot frame record path: {reason}")]
    UnrepresentablePath { reason: &'static str },

    #[error("Record framed out of order: {0}")]
    OutOfSequence(&'static str),
}

impl FormatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::UnterminatedPath { .. }
            | FormatError::InvalidPath { .. }
            | FormatError::DirectoryPayload { .. }
            | FormatError::DuplicatePath { .. }
            | FormatError::Truncated { .. } => ErrorKind::StructuralCorruption,
            FormatError::SizeMismatch { .. } => ErrorKind::SizeFieldInconsistency,
            FormatError::ChecksumMismatch { .. } => ErrorKind::IntegrityFailure,
            FormatError::PathEscape { .. } => ErrorKind::PathEscape,
            FormatError::OutOfRange { .. }
            | FormatError::PreEpoch { .. }
            | FormatError::UnrepresentablePath { .. }
            | FormatError::OutOfSequence(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Failures raised while producing an archive.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("Archive root is missing or unreadable. Path: '{}'", .1.display())]
    MissingRoot(#[source] std::io::Error, PathBuf),

    #[error("Archive root is not a directory. Path: '{}'", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("Listing directory failed. Path: '{}'", .1.display())]
    ReadDirFailed(#[source] std::io::Error, PathBuf),

    #[error("Reading metadata failed. Path: '{}'", .1.display())]
    StatFailed(#[source] std::io::Error, PathBuf),

    #[error("Reading file failed. Path: '{}'", .1.display())]
    ReadFailed(#[source] std::io::Error, PathBuf),

    #[error("File shrank while being archived. Path: '{}'", .0.display())]
    FileShrank(PathBuf),

    #[error("File name is not valid UTF-8. Path: '{}'", .0.display())]
    UnrepresentableName(PathBuf),

    #[error("Cannot frame record. Path: '{}'", .1.display())]
    Format(#[source] FormatError, PathBuf),

    #[error("Writing archive bytes failed")]
    WriteFailed(#[source] std::io::Error),

    #[error("Invalid pack options: {0}")]
    InvalidOptions(&'static str),

    #[error("Archiving was cancelled")]
    Cancelled,

    #[error("Archive writer stopped after an earlier failure ({0:?})")]
    Poisoned(ErrorKind),
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::MissingRoot(..)
            | PackError::RootNotDirectory(_)
            | PackError::ReadDirFailed(..)
            | PackError::StatFailed(..)
            | PackError::ReadFailed(..)
            | PackError::FileShrank(_)
            | PackError::WriteFailed(_) => ErrorKind::FilesystemFailure,
            PackError::UnrepresentableName(_) | PackError::InvalidOptions(_) => {
                ErrorKind::InvalidInput
            }
            PackError::Format(err, _) => err.kind(),
            PackError::Cancelled => ErrorKind::Cancelled,
            PackError::Poisoned(kind) => *kind,
        }
    }
}

/// Failures raised while consuming an archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Creating directory failed. Path: '{}'", .1.display())]
    CreateDirFailed(#[source] std::io::Error, PathBuf),

    #[error("Creating file failed. Path: '{}'", .1.display())]
    CreateFileFailed(#[source] std::io::Error, PathBuf),

    #[error("Writing file failed. Path: '{}'", .1.display())]
    WriteFailed(#[source] std::io::Error, PathBuf),

    #[error("Moving file into place failed. Path: '{}'", .1.display())]
    CommitFailed(#[source] std::io::Error, PathBuf),

    #[error("Restoring timestamps failed. Path: '{}'", .1.display())]
    SetTimesFailed(#[source] std::io::Error, PathBuf),

    #[error("Reading archive bytes failed")]
    ReadFailed(#[source] std::io::Error),

    #[error("Invalid extract options: {0}")]
    InvalidOptions(&'static str),

    #[error("Archive reader stopped after an earlier failure ({0:?})")]
    Poisoned(ErrorKind),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Format(err) => err.kind(),
            ExtractError::CreateDirFailed(..)
            | ExtractError::CreateFileFailed(..)
            | ExtractError::WriteFailed(..)
            | ExtractError::CommitFailed(..)
            | ExtractError::SetTimesFailed(..)
            | ExtractError::ReadFailed(_) => ErrorKind::FilesystemFailure,
            ExtractError::InvalidOptions(_) => ErrorKind::InvalidInput,
            ExtractError::Poisoned(kind) => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_map_onto_taxonomy() {
        assert_eq!(
            FormatError::Truncated { offset: 3 }.kind(),
            ErrorKind::StructuralCorruption
        );
        assert_eq!(
            FormatError::SizeMismatch {
                total: 1,
                path_len: 2,
                offset: 0
            }
            .kind(),
            ErrorKind::SizeFieldInconsistency
        );
        assert_eq!(
            FormatError::PathEscape {
                path: "../x".into(),
                offset: 0x40
            }
            .kind(),
            ErrorKind::PathEscape
        );
        assert_eq!(
            ExtractError::from(FormatError::ChecksumMismatch {
                path: "a".into(),
                offset: 0
            })
            .kind(),
            ErrorKind::IntegrityFailure
        );
    }

    #[test]
    fn display_includes_offset_in_hex() {
        let err = FormatError::UnterminatedPath { offset: 0x2a };
        assert!(err.to_string().contains("0x2a"));
    }
}
