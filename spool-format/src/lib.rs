//! Herein lies the brains of the `spool` streaming archive format.
//!
//! A spool archive is a flat sequence of self-describing records, one per
//! directory or file, written in pre-order so that every directory precedes
//! its contents. There is no header, index or trailer: an archive can be
//! produced while the tree is walked and extracted while it is received.
//!
//! Use [SpoolWriter][SpoolWriter] or [SpoolFileWriter][SpoolFileWriter] to
//! produce archives, and [SpoolReader][SpoolReader] or
//! [SpoolFileReader][SpoolFileReader] to consume them.

#[cfg(any(feature = "reader", feature = "writer"))]
pub mod aio;
pub mod checksum;
pub mod core;
#[cfg(feature = "writer")]
mod counting;
pub mod encode;
pub mod error;
pub mod fs;
#[cfg(feature = "writer")]
pub mod hashing;
pub mod parse;
pub mod path;
mod record;
#[cfg(any(feature = "reader", feature = "writer"))]
pub mod sync;
#[cfg(all(test, feature = "reader", feature = "writer"))]
mod test_util;

#[cfg(feature = "reader")]
pub use aio::SpoolFileReader;
#[cfg(feature = "writer")]
pub use aio::{PackHandle, SpoolFileWriter};
pub use checksum::{Checksum, DefaultChecksum, CHECKSUM_LEN};
#[cfg(feature = "reader")]
pub use self::core::{CorruptRecord, ExtractOptions, ExtractStats, IntegrityPolicy, RecordEvent};
#[cfg(feature = "writer")]
pub use self::core::{PackOptions, PackStats};
pub use error::{ErrorKind, ExtractError, FormatError, PackError};
pub use fs::{FileSystem, StdFs};
pub use parse::{ParseError, ParseResult};
pub use path::RecordPath;
pub use record::{Record, RecordKind, Timestamps};
#[cfg(feature = "reader")]
pub use sync::{Extractor, RecordSink, SpoolReader};
#[cfg(feature = "writer")]
pub use sync::SpoolWriter;
