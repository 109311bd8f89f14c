//! Sans-IO core state machines for spool archive reading and writing.
//!
//! Nothing in this module touches a file or a socket. The cores take and
//! hand back byte buffers and plain values, and the frontends do the I/O:
//! - Async (tokio)
//! - Sync (std)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Frontends                              │
//! │  - SpoolFileWriter / SpoolFileReader    │
//! │    (async/tokio)                        │
//! │  - SpoolWriter / SpoolReader (std/sync) │
//! ├─────────────────────────────────────────┤
//! │  Sans-IO Core (this module)             │
//! │  - ArchiveWriter (record framing)       │
//! │  - ArchiveReader (ParserState machine)  │
//! │  - Materializer (events -> fs actions)  │
//! └─────────────────────────────────────────┘
//! ```

#[cfg(feature = "reader")]
mod materialize;
#[cfg(feature = "reader")]
mod reader;
#[cfg(feature = "writer")]
mod writer;

#[cfg(feature = "reader")]
pub use materialize::{Action, Materializer, PendingFile, TEMP_SUFFIX};
#[cfg(feature = "reader")]
pub use reader::{
    ArchiveReader, CorruptRecord, ExtractOptions, ExtractStats, IntegrityPolicy, ParserState,
    RecordEvent,
};
#[cfg(feature = "writer")]
pub use writer::{root_record_path, ArchiveWriter, PackOptions, PackStats};

/// Default size of a single payload read or write.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
