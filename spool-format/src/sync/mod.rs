//! Sync (std) frontends for reading and writing spool archives.

#[cfg(feature = "reader")]
mod reader;
#[cfg(feature = "writer")]
mod writer;

#[cfg(feature = "reader")]
pub use reader::{Extractor, RecordSink, SpoolReader};
#[cfg(feature = "writer")]
pub use writer::SpoolWriter;
