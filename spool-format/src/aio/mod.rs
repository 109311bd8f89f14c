//! Async (tokio) frontends for reading and writing spool archives.

#[cfg(feature = "reader")]
mod reader;
#[cfg(all(test, feature = "reader", feature = "writer"))]
mod tests;
#[cfg(feature = "writer")]
mod writer;

#[cfg(feature = "reader")]
pub use reader::SpoolFileReader;
#[cfg(feature = "writer")]
pub use writer::{PackHandle, SpoolFileWriter};
