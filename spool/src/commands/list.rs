use std::io::Write;

use spool_format::{
    DefaultChecksum, ExtractError, ExtractOptions, IntegrityPolicy, Record, RecordSink,
    SpoolReader,
};
use tokio::io::AsyncReadExt;

use crate::cli::ListArgs;
use crate::error::{Error, Result};

use super::open_source;

fn stdout_failed(err: std::io::Error) -> ExtractError {
    ExtractError::WriteFailed(err, "-".into())
}

/// Prints each record once its payload has been verified.
struct Printer<W> {
    out: W,
    long: bool,
}

impl<W: Write> Printer<W> {
    fn print(&mut self, record: &Record, status: &str) -> std::result::Result<(), ExtractError> {
        let size = if record.is_dir() {
            "-".to_string()
        } else {
            record.size.to_string()
        };
        let line = if self.long {
            writeln!(
                self.out,
                "{:>14}  {:>14}  {:>12}  {:>6}  {}",
                record.times.mtime, record.times.ctime, size, status, record.path
            )
        } else {
            writeln!(self.out, "{:>12}  {:>6}  {}", size, status, record.path)
        };
        line.map_err(stdout_failed)
    }
}

impl<W: Write> RecordSink for Printer<W> {
    fn on_record(&mut self, record: &Record, _offset: u64) -> std::result::Result<(), ExtractError> {
        if record.has_payload() {
            Ok(())
        } else {
            self.print(record, "-")
        }
    }

    fn on_data(&mut self, _data: &[u8]) -> std::result::Result<(), ExtractError> {
        Ok(())
    }

    fn on_verified(&mut self, record: &Record, ok: bool) -> std::result::Result<(), ExtractError> {
        self.print(record, if ok { "ok" } else { "FAILED" })
    }

    fn on_finish(&mut self) -> std::result::Result<(), ExtractError> {
        self.out.flush().map_err(stdout_failed)
    }
}

pub async fn run(args: ListArgs) -> Result<()> {
    if args.long {
        println!(
            "{:>14}  {:>14}  {:>12}  {:>6}  Path",
            "Modified (ms)", "Changed (ms)", "Size", "Check"
        );
    }

    let options = ExtractOptions::new().with_integrity(IntegrityPolicy::Report);
    let printer = Printer {
        out: std::io::stdout().lock(),
        long: args.long,
    };
    let mut reader: SpoolReader<_, DefaultChecksum> =
        SpoolReader::with_checksum(printer, &options)?;

    let mut source = open_source(args.archive.as_deref()).await?;
    let mut buf = vec![0u8; options.chunk_size];
    loop {
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| Error::from(ExtractError::ReadFailed(e)))?;
        if n == 0 {
            break;
        }
        reader.feed(&buf[..n])?;
    }
    let stats = reader.finish()?;

    if stats.corrupt.is_empty() {
        Ok(())
    } else {
        Err(Error::CorruptRecords {
            count: stats.corrupt.len(),
        })
    }
}
