use spool_format::{ExtractOptions, IntegrityPolicy, SpoolFileReader};

use crate::cli::ExtractArgs;
use crate::error::{Error, Result};

use super::open_source;

pub async fn run(args: ExtractArgs) -> Result<()> {
    let output = match args.output {
        Some(path) => path,
        None => std::path::PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&output)
        .await
        .map_err(|source| Error::CreateDirectory {
            path: output.clone(),
            source,
        })?;

    let integrity = if args.keep_going {
        IntegrityPolicy::Report
    } else {
        IntegrityPolicy::Abort
    };
    let options = ExtractOptions::new()
        .with_chunk_size(args.chunk_size)
        .with_integrity(integrity)
        .with_restore_times(!args.no_times);

    tracing::debug!(output = %output.display(), ?integrity, "extracting archive");
    let source = open_source(args.archive.as_deref()).await?;
    let mut reader = SpoolFileReader::new(&output, &options)?;
    let stats = reader.extract_from(source).await?;

    for corrupt in &stats.corrupt {
        eprintln!(
            "skipped `{}`: checksum mismatch (record at {:#x})",
            corrupt.path, corrupt.offset
        );
    }
    if !args.quiet {
        eprintln!(
            "{} directories, {} files, {} payload bytes",
            stats.directories, stats.files, stats.payload_bytes
        );
    }

    if stats.corrupt.is_empty() {
        Ok(())
    } else {
        Err(Error::CorruptRecords {
            count: stats.corrupt.len(),
        })
    }
}
