use std::path::Path;

use spool_format::{PackOptions, PackStats, SpoolFileWriter};
use tokio::io::AsyncWriteExt;

use crate::cli::CreateArgs;
use crate::error::{Error, Result};

pub async fn run(args: CreateArgs) -> Result<()> {
    let mut options = PackOptions::new().with_chunk_size(args.chunk_size);
    if let Some(prefix) = &args.prefix {
        options = options.with_prefix(prefix.as_str());
    }

    let pack_err = |source| Error::Pack {
        path: args.dir.clone(),
        source,
    };
    let writer = SpoolFileWriter::with_options(&args.dir, options)
        .await
        .map_err(pack_err)?;

    tracing::debug!(root = %args.dir.display(), output = ?args.output, "creating archive");
    let stats = match args.output.as_deref() {
        None => to_stdout(writer).await?,
        Some(p) if p == Path::new("-") => to_stdout(writer).await?,
        Some(path) => {
            if !args.force && tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(Error::ArchiveExists {
                    path: path.to_path_buf(),
                });
            }
            let mut file = tokio::fs::File::create(path)
                .await
                .map_err(|source| Error::CreateArchive {
                    path: path.to_path_buf(),
                    source,
                })?;
            let stats = writer.write_to(&mut file).await.map_err(pack_err)?;
            file.sync_all()
                .await
                .map_err(|source| Error::CreateArchive {
                    path: path.to_path_buf(),
                    source,
                })?;
            stats
        }
    };

    if !args.quiet {
        eprintln!(
            "{} directories, {} files, {} payload bytes, {} bytes written",
            stats.directories, stats.files, stats.payload_bytes, stats.bytes_written
        );
    }
    Ok(())
}

async fn to_stdout(writer: SpoolFileWriter) -> Result<PackStats> {
    let path = writer.root().to_path_buf();
    let mut stdout = tokio::io::stdout();
    let stats = writer
        .write_to(&mut stdout)
        .await
        .map_err(|source| Error::Pack { path, source })?;
    stdout
        .shutdown()
        .await
        .map_err(|source| Error::Stdout { source })?;
    Ok(stats)
}
