use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_walkdir::WalkDir;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::{
    checksum::{Checksum, DefaultChecksum},
    core::{root_record_path, ArchiveWriter, PackOptions, PackStats},
    counting::CountingWriter,
    error::{FormatError, PackError},
    fs::Stat,
    hashing::HashingReader,
    path::RecordPath,
    record::Record,
};

async fn stat(path: &Path) -> std::io::Result<Stat> {
    Stat::from_metadata(&tokio::fs::symlink_metadata(path).await?)
}

/// Async archive producer over a directory tree.
///
/// The walk runs inside [`write_to`](Self::write_to) and advances only as
/// fast as the sink accepts bytes: every `write_all` is a suspension point,
/// and at most one payload chunk is held in memory.
pub struct SpoolFileWriter<C: Checksum = DefaultChecksum> {
    root: PathBuf,
    rel: RecordPath,
    root_stat: Stat,
    options: PackOptions,
    core: ArchiveWriter,
    started: bool,
    _checksum: PhantomData<C>,
}

impl<C: Checksum> Drop for SpoolFileWriter<C> {
    fn drop(&mut self) {
        if !self.started {
            tracing::warn!(
                "SpoolFileWriter dropped without writing. \
                 Archive of {:?} was never produced.",
                self.root
            );
        }
    }
}

impl SpoolFileWriter {
    pub async fn new<P: AsRef<Path>>(root: P) -> Result<Self, PackError> {
        Self::with_checksum(root, PackOptions::default()).await
    }

    pub async fn with_options<P: AsRef<Path>>(
        root: P,
        options: PackOptions,
    ) -> Result<Self, PackError> {
        Self::with_checksum(root, options).await
    }
}

impl<C: Checksum> SpoolFileWriter<C> {
    /// Create a writer whose payload digests use `C`.
    ///
    /// A missing or non-directory root fails here, before any bytes exist.
    pub async fn with_checksum<P: AsRef<Path>>(
        root: P,
        options: PackOptions,
    ) -> Result<Self, PackError> {
        options.validate()?;
        let root = root.as_ref().to_path_buf();

        let root_stat = stat(&root)
            .await
            .map_err(|e| PackError::MissingRoot(e, root.clone()))?;
        if !root_stat.is_dir {
            return Err(PackError::RootNotDirectory(root));
        }

        let resolved = if options.prefix.is_none() && root.file_name().is_none() {
            let canonical = tokio::fs::canonicalize(&root)
                .await
                .map_err(|e| PackError::MissingRoot(e, root.clone()))?;
            Some(canonical)
        } else {
            None
        };
        let rel = root_record_path(&root, resolved.as_deref(), &options)?;

        Ok(Self {
            root,
            rel,
            root_stat,
            options,
            core: ArchiveWriter::new(),
            started: false,
            _checksum: PhantomData,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and write the whole archive into `sink`.
    ///
    /// Entries come from [`WalkDir`] in pre-order, each directory before its
    /// contents. The sink is flushed but not shut down.
    pub async fn write_to<W: AsyncWrite + Unpin>(
        mut self,
        sink: W,
    ) -> Result<PackStats, PackError> {
        self.started = true;
        let mut sink = CountingWriter::new(sink);
        let mut buf = vec![0u8; self.options.chunk_size];

        let root = self.root.clone();
        let rel = self.rel.clone();
        let root_stat = self.root_stat;
        self.write_directory(&mut sink, &root, rel.clone(), root_stat)
            .await?;

        // directories from the root down to the entry being written
        let mut ancestors: Vec<(PathBuf, RecordPath)> = vec![(root.clone(), rel)];
        let mut walker = WalkDir::new(&root);

        while let Some(entry) = walker.next().await {
            let entry = entry
                .map_err(|e| PackError::ReadDirFailed(std::io::Error::from(e), root.clone()))?;
            let path = entry.path();

            while let Some((dir, _)) = ancestors.last() {
                if path.parent() == Some(dir.as_path()) {
                    break;
                }
                ancestors.pop();
            }
            let Some((_, parent)) = ancestors.last() else {
                return Err(PackError::ReadDirFailed(
                    std::io::Error::other("walk left the root"),
                    path,
                ));
            };

            let name = entry.file_name();
            let name = name
                .to_str()
                .ok_or_else(|| PackError::UnrepresentableName(path.clone()))?;
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| PackError::StatFailed(e, path.clone()))?;
            let stat =
                Stat::from_metadata(&metadata).map_err(|e| PackError::StatFailed(e, path.clone()))?;

            if !stat.is_dir && !stat.is_file {
                tracing::warn!(
                    path = %path.display(),
                    "skipping entry that is neither a file nor a directory"
                );
                continue;
            }

            let rel = parent.join(name, stat.is_dir).map_err(|e| {
                PackError::Format(
                    FormatError::UnrepresentablePath {
                        reason: e.as_str(),
                    },
                    path.clone(),
                )
            })?;

            if stat.is_dir {
                self.write_directory(&mut sink, &path, rel.clone(), stat)
                    .await?;
                ancestors.push((path, rel));
            } else {
                self.write_file(&mut sink, &mut buf, path, rel, stat).await?;
            }
        }

        sink.flush().await.map_err(PackError::WriteFailed)?;
        let stats = self
            .core
            .finish()
            .map_err(|e| PackError::Format(e, self.root.clone()))?;

        tracing::debug!(bytes = sink.bytes_written(), "archive written");
        Ok(PackStats {
            bytes_written: sink.bytes_written(),
            ..stats
        })
    }

    /// Run the walk on the tokio runtime and return the archive as an
    /// [`AsyncRead`](tokio::io::AsyncRead).
    ///
    /// The pipe holds at most `chunk_size` bytes, so the walk stalls until
    /// the returned stream is read. Dropping the stream makes the walk fail
    /// with a broken pipe.
    pub fn into_reader(self) -> (DuplexStream, PackHandle)
    where
        C: 'static,
    {
        let (tx, rx) = tokio::io::duplex(self.options.chunk_size);
        let task = tokio::spawn(self.write_to(tx));
        (rx, PackHandle { task })
    }

    async fn write_directory<W: AsyncWrite + Unpin>(
        &mut self,
        sink: &mut W,
        path: &Path,
        rel: RecordPath,
        stat: Stat,
    ) -> Result<(), PackError> {
        let times = stat
            .timestamps()
            .map_err(|e| PackError::Format(e, path.to_path_buf()))?;
        let header = self
            .core
            .begin_record(&Record::directory(rel, times))
            .map_err(|e| PackError::Format(e, path.to_path_buf()))?;

        sink.write_all(&header)
            .await
            .map_err(PackError::WriteFailed)?;
        Ok(())
    }

    async fn write_file<W: AsyncWrite + Unpin>(
        &mut self,
        sink: &mut W,
        buf: &mut [u8],
        path: PathBuf,
        rel: RecordPath,
        stat: Stat,
    ) -> Result<(), PackError> {
        let times = stat
            .timestamps()
            .map_err(|e| PackError::Format(e, path.clone()))?;

        let file = if stat.size > 0 {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| PackError::ReadFailed(e, path.clone()))?;
            Some(file)
        } else {
            None
        };

        let header = self
            .core
            .begin_record(&Record::file(rel, stat.size, times))
            .map_err(|e| PackError::Format(e, path.clone()))?;
        sink.write_all(&header)
            .await
            .map_err(PackError::WriteFailed)?;

        let Some(file) = file else {
            return Ok(());
        };

        let mut reader = HashingReader::<_, C>::new(file);
        let mut remaining = stat.size;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            reader
                .read_exact(&mut buf[..want])
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => {
                        PackError::FileShrank(path.clone())
                    }
                    _ => PackError::ReadFailed(e, path.clone()),
                })?;
            self.core
                .payload(want)
                .map_err(|e| PackError::Format(e, path.clone()))?;
            sink.write_all(&buf[..want])
                .await
                .map_err(PackError::WriteFailed)?;
            remaining -= want as u64;
        }

        let checksum = self
            .core
            .end_record(reader.finalize())
            .map_err(|e| PackError::Format(e, path.clone()))?;
        sink.write_all(&checksum)
            .await
            .map_err(PackError::WriteFailed)?;
        Ok(())
    }
}

/// Handle to a walk spawned by [`SpoolFileWriter::into_reader`].
#[derive(Debug)]
pub struct PackHandle {
    task: JoinHandle<Result<PackStats, PackError>>,
}

impl PackHandle {
    /// Cancel the walk. The open file, if any, is closed and the stream
    /// ends early.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the walk to end.
    pub async fn join(self) -> Result<PackStats, PackError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(PackError::Cancelled),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}
