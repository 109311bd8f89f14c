use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::{
    checksum::{Checksum, DefaultChecksum},
    core::{Action, ArchiveReader, ExtractOptions, ExtractStats, Materializer, RecordEvent},
    error::{ErrorKind, ExtractError, FormatError},
    fs::set_file_times,
    record::Record,
};

struct OpenTemp {
    writer: BufWriter<File>,
    temp: PathBuf,
}

async fn set_times(path: PathBuf, atime: SystemTime, mtime: SystemTime) -> Result<(), ExtractError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || set_file_times(&target, atime, mtime))
        .await
        .map_err(|e| ExtractError::SetTimesFailed(std::io::Error::other(e), path.clone()))?
        .map_err(|e| ExtractError::SetTimesFailed(e, path))
}

/// Async archive consumer that extracts below an output root.
///
/// Bytes are pushed in with [`feed`](Self::feed) in chunks of any size, or
/// pulled from an [`AsyncRead`] with [`extract_from`](Self::extract_from).
/// Payloads are streamed into a hidden temporary sibling and renamed into
/// place only once verified.
pub struct SpoolFileReader<C: Checksum = DefaultChecksum> {
    core: ArchiveReader<C>,
    materializer: Materializer,
    file: Option<OpenTemp>,
    stats: ExtractStats,
    chunk_size: usize,
    poisoned: Option<ErrorKind>,
    finished: bool,
}

impl<C: Checksum> Drop for SpoolFileReader<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.poisoned.is_none() {
            tracing::warn!(
                offset = %format_args!("{:#x}", self.core.offset()),
                "SpoolFileReader dropped without finishing"
            );
        }
        // Can't do async in Drop, remove the partial file synchronously
        self.file = None;
        if let Some(pending) = self.materializer.discard() {
            let _ = std::fs::remove_file(&pending.temp);
        }
    }
}

impl SpoolFileReader {
    pub fn new<P: Into<PathBuf>>(root: P, options: &ExtractOptions) -> Result<Self, ExtractError> {
        Self::with_checksum(root, options)
    }
}

impl<C: Checksum> SpoolFileReader<C> {
    /// Create a reader for archives written with digest `C`.
    pub fn with_checksum<P: Into<PathBuf>>(
        root: P,
        options: &ExtractOptions,
    ) -> Result<Self, ExtractError> {
        options.validate()?;
        Ok(Self {
            core: ArchiveReader::new(options.integrity),
            materializer: Materializer::new(root, options.restore_times),
            file: None,
            stats: ExtractStats::default(),
            chunk_size: options.chunk_size,
            poisoned: None,
            finished: false,
        })
    }

    pub fn root(&self) -> &Path {
        self.materializer.root()
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    /// Push the next chunk of archive bytes.
    pub async fn feed(&mut self, data: &[u8]) -> Result<(), ExtractError> {
        self.check()?;
        match self.feed_inner(data).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Declare the end of the stream, apply directory times and return the
    /// final counters.
    pub async fn finish(&mut self) -> Result<ExtractStats, ExtractError> {
        self.check()?;
        if self.finished {
            return Ok(self.stats.clone());
        }
        match self.finish_inner().await {
            Ok(()) => {
                self.finished = true;
                Ok(self.stats.clone())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Consume `source` to its end.
    pub async fn extract_from<R: AsyncRead + Unpin>(
        &mut self,
        mut source: R,
    ) -> Result<ExtractStats, ExtractError> {
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(ExtractError::ReadFailed(e)).await),
            };
            self.feed(&buf[..n]).await?;
        }
        self.finish().await
    }

    /// Stop reading and remove the partial file, if any.
    pub async fn abort(&mut self) {
        if self.poisoned.is_none() && !self.finished {
            self.poisoned = Some(ErrorKind::Cancelled);
            self.discard().await;
        }
    }

    fn check(&self) -> Result<(), ExtractError> {
        match self.poisoned {
            Some(kind) => Err(ExtractError::Poisoned(kind)),
            None => Ok(()),
        }
    }

    async fn fail(&mut self, err: ExtractError) -> ExtractError {
        if self.poisoned.is_none() {
            self.poisoned = Some(err.kind());
            self.discard().await;
        }
        err
    }

    async fn discard(&mut self) {
        self.file = None;
        if let Some(pending) = self.materializer.discard() {
            if let Err(e) = tokio::fs::remove_file(&pending.temp).await {
                tracing::debug!(
                    path = %pending.temp.display(),
                    error = %e,
                    "removing temp file failed"
                );
            }
        }
    }

    async fn feed_inner(&mut self, data: &[u8]) -> Result<(), ExtractError> {
        self.core.feed(data)?;
        while let Some(event) = self.core.next_event()? {
            self.stats.observe(&event, self.core.record_offset());
            match event {
                RecordEvent::Record(record) => {
                    let offset = self.core.record_offset();
                    self.begin(&record, offset).await?
                }
                RecordEvent::Data(chunk) => self.write(&chunk).await?,
                RecordEvent::Verified { ok: true, .. } => self.commit().await?,
                RecordEvent::Verified { ok: false, .. } => self.discard().await,
            }
        }
        Ok(())
    }

    async fn finish_inner(&mut self) -> Result<(), ExtractError> {
        self.core.finish()?;
        for (path, times) in self.materializer.directory_times() {
            set_times(path, times.atime_system(), times.mtime_system()).await?;
        }
        Ok(())
    }

    async fn begin(&mut self, record: &Record, offset: u64) -> Result<(), ExtractError> {
        match self.materializer.begin(record, offset)? {
            Action::CreateDir { path } => tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| ExtractError::CreateDirFailed(e, path)),
            Action::BeginFile(pending) => {
                if let Some(parent) = pending.target.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ExtractError::CreateDirFailed(e, parent.to_path_buf()))?;
                }
                let file = File::create(&pending.temp)
                    .await
                    .map_err(|e| ExtractError::CreateFileFailed(e, pending.temp.clone()))?;

                self.file = Some(OpenTemp {
                    writer: BufWriter::new(file),
                    temp: pending.temp,
                });
                if record.has_payload() {
                    Ok(())
                } else {
                    self.commit().await
                }
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ExtractError> {
        let Some(file) = self.file.as_mut() else {
            return Err(FormatError::OutOfSequence("payload without an open file").into());
        };
        file.writer
            .write_all(data)
            .await
            .map_err(|e| ExtractError::WriteFailed(e, file.temp.clone()))
    }

    async fn commit(&mut self) -> Result<(), ExtractError> {
        if let Some(mut file) = self.file.take() {
            file.writer
                .shutdown()
                .await
                .map_err(|e| ExtractError::WriteFailed(e, file.temp.clone()))?;
        }

        let pending = self.materializer.commit()?;
        tokio::fs::rename(&pending.temp, &pending.target)
            .await
            .map_err(|e| ExtractError::CommitFailed(e, pending.target.clone()))?;
        if self.materializer.restore_times() {
            set_times(
                pending.target,
                pending.times.atime_system(),
                pending.times.mtime_system(),
            )
            .await?;
        }
        Ok(())
    }
}
