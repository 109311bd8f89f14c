use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::{
    checksum::{Checksum, DefaultChecksum},
    core::{Action, ArchiveReader, ExtractOptions, ExtractStats, Materializer, RecordEvent},
    error::{ErrorKind, ExtractError, FormatError},
    fs::{FileSystem, StdFs},
    record::Record,
};

/// Visitor receiving records from a [`SpoolReader`] in arrival order.
///
/// `on_data` sees payload bytes before they are verified; `on_verified`
/// follows the last of them. Records without payload get `on_record` only.
pub trait RecordSink {
    /// A record header was parsed. `offset` is where the record starts in
    /// the archive.
    fn on_record(&mut self, record: &Record, offset: u64) -> Result<(), ExtractError>;

    fn on_data(&mut self, data: &[u8]) -> Result<(), ExtractError>;

    fn on_verified(&mut self, record: &Record, ok: bool) -> Result<(), ExtractError>;

    /// The stream ended cleanly.
    fn on_finish(&mut self) -> Result<(), ExtractError> {
        Ok(())
    }

    /// Reading stopped on a fatal error or was aborted. Release anything
    /// held for the record in progress.
    fn on_abort(&mut self) {}
}

/// Push-driven archive consumer.
///
/// Feed it chunks of any size; records are handed to the sink as soon as
/// enough bytes have arrived.
pub struct SpoolReader<S: RecordSink, C: Checksum = DefaultChecksum> {
    core: ArchiveReader<C>,
    sink: S,
    stats: ExtractStats,
    chunk_size: usize,
    poisoned: Option<ErrorKind>,
    finished: bool,
}

impl<S: RecordSink, C: Checksum> Drop for SpoolReader<S, C> {
    fn drop(&mut self) {
        if !self.finished && self.poisoned.is_none() {
            tracing::warn!(
                offset = %format_args!("{:#x}", self.core.offset()),
                "SpoolReader dropped without finishing"
            );
            self.sink.on_abort();
        }
    }
}

impl<S: RecordSink> SpoolReader<S> {
    pub fn new(sink: S, options: &ExtractOptions) -> Result<Self, ExtractError> {
        Self::with_checksum(sink, options)
    }
}

impl<S: RecordSink, C: Checksum> SpoolReader<S, C> {
    /// Create a reader for archives written with digest `C`.
    pub fn with_checksum(sink: S, options: &ExtractOptions) -> Result<Self, ExtractError> {
        options.validate()?;
        Ok(Self {
            core: ArchiveReader::new(options.integrity),
            sink,
            stats: ExtractStats::default(),
            chunk_size: options.chunk_size,
            poisoned: None,
            finished: false,
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    /// Stream offset of the first byte not yet consumed.
    pub fn offset(&self) -> u64 {
        self.core.offset()
    }

    /// Push the next chunk of archive bytes.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ExtractError> {
        self.check()?;
        match self.feed_inner(data) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Declare the end of the stream and return the final counters.
    pub fn finish(&mut self) -> Result<ExtractStats, ExtractError> {
        self.check()?;
        if self.finished {
            return Ok(self.stats.clone());
        }
        let result = self
            .core
            .finish()
            .map_err(ExtractError::from)
            .and_then(|()| self.sink.on_finish());
        match result {
            Ok(()) => {
                self.finished = true;
                Ok(self.stats.clone())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Consume `source` to its end.
    pub fn read_from<R: Read>(&mut self, mut source: R) -> Result<ExtractStats, ExtractError> {
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(ExtractError::ReadFailed(e))),
            };
            self.feed(&buf[..n])?;
        }
        self.finish()
    }

    /// Stop reading and let the sink discard its partial record.
    pub fn abort(&mut self) {
        if self.poisoned.is_none() && !self.finished {
            self.poisoned = Some(ErrorKind::Cancelled);
            self.sink.on_abort();
        }
    }

    fn check(&self) -> Result<(), ExtractError> {
        match self.poisoned {
            Some(kind) => Err(ExtractError::Poisoned(kind)),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: ExtractError) -> ExtractError {
        if self.poisoned.is_none() {
            self.poisoned = Some(err.kind());
            self.sink.on_abort();
        }
        err
    }

    fn feed_inner(&mut self, data: &[u8]) -> Result<(), ExtractError> {
        self.core.feed(data)?;
        while let Some(event) = self.core.next_event()? {
            self.stats.observe(&event, self.core.record_offset());
            match &event {
                RecordEvent::Record(record) => {
                    self.sink.on_record(record, self.core.record_offset())?
                }
                RecordEvent::Data(chunk) => self.sink.on_data(chunk)?,
                RecordEvent::Verified { record, ok } => self.sink.on_verified(record, *ok)?,
            }
        }
        Ok(())
    }
}

struct OpenTemp<W: Write> {
    writer: BufWriter<W>,
    temp: PathBuf,
}

/// [`RecordSink`] that materializes records below an output root.
///
/// Payloads are streamed into a hidden temporary sibling and renamed into
/// place only once verified. Directory times are applied after the stream
/// ends, deepest first.
pub struct Extractor<F: FileSystem = StdFs> {
    fs: F,
    materializer: Materializer,
    file: Option<OpenTemp<F::Writer>>,
}

impl Extractor {
    pub fn new<P: Into<PathBuf>>(root: P, options: &ExtractOptions) -> Self {
        Self::with_fs(StdFs, root, options)
    }
}

impl<F: FileSystem> Extractor<F> {
    pub fn with_fs<P: Into<PathBuf>>(fs: F, root: P, options: &ExtractOptions) -> Self {
        Self {
            fs,
            materializer: Materializer::new(root, options.restore_times),
            file: None,
        }
    }

    pub fn root(&self) -> &Path {
        self.materializer.root()
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    fn commit(&mut self) -> Result<(), ExtractError> {
        let pending = self.materializer.commit()?;
        self.fs
            .rename(&pending.temp, &pending.target)
            .map_err(|e| ExtractError::CommitFailed(e, pending.target.clone()))?;
        if self.materializer.restore_times() {
            self.fs
                .set_times(
                    &pending.target,
                    pending.times.atime_system(),
                    pending.times.mtime_system(),
                )
                .map_err(|e| ExtractError::SetTimesFailed(e, pending.target.clone()))?;
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.file = None;
        if let Some(pending) = self.materializer.discard() {
            if let Err(e) = self.fs.remove_file(&pending.temp) {
                tracing::debug!(
                    path = %pending.temp.display(),
                    error = %e,
                    "removing temp file failed"
                );
            }
        }
    }
}

impl<F: FileSystem> RecordSink for Extractor<F> {
    fn on_record(&mut self, record: &Record, offset: u64) -> Result<(), ExtractError> {
        match self.materializer.begin(record, offset)? {
            Action::CreateDir { path } => self
                .fs
                .mkdir_all(&path)
                .map_err(|e| ExtractError::CreateDirFailed(e, path)),
            Action::BeginFile(pending) => {
                if let Some(parent) = pending.target.parent() {
                    self.fs
                        .mkdir_all(parent)
                        .map_err(|e| ExtractError::CreateDirFailed(e, parent.to_path_buf()))?;
                }
                let writer = self
                    .fs
                    .open_write(&pending.temp)
                    .map_err(|e| ExtractError::CreateFileFailed(e, pending.temp.clone()))?;

                if record.has_payload() {
                    self.file = Some(OpenTemp {
                        writer: BufWriter::new(writer),
                        temp: pending.temp,
                    });
                    Ok(())
                } else {
                    drop(writer);
                    self.commit()
                }
            }
        }
    }

    fn on_data(&mut self, data: &[u8]) -> Result<(), ExtractError> {
        let Some(file) = self.file.as_mut() else {
            return Err(FormatError::OutOfSequence("payload without an open file").into());
        };
        file.writer
            .write_all(data)
            .map_err(|e| ExtractError::WriteFailed(e, file.temp.clone()))
    }

    fn on_verified(&mut self, _record: &Record, ok: bool) -> Result<(), ExtractError> {
        if !ok {
            self.discard();
            return Ok(());
        }

        if let Some(file) = self.file.take() {
            let temp = file.temp;
            file.writer
                .into_inner()
                .map_err(|e| ExtractError::WriteFailed(e.into_error(), temp.clone()))?;
        }
        self.commit()
    }

    fn on_finish(&mut self) -> Result<(), ExtractError> {
        for (path, times) in self.materializer.directory_times() {
            self.fs
                .set_times(&path, times.atime_system(), times.mtime_system())
                .map_err(|e| ExtractError::SetTimesFailed(e, path.clone()))?;
        }
        Ok(())
    }

    fn on_abort(&mut self) {
        self.discard();
    }
}
