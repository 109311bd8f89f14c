use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::{
    checksum::{Checksum, DefaultChecksum},
    core::{root_record_path, ArchiveWriter, PackOptions, PackStats},
    counting::CountingWriter,
    error::{ErrorKind, FormatError, PackError},
    fs::{FileSystem, Stat, StdFs},
    hashing::HashingReader,
    path::RecordPath,
    record::Record,
};

struct Frame {
    dir: PathBuf,
    rel: RecordPath,
    entries: std::vec::IntoIter<OsString>,
}

struct OpenFile<R, C> {
    path: PathBuf,
    reader: HashingReader<R, C>,
    remaining: u64,
}

/// Pull-driven archive producer over a directory tree.
///
/// Each call to [`next_chunk`](Self::next_chunk) resumes the pre-order walk
/// just far enough to produce one piece of the archive: a record header, one
/// payload chunk of at most `chunk_size` bytes, or a checksum. Nothing is
/// read from disk until the consumer asks for it, and at most one file is
/// open at a time.
pub struct SpoolWriter<F: FileSystem = StdFs, C: Checksum = DefaultChecksum> {
    fs: F,
    core: ArchiveWriter,
    root: PathBuf,
    chunk_size: usize,
    pending_root: Option<(RecordPath, Stat)>,
    stack: Vec<Frame>,
    current: Option<OpenFile<F::Reader, C>>,
    buf: Vec<u8>,
    /// Position of the next unread byte of `buf` for the `Read` impl.
    read_pos: usize,
    poisoned: Option<ErrorKind>,
    finished: bool,
}

impl<F: FileSystem, C: Checksum> Drop for SpoolWriter<F, C> {
    fn drop(&mut self) {
        if !self.finished && self.poisoned.is_none() {
            tracing::warn!(
                "SpoolWriter dropped without finishing. \
                 Archive of {:?} is incomplete.",
                self.root
            );
        }
    }
}

impl SpoolWriter {
    /// Archive the tree at `root` with default options.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PackError> {
        Self::with_fs(StdFs, root, PackOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(root: P, options: PackOptions) -> Result<Self, PackError> {
        Self::with_fs(StdFs, root, options)
    }
}

impl<F: FileSystem, C: Checksum> SpoolWriter<F, C> {
    /// Create a writer over any [`FileSystem`].
    ///
    /// A missing or non-directory root fails here, before any bytes exist.
    pub fn with_fs<P: AsRef<Path>>(
        fs: F,
        root: P,
        options: PackOptions,
    ) -> Result<Self, PackError> {
        options.validate()?;
        let root = root.as_ref().to_path_buf();

        let stat = fs
            .stat(&root)
            .map_err(|e| PackError::MissingRoot(e, root.clone()))?;
        if !stat.is_dir {
            return Err(PackError::RootNotDirectory(root));
        }
        let resolved = if options.prefix.is_none() && root.file_name().is_none() {
            let canonical = fs
                .canonicalize(&root)
                .map_err(|e| PackError::MissingRoot(e, root.clone()))?;
            Some(canonical)
        } else {
            None
        };
        let rel = root_record_path(&root, resolved.as_deref(), &options)?;

        Ok(Self {
            fs,
            core: ArchiveWriter::new(),
            root,
            chunk_size: options.chunk_size,
            pending_root: Some((rel, stat)),
            stack: Vec::new(),
            current: None,
            buf: Vec::with_capacity(options.chunk_size),
            read_pos: 0,
            poisoned: None,
            finished: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Counters for everything produced so far.
    pub fn stats(&self) -> PackStats {
        self.core.stats()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Produce the next piece of the archive, or `None` once the walk is
    /// complete.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>, PackError> {
        match self.poisoned {
            Some(ErrorKind::Cancelled) => return Err(PackError::Cancelled),
            Some(kind) => return Err(PackError::Poisoned(kind)),
            None => {}
        }
        if self.finished {
            return Ok(None);
        }

        self.read_pos = 0;
        match self.advance() {
            Ok(true) => Ok(Some(&self.buf)),
            Ok(false) => {
                self.finished = true;
                Ok(None)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Drive the whole walk into `sink`.
    pub fn write_to<W: Write>(&mut self, sink: W) -> Result<PackStats, PackError> {
        let mut sink = CountingWriter::new(sink);

        if self.read_pos < self.buf.len() {
            if let Err(e) = sink.write_all(&self.buf[self.read_pos..]) {
                return Err(self.fail(PackError::WriteFailed(e)));
            }
            self.read_pos = self.buf.len();
        }

        while let Some(chunk) = self.next_chunk()? {
            if let Err(e) = sink.write_all(chunk) {
                return Err(self.fail(PackError::WriteFailed(e)));
            }
        }
        if let Err(e) = sink.flush() {
            return Err(self.fail(PackError::WriteFailed(e)));
        }

        tracing::debug!(bytes = sink.bytes_written(), "archive written");
        Ok(self.core.stats())
    }

    /// Stop the walk and release any open file. Later calls fail with
    /// [`PackError::Cancelled`].
    pub fn abort(&mut self) {
        self.release();
        self.poisoned = Some(ErrorKind::Cancelled);
    }

    fn release(&mut self) {
        self.current = None;
        self.stack.clear();
        self.pending_root = None;
        self.buf.clear();
        self.read_pos = 0;
    }

    fn fail(&mut self, err: PackError) -> PackError {
        self.release();
        self.poisoned = Some(err.kind());
        err
    }

    /// Fill `buf` with the next piece. Returns `false` when the walk is done.
    fn advance(&mut self) -> Result<bool, PackError> {
        self.buf.clear();

        if let Some(mut file) = self.current.take() {
            if file.remaining > 0 {
                let want = file.remaining.min(self.chunk_size as u64) as usize;
                self.buf.resize(want, 0);
                file.reader
                    .read_exact(&mut self.buf)
                    .map_err(|e| match e.kind() {
                        std::io::ErrorKind::UnexpectedEof => {
                            PackError::FileShrank(file.path.clone())
                        }
                        _ => PackError::ReadFailed(e, file.path.clone()),
                    })?;
                self.core
                    .payload(want)
                    .map_err(|e| PackError::Format(e, file.path.clone()))?;
                file.remaining -= want as u64;
                self.current = Some(file);
                return Ok(true);
            }

            let checksum = self
                .core
                .end_record(file.reader.finalize())
                .map_err(|e| PackError::Format(e, file.path))?;
            self.buf.extend_from_slice(&checksum);
            return Ok(true);
        }

        if let Some((rel, stat)) = self.pending_root.take() {
            let root = self.root.clone();
            self.begin_directory(root, rel, stat)?;
            return Ok(true);
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.core
                    .finish()
                    .map_err(|e| PackError::Format(e, self.root.clone()))?;
                return Ok(false);
            };
            let Some(name) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };

            let path = frame.dir.join(&name);
            let name = name
                .to_str()
                .ok_or_else(|| PackError::UnrepresentableName(path.clone()))?;
            let stat = self
                .fs
                .stat(&path)
                .map_err(|e| PackError::StatFailed(e, path.clone()))?;

            if !stat.is_dir && !stat.is_file {
                tracing::warn!(
                    path = %path.display(),
                    "skipping entry that is neither a file nor a directory"
                );
                continue;
            }

            let rel = frame.rel.join(name, stat.is_dir).map_err(|e| {
                PackError::Format(
                    FormatError::UnrepresentablePath {
                        reason: e.as_str(),
                    },
                    path.clone(),
                )
            })?;

            if stat.is_dir {
                self.begin_directory(path, rel, stat)?;
            } else {
                self.begin_file(path, rel, stat)?;
            }
            return Ok(true);
        }
    }

    fn begin_directory(
        &mut self,
        path: PathBuf,
        rel: RecordPath,
        stat: Stat,
    ) -> Result<(), PackError> {
        let times = stat
            .timestamps()
            .map_err(|e| PackError::Format(e, path.clone()))?;
        let entries = self
            .fs
            .list_dir(&path)
            .map_err(|e| PackError::ReadDirFailed(e, path.clone()))?;
        let header = self
            .core
            .begin_record(&Record::directory(rel.clone(), times))
            .map_err(|e| PackError::Format(e, path.clone()))?;

        self.buf.extend_from_slice(&header);
        self.stack.push(Frame {
            dir: path,
            rel,
            entries: entries.into_iter(),
        });
        Ok(())
    }

    fn begin_file(
        &mut self,
        path: PathBuf,
        rel: RecordPath,
        stat: Stat,
    ) -> Result<(), PackError> {
        let times = stat
            .timestamps()
            .map_err(|e| PackError::Format(e, path.clone()))?;

        let reader = if stat.size > 0 {
            let file = self
                .fs
                .open_read(&path)
                .map_err(|e| PackError::ReadFailed(e, path.clone()))?;
            Some(HashingReader::new(file))
        } else {
            None
        };

        let header = self
            .core
            .begin_record(&Record::file(rel, stat.size, times))
            .map_err(|e| PackError::Format(e, path.clone()))?;
        self.buf.extend_from_slice(&header);

        if let Some(reader) = reader {
            self.current = Some(OpenFile {
                path,
                reader,
                remaining: stat.size,
            });
        }
        Ok(())
    }
}

impl<F: FileSystem, C: Checksum> Read for SpoolWriter<F, C> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.read_pos < self.buf.len() {
                let n = out.len().min(self.buf.len() - self.read_pos);
                out[..n].copy_from_slice(&self.buf[self.read_pos..self.read_pos + n]);
                self.read_pos += n;
                return Ok(n);
            }
            match self.next_chunk() {
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(0),
                Err(err) => return Err(std::io::Error::other(err)),
            }
        }
    }
}
