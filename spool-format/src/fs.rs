//! Filesystem capability consumed by the blocking frontends.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::FormatError;
use crate::record::Timestamps;

/// What the writer needs to know about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub is_dir: bool,
    pub is_file: bool,
    pub size: u64,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    pub atime: SystemTime,
}

impl Stat {
    /// Build from std metadata without following the final symlink.
    pub fn from_metadata(meta: &std::fs::Metadata) -> std::io::Result<Stat> {
        let mtime = meta.modified()?;
        let atime = meta.accessed().unwrap_or(mtime);
        Ok(Stat {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            size: meta.len(),
            ctime: change_time(meta).unwrap_or(mtime),
            mtime,
            atime,
        })
    }

    pub fn timestamps(&self) -> Result<Timestamps, FormatError> {
        Timestamps::from_system(self.ctime, self.mtime, self.atime)
    }
}

#[cfg(unix)]
fn change_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::{Duration, UNIX_EPOCH};

    let secs = u64::try_from(meta.ctime()).ok()?;
    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    Some(UNIX_EPOCH + Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn change_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    meta.created().ok()
}

/// The filesystem operations the archive writer and extractor perform.
///
/// [`StdFs`] maps these straight onto `std::fs`; tests and embedders can
/// substitute their own.
pub trait FileSystem {
    type Reader: Read;
    type Writer: Write;

    fn stat(&self, path: &Path) -> std::io::Result<Stat>;

    /// Names of the entries directly inside `path`, in listing order.
    fn list_dir(&self, path: &Path) -> std::io::Result<Vec<OsString>>;

    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf>;

    fn open_read(&self, path: &Path) -> std::io::Result<Self::Reader>;

    /// Create or truncate a file for writing.
    fn open_write(&self, path: &Path) -> std::io::Result<Self::Writer>;

    fn mkdir_all(&self, path: &Path) -> std::io::Result<()>;

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> std::io::Result<()>;

    /// Move `from` over `to` in one step.
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FileSystem for StdFs {
    type Reader = std::fs::File;
    type Writer = std::fs::File;

    fn stat(&self, path: &Path) -> std::io::Result<Stat> {
        Stat::from_metadata(&std::fs::symlink_metadata(path)?)
    }

    fn list_dir(&self, path: &Path) -> std::io::Result<Vec<OsString>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect()
    }

    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn open_read(&self, path: &Path) -> std::io::Result<Self::Reader> {
        std::fs::File::open(path)
    }

    fn open_write(&self, path: &Path) -> std::io::Result<Self::Writer> {
        std::fs::File::create(path)
    }

    fn mkdir_all(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> std::io::Result<()> {
        set_file_times(path, atime, mtime)
    }

    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Set access and modification times on a file or directory.
#[cfg(not(windows))]
pub fn set_file_times(path: &Path, atime: SystemTime, mtime: SystemTime) -> std::io::Result<()> {
    let times = std::fs::FileTimes::new()
        .set_accessed(atime)
        .set_modified(mtime);
    std::fs::File::open(path)?.set_times(times)
}

/// Set access and modification times on a file or directory.
#[cfg(windows)]
pub fn set_file_times(path: &Path, atime: SystemTime, mtime: SystemTime) -> std::io::Result<()> {
    use std::os::windows::fs::OpenOptionsExt;
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

    let times = std::fs::FileTimes::new()
        .set_accessed(atime)
        .set_modified(mtime);
    std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)?
        .set_times(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn std_fs_stats_and_lists() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"abc").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();

        let fs = StdFs;
        let stat = fs.stat(&tmp.path().join("a.txt")).unwrap();
        assert!(stat.is_file);
        assert_eq!(stat.size, 3);
        assert!(fs.stat(tmp.path()).unwrap().is_dir);

        let mut names = fs.list_dir(tmp.path()).unwrap();
        names.sort();
        assert_eq!(names, vec![OsString::from("a.txt"), OsString::from("sub")]);
    }

    #[test]
    fn std_fs_sets_times_on_files_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, b"abc").unwrap();

        let when = UNIX_EPOCH + Duration::from_millis(1_500_000_000_250);
        for path in [file.as_path(), tmp.path()] {
            StdFs.set_times(path, when, when).unwrap();
            let stat = StdFs.stat(path).unwrap();
            assert_eq!(stat.mtime, when);
            assert_eq!(stat.timestamps().unwrap().mtime, 1_500_000_000_250);
        }
    }
}
