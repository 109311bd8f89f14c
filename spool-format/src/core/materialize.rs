//! Sans-IO mapping from parsed records to filesystem actions.
//!
//! The materializer decides *where* things go under an output root and in
//! what order timestamps are applied; the frontend performs the actions.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::FormatError;
use crate::record::{Record, Timestamps};

/// Suffix of the temporary sibling a file payload is streamed into.
pub const TEMP_SUFFIX: &str = ".spool-part";

/// A file whose payload is being written to `temp` and which becomes
/// `target` once verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub temp: PathBuf,
    pub target: PathBuf,
    pub times: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create the directory and any missing parents.
    CreateDir { path: PathBuf },
    /// Create the parent directory if needed and open `temp` for writing.
    BeginFile(PendingFile),
}

#[derive(Debug)]
pub struct Materializer {
    root: PathBuf,
    restore_times: bool,
    pending: Option<PendingFile>,
    directories: Vec<(usize, PathBuf, Timestamps)>,
    materialized: HashSet<PathBuf>,
}

/// `.name.spool-part`, or `.name.N.spool-part` for the first `N` that does not
/// name an entry already materialized.
fn temp_path_for(target: &Path, taken: &HashSet<PathBuf>) -> Option<PathBuf> {
    let name = target.file_name()?;
    (0u64..).find_map(|n| {
        let mut temp_name = OsString::from(".");
        temp_name.push(name);
        if n > 0 {
            temp_name.push(format!(".{n}"));
        }
        temp_name.push(TEMP_SUFFIX);
        let temp = target.with_file_name(temp_name);
        (!taken.contains(&temp)).then_some(temp)
    })
}

impl Materializer {
    pub fn new<P: Into<PathBuf>>(root: P, restore_times: bool) -> Self {
        Self {
            root: root.into(),
            restore_times,
            pending: None,
            directories: Vec::new(),
            materialized: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn restore_times(&self) -> bool {
        self.restore_times
    }

    /// The file currently being written, if any.
    pub fn pending(&self) -> Option<&PendingFile> {
        self.pending.as_ref()
    }

    /// Resolve a freshly parsed record, starting at archive `offset`, to the
    /// action that materializes it.
    ///
    /// Rejects any path resolving outside the root before anything is
    /// written.
    pub fn begin(&mut self, record: &Record, offset: u64) -> Result<Action, FormatError> {
        if self.pending.is_some() {
            return Err(FormatError::OutOfSequence(
                "record started while a file is still pending",
            ));
        }

        let escape = || FormatError::PathEscape {
            path: record.path.to_string(),
            offset,
        };
        let target = record
            .path
            .resolve_under(&self.root)
            .map_err(|_| escape())?;

        if record.is_dir() {
            if self.restore_times {
                self.directories
                    .push((record.path.depth(), target.clone(), record.times));
            }
            self.materialized.insert(target.clone());
            return Ok(Action::CreateDir { path: target });
        }

        let temp = temp_path_for(&target, &self.materialized).ok_or_else(escape)?;
        self.materialized.insert(target.clone());
        let pending = PendingFile {
            temp,
            target,
            times: record.times,
        };
        self.pending = Some(pending.clone());
        Ok(Action::BeginFile(pending))
    }

    /// Take the verified pending file so it can be renamed into place.
    pub fn commit(&mut self) -> Result<PendingFile, FormatError> {
        self.pending
            .take()
            .ok_or(FormatError::OutOfSequence("no file pending"))
    }

    /// Take the pending file so its temporary can be removed.
    pub fn discard(&mut self) -> Option<PendingFile> {
        self.pending.take()
    }

    /// Directory timestamps still to apply, deepest directories first.
    ///
    /// Drains the list, so a second call returns nothing.
    pub fn directory_times(&mut self) -> Vec<(PathBuf, Timestamps)> {
        let mut dirs = std::mem::take(&mut self.directories);
        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        dirs.into_iter().map(|(_, path, times)| (path, times)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::RecordPath;

    fn times(mtime: u64) -> Timestamps {
        Timestamps {
            ctime: 0,
            mtime,
            atime: mtime,
        }
    }

    #[test]
    fn files_go_through_a_hidden_sibling() {
        let mut m = Materializer::new("/out", true);
        let record = Record::file(RecordPath::new("a/b.txt").unwrap(), 3, times(1));

        let action = m.begin(&record, 0).unwrap();
        let expected = PendingFile {
            temp: PathBuf::from("/out/a/.b.txt.spool-part"),
            target: PathBuf::from("/out/a/b.txt"),
            times: times(1),
        };
        assert_eq!(action, Action::BeginFile(expected.clone()));
        assert_eq!(m.pending(), Some(&expected));

        // a second record cannot start before the first is settled
        assert!(m.begin(&record, 0).is_err());
        assert_eq!(m.commit().unwrap(), expected);
        assert!(m.commit().is_err());
    }

    #[test]
    fn escapes_are_rejected_before_any_action() {
        let mut m = Materializer::new("/out", true);
        let record = Record::file(RecordPath::new("../escape.txt").unwrap(), 1, times(1));
        let err = m.begin(&record, 0x2a).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PathEscape);
        assert!(matches!(err, FormatError::PathEscape { offset: 0x2a, .. }));
        assert!(m.pending().is_none());
    }

    #[test]
    fn directory_times_apply_deepest_first() {
        let mut m = Materializer::new("/out", true);
        for (path, t) in [("r/", 1), ("r/a/", 2), ("r/a/b/", 3), ("r/c/", 4)] {
            let action = m
                .begin(&Record::directory(RecordPath::new(path).unwrap(), times(t)), 0)
                .unwrap();
            assert!(matches!(action, Action::CreateDir { .. }));
        }

        let order: Vec<u64> = m.directory_times().iter().map(|(_, t)| t.mtime).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
        assert!(m.directory_times().is_empty());
    }

    #[test]
    fn no_directory_times_when_disabled() {
        let mut m = Materializer::new("/out", false);
        m.begin(&Record::directory(RecordPath::new("r/").unwrap(), times(1)), 0)
            .unwrap();
        assert!(m.directory_times().is_empty());
        assert!(!m.restore_times());
    }

    #[test]
    fn temp_names_avoid_entries_already_materialized() {
        let mut m = Materializer::new("/out", false);
        let real = Record::file(RecordPath::new("a/.b.spool-part").unwrap(), 4, times(1));
        m.begin(&real, 0).unwrap();
        m.commit().unwrap();
        let numbered = Record::file(RecordPath::new("a/.b.1.spool-part").unwrap(), 4, times(1));
        m.begin(&numbered, 0).unwrap();
        m.commit().unwrap();

        let record = Record::file(RecordPath::new("a/b").unwrap(), 3, times(1));
        let Action::BeginFile(pending) = m.begin(&record, 0).unwrap() else {
            panic!("expected a file action");
        };
        assert_eq!(pending.temp, PathBuf::from("/out/a/.b.2.spool-part"));
        assert_eq!(pending.target, PathBuf::from("/out/a/b"));
    }
}
