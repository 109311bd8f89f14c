use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

mod error;

pub use self::error::RecordPathError;

/// The separator used between components of a [`RecordPath`] on the wire,
/// regardless of platform. A trailing separator marks a directory record.
pub const PATH_SEP: char = '/';

/// Upper bound on the encoded length of a record path, excluding the NUL
/// terminator. Readers refuse to buffer more than this while looking for the
/// terminator.
pub const MAX_PATH_LEN: usize = 64 * 1024;

/// An archive-relative path as it travels on the wire.
///
/// A `RecordPath` is never empty and never contains NUL. Paths read from an
/// archive are otherwise untrusted: they are only checked for escapes when
/// resolved against an output root with [`RecordPath::resolve_under`].
#[derive(Debug, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RecordPath(pub(crate) String);

fn check_component(component: &str) -> Result<(), RecordPathError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(PATH_SEP)
    {
        return Err(RecordPathError::InvalidComponent);
    }
    if component.contains('\0') {
        return Err(RecordPathError::ContainsNul);
    }
    Ok(())
}

impl RecordPath {
    /// Accept a path in its wire form, as read from an archive.
    pub fn new<S: Into<String>>(path: S) -> Result<RecordPath, RecordPathError> {
        let path = path.into();
        if path.is_empty() {
            return Err(RecordPathError::EmptyPath);
        }
        if path.contains('\0') {
            return Err(RecordPathError::ContainsNul);
        }
        if path.len() > MAX_PATH_LEN {
            return Err(RecordPathError::TooLong);
        }
        Ok(RecordPath(path))
    }

    pub(crate) fn from_wire(bytes: &[u8]) -> Result<RecordPath, RecordPathError> {
        let s = std::str::from_utf8(bytes).map_err(|_| RecordPathError::InvalidUtf8)?;
        RecordPath::new(s)
    }

    /// Build a canonical path from individual names, as the writer does while
    /// walking a tree.
    pub fn from_components<I, S>(components: I, is_dir: bool) -> Result<RecordPath, RecordPathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::new();
        for component in components {
            let component = component.as_ref();
            check_component(component)?;
            if !out.is_empty() {
                out.push(PATH_SEP);
            }
            out.push_str(component);
        }
        if out.is_empty() {
            return Err(RecordPathError::EmptyPath);
        }
        if is_dir {
            out.push(PATH_SEP);
        }
        RecordPath::new(out)
    }

    /// Append a child name to a directory path.
    pub fn join(&self, name: &str, is_dir: bool) -> Result<RecordPath, RecordPathError> {
        if !self.is_dir() {
            return Err(RecordPathError::NotADirectory);
        }
        check_component(name)?;
        let mut out = String::with_capacity(self.0.len() + name.len() + 1);
        out.push_str(&self.0);
        out.push_str(name);
        if is_dir {
            out.push(PATH_SEP);
        }
        RecordPath::new(out)
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Directory records are told apart from files only by the trailing separator.
    #[inline(always)]
    pub fn is_dir(&self) -> bool {
        self.0.ends_with(PATH_SEP)
    }

    /// Lexically normalized form used to detect overlapping records.
    ///
    /// Empty and `.` components are dropped and `..` cancels the component
    /// before it, so `r/a`, `r//a`, `r/./a`, `r/x/../a` and `r/a/` all share
    /// a key. A `..` with nothing left to cancel is kept; such paths never
    /// resolve under a root anyway.
    pub fn key(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for component in self.0.split(PATH_SEP) {
            match component {
                "" | "." => {}
                ".." if parts.last().is_some_and(|p| *p != "..") => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }

        let joined = parts.join("/");
        if self.0.starts_with(PATH_SEP) {
            format!("/{joined}")
        } else {
            joined
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEP).filter(|c| !c.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Resolve this path below `root`, refusing anything that lands outside it.
    ///
    /// Resolution is lexical: `.` is dropped, `..` pops the previous component
    /// and may not climb above the root, and absolute or prefixed components
    /// are rejected outright. A path that resolves to the root itself is also
    /// rejected, since it names no entry.
    ///
    /// Nothing on disk is consulted. A symlink that already exists below
    /// `root` is followed by whatever later opens the returned path, so
    /// `root` must be a directory the caller controls, with no links planted
    /// in it by the archive's author.
    pub fn resolve_under(&self, root: &Path) -> Result<PathBuf, RecordPathError> {
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

        if self.0.starts_with(PATH_SEP) {
            return Err(RecordPathError::Escapes);
        }

        for segment in self.0.split(PATH_SEP) {
            for component in Path::new(segment).components() {
                match component {
                    Component::Normal(name) => parts.push(name),
                    Component::CurDir => {}
                    Component::ParentDir => {
                        if parts.pop().is_none() {
                            return Err(RecordPathError::Escapes);
                        }
                    }
                    Component::RootDir | Component::Prefix(_) => {
                        return Err(RecordPathError::Escapes);
                    }
                }
            }
        }

        if parts.is_empty() {
            return Err(RecordPathError::Escapes);
        }

        let mut out = root.to_path_buf();
        out.extend(parts);
        Ok(out)
    }
}

impl AsRef<[u8]> for RecordPath {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
