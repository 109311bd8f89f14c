use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPathError {
    EmptyPath,
    ContainsNul,
    InvalidUtf8,
    InvalidComponent,
    TooLong,
    NotADirectory,
    Escapes,
}

impl std::error::Error for RecordPathError {}

impl fmt::Display for RecordPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RecordPathError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordPathError::EmptyPath => "no path provided",
            RecordPathError::ContainsNul => "path contains a NUL byte",
            RecordPathError::InvalidUtf8 => "path is not valid UTF-8",
            RecordPathError::InvalidComponent => "path component is empty, `.`, `..` or contains a separator",
            RecordPathError::TooLong => "path exceeds the maximum record path length",
            RecordPathError::NotADirectory => "cannot join onto a file path",
            RecordPathError::Escapes => "path resolves outside the output root",
        }
    }
}
