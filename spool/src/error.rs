use std::path::PathBuf;

use miette::Diagnostic;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("Cannot open archive `{}`", .path.display())]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create archive `{}`", .path.display())]
    CreateArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive already exists: `{}`", .path.display())]
    #[diagnostic(help("Use -f/--force to overwrite"))]
    ArchiveExists { path: PathBuf },

    #[error("Cannot archive `{}`", .path.display())]
    Pack {
        path: PathBuf,
        #[source]
        source: spool_format::PackError,
    },

    #[error("Cannot extract archive")]
    Extract {
        #[source]
        source: spool_format::ExtractError,
        #[help]
        advice: Option<String>,
    },

    #[error("Cannot create directory `{}`", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write to standard output")]
    Stdout {
        #[source]
        source: std::io::Error,
    },

    #[error("{count} record(s) failed verification")]
    #[diagnostic(help("The archive is damaged; the listed files were not written"))]
    CorruptRecords { count: usize },
}

impl From<spool_format::ExtractError> for Error {
    fn from(source: spool_format::ExtractError) -> Self {
        use spool_format::ErrorKind;

        let advice = match source.kind() {
            ErrorKind::IntegrityFailure => Some("Use --keep-going to skip damaged files"),
            ErrorKind::PathEscape => {
                Some("The archive tries to write outside the output directory")
            }
            ErrorKind::StructuralCorruption | ErrorKind::SizeFieldInconsistency => {
                Some("Is this a complete spool archive?")
            }
            _ => None,
        };
        Error::Extract {
            source,
            advice: advice.map(str::to_string),
        }
    }
}
