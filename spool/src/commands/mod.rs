mod create;
mod extract;
mod list;

use std::path::Path;

use tokio::io::AsyncRead;

use crate::error::{Error, Result};

pub use create::run as create;
pub use extract::run as extract;
pub use list::run as list;

/// `None` and `-` both mean standard input.
async fn open_source(path: Option<&Path>) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    match path {
        None => Ok(Box::new(tokio::io::stdin())),
        Some(p) if p == Path::new("-") => Ok(Box::new(tokio::io::stdin())),
        Some(p) => {
            let file = tokio::fs::File::open(p)
                .await
                .map_err(|source| Error::OpenArchive {
                    path: p.to_path_buf(),
                    source,
                })?;
            Ok(Box::new(file))
        }
    }
}
