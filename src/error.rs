//! Error types for vndat

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for vndat operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Not a .vndat (zip) file: {}", .0.display())]
    NotAContainer(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unsupported file: {}", .0.display())]
    UnsupportedInput(PathBuf),

    #[error("Invalid entry name: {0}")]
    InvalidEntryName(String),

    #[error("Failed to write {name}: {source}")]
    Entry {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to remove temporary folder {}: {source}", path.display())]
    TempCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an error raised while extracting a single entry
    pub fn entry(name: impl Into<String>, source: Error) -> Self {
        Error::Entry {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Whether the failure is confined to one entry
    ///
    /// Recoverable errors are logged and the surrounding loop moves on to the
    /// next entry. Everything else aborts the current input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Entry { .. })
    }
}

/// Result type alias for vndat operations
pub type Result<T> = std::result::Result<T, Error>;
