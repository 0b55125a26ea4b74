//! Store errors.

use std::path::PathBuf;

use dupelink_core::HashParseError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the persistent store and the interchange files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An index file is not a `{hash: path}` JSON object.
    #[error("Malformed index file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A stored row carries a fingerprint that does not parse.
    #[error("Invalid stored hash for {path}: {source}")]
    InvalidHash {
        path: PathBuf,
        #[source]
        source: HashParseError,
    },

    /// Paths are stored as text, so a path that is not UTF-8 has no row.
    #[error("Path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    /// The writer thread is no longer receiving.
    #[error("Store writer has stopped")]
    WriterGone,
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
