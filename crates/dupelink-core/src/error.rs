//! Error types for dedup runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors that abort a run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root is neither a directory nor a regular file.
    #[error("Root is not a regular file or directory: {path}")]
    NotARegularFileOrDirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// A fingerprint string that is not 64 hex digits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid content hash {value:?}: {reason}")]
pub struct HashParseError {
    /// The rejected input.
    pub value: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Kind of per-file warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error opening or reading file content.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// The path could not be made absolute.
    PathError,
    /// A link transaction failed and was rolled back.
    LinkFailed,
    /// A persistent store lookup failed.
    StoreError,
    /// The canonical copy is gone, so the duplicate was left in place.
    MissingCanonical,
}

/// Non-fatal warning encountered during a run. The file is skipped or left
/// untouched, and the run continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    #[serde(serialize_with = "crate::paths::serialize_lossy")]
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a read error warning, or a permission warning when that is
    /// what the I/O error says.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        if error.kind() == std::io::ErrorKind::PermissionDenied {
            return Self {
                message: format!("Permission denied: {}", path.display()),
                path,
                kind: WarningKind::PermissionDenied,
            };
        }
        Self {
            message: format!("Read error: {error}"),
            path,
            kind: WarningKind::ReadError,
        }
    }

    /// Create a rolled-back link warning.
    pub fn link_failed(path: impl Into<PathBuf>, error: &dyn std::error::Error) -> Self {
        Self {
            path: path.into(),
            message: format!("Link rolled back: {error}"),
            kind: WarningKind::LinkFailed,
        }
    }
}
