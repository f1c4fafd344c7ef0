//! Error and warning types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while walking or indexing a directory.
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

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// An exclusion or listing pattern could not be compiled.
    #[error("Invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
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

    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised while loading, saving or validating a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON encoding or decoding failed.
    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document does not have the root/subdirs/files shape.
    #[error("Malformed snapshot: {message}")]
    Malformed { message: String },

    /// Reading or writing a snapshot file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied reading a directory below the root.
    PermissionDenied,
    /// Error reading a directory below the root.
    ReadError,
    /// A name that is not valid UTF-8; the entry was left out of the snapshot.
    InvalidName,
    /// An indexer failed for one entry; its key was left out of the record.
    IndexFailed,
    /// An update targeted a path the index did not contain yet.
    NotInIndex,
}

/// Non-fatal warning encountered while walking or indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &dyn std::fmt::Display) -> Self {
        let path = path.into();
        Self {
            message: format!("Read error: {error}"),
            path,
            kind: WarningKind::ReadError,
        }
    }

    /// Create a warning for a walk error, classifying permission failures.
    pub fn walk_error(
        path: impl Into<PathBuf>,
        kind: Option<std::io::ErrorKind>,
        error: &dyn std::fmt::Display,
    ) -> Self {
        match kind {
            Some(std::io::ErrorKind::PermissionDenied) => Self {
                message: format!("Permission denied: {error}"),
                path: path.into(),
                kind: WarningKind::PermissionDenied,
            },
            _ => Self::read_error(path, error),
        }
    }

    /// Create a warning for an entry whose name has no UTF-8 snapshot key.
    pub fn invalid_name(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Name is not valid UTF-8: {}", path.display()),
            path,
            kind: WarningKind::InvalidName,
        }
    }

    /// Create a warning for an indexer that failed on `path`.
    pub fn index_failed(
        path: impl Into<PathBuf>,
        indexer: &str,
        error: &dyn std::fmt::Display,
    ) -> Self {
        let path = path.into();
        Self {
            message: format!("Indexer {indexer} failed: {error}"),
            path,
            kind: WarningKind::IndexFailed,
        }
    }

    /// Create a warning for an update of a path missing from the index.
    pub fn not_in_index(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Path was not in index: {}", path.display()),
            path,
            kind: WarningKind::NotInIndex,
        }
    }
}
