//! Error types for the scratch space.

use std::path::PathBuf;

/// Result type for scratch space operations.
pub type Result<T> = std::result::Result<T, ScratchError>;

/// Errors that can occur during scratch space operations.
#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    /// I/O operation failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Path validation failed - potential security issue
    #[error("Path validation failed: {path:?} - {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// Entry does not exist in the scratch space
    #[error("Entry not found: {name}")]
    NotFound { name: String },

    /// Directory creation failed
    #[error("Failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Permissions error
    #[error("Permission denied: {operation} on {path:?}")]
    Permission { operation: String, path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ScratchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the requested entry is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
