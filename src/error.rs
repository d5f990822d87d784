//! Error types for content-relay
//!
//! This module defines the error hierarchy used inside the crate:
//! - Backend errors (document open and traversal failures)
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Errors never cross the caller-facing boundary. The coordinator and the
//! comparator fold them into result codes; these types exist so the
//! internals can propagate with `?` and log with context.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for content-relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document backend errors
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Document could not be opened
    #[error("Failed to open '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Document opened but is not usable
    #[error("Invalid document '{path}': {reason}")]
    InvalidDocument { path: PathBuf, reason: String },

    /// Traversal failed part way through
    #[error("Traversal of '{path}' failed on page {page}: {reason}")]
    TraversalFailed {
        path: PathBuf,
        page: usize,
        reason: String,
    },
}

impl BackendError {
    /// Path of the document the error refers to
    pub fn path(&self) -> &PathBuf {
        match self {
            BackendError::OpenFailed { path, .. } => path,
            BackendError::InvalidDocument { path, .. } => path,
            BackendError::TraversalFailed { path, .. } => path,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Timeout outside the accepted range
    #[error("Invalid {name} {value_ms}ms: must be between {min_ms}ms and {max_ms}ms")]
    InvalidTimeout {
        name: &'static str,
        value_ms: u64,
        min_ms: u64,
        max_ms: u64,
    },

    /// Buffer size outside the accepted range
    #[error("Invalid buffer size {units}: must be between {min} and {max} units")]
    InvalidBufferSize { units: usize, min: usize, max: usize },

    /// Field name or index not in the catalog
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Host interface version not in `HI.LOW` form
    #[error("Invalid interface version '{0}': expected HI.LOW")]
    InvalidInterfaceVersion(String),

    /// Source path error
    #[error("Invalid source '{path}': {reason}")]
    InvalidSource { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker did not exit within the join timeout
    #[error("Worker {id} did not exit within {timeout_ms}ms")]
    JoinTimeout { id: usize, timeout_ms: u64 },
}

/// Result type alias for RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for BackendError
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_path() {
        let err = BackendError::OpenFailed {
            path: PathBuf::from("/docs/a.txt"),
            reason: "missing".into(),
        };
        assert_eq!(err.path(), &PathBuf::from("/docs/a.txt"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_error_conversion() {
        let err = WorkerError::SpawnFailed {
            id: 3,
            reason: "limit".into(),
        };
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Worker(_)));
    }
}
