//! Error types for the hashing/file-I/O/on-disk cache layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the hashing, file-I/O, and on-disk cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A user-supplied save callback failed.
    #[error("failed to save payload to {path}: {reason}")]
    SaveFailed { path: PathBuf, reason: String },

    /// A user-supplied load callback failed for a reason other than the
    /// payload simply not existing (that case is a clean miss, not an error).
    #[error("failed to load payload from {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// The sidecar file could not be encoded or decoded.
    #[error("sidecar codec error at {path}: {source}")]
    SidecarCodec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A filesystem operation (other than "file not found" on a load path,
    /// which is a miss) failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io { path: path.into(), source }
    }
}
