use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required credential or identifier is missing or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single source file could not be parsed.
    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// An embedding, generation or remote search call failed.
    #[error("{backend} request failed: {message}")]
    Backend {
        backend: String,
        message: String,
        retryable: bool,
    },

    #[error("No index found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index at {} is corrupted: {reason}; delete it and rebuild", path.display())]
    IndexCorrupted { path: PathBuf, reason: String },

    #[error("Index was built with embedder '{indexed}' but '{configured}' is configured")]
    EmbedderMismatch { indexed: String, configured: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend { backend: backend.into(), message: message.into(), retryable }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
