//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No regular file with this name in the storage directory.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Name rejected by sanitization.
    #[error("invalid name: {0}")]
    InvalidName(#[from] filemesh_types::Error),

    /// A previous holder of an internal lock panicked.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether the error only says the file is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
