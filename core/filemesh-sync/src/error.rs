//! Error types for the sync layer.

use filemesh_storage::StorageError;
use filemesh_types::PeerAddress;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result of every client-side call to a peer.
pub type TransferResult<T> = Result<T, TransferError>;

/// How a call to a peer failed.
///
/// Every variant is recoverable: the engine skips the peer (listing) or
/// the file (transfers) and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Connection refused, DNS failure or timeout.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: PeerAddress, reason: String },

    /// Non-success status, broken body, or an acknowledgement that does
    /// not match what was sent.
    #[error("transfer with {peer} failed: {reason}")]
    TransferFailed { peer: PeerAddress, reason: String },

    /// The peer rejected the request as malformed (HTTP 400).
    #[error("peer {peer} rejected request: {reason}")]
    InvalidRequest { peer: PeerAddress, reason: String },

    /// The peer does not have the file (HTTP 404).
    #[error("'{name}' not found on {peer}")]
    NotFound { peer: PeerAddress, name: String },
}

impl TransferError {
    /// The peer the failed call was addressed to.
    pub fn peer(&self) -> &PeerAddress {
        match self {
            Self::PeerUnreachable { peer, .. }
            | Self::TransferFailed { peer, .. }
            | Self::InvalidRequest { peer, .. }
            | Self::NotFound { peer, .. } => peer,
        }
    }

    /// Whether the peer could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::PeerUnreachable { .. })
    }
}

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local storage failed; nothing was recorded for the item.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A call to a peer failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Building the HTTP client failed.
    #[error("client error: {0}")]
    Client(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}
