//! Core type definitions for filemesh.
//!
//! This crate defines the small set of types shared by every other crate:
//! - Sanitized file names and peer addresses
//! - Content identities derived from file bytes
//! - Per-file metadata records and the per-cycle remote view of a peer
//!
//! Nothing here touches the filesystem or the network.

mod content;
mod names;
mod record;

pub use content::ContentId;
pub use names::{FileName, PeerAddress, STAGING_PREFIX};
pub use record::{FileRecord, RemoteFileView};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when constructing core types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("invalid peer address: {0:?}")]
    InvalidPeerAddress(String),
}
