//! Per-file metadata records.

use crate::{ContentId, FileName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What this node believes it holds for one file name.
///
/// A record exists exactly when a regular file of the same name exists in
/// the storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Sanitized base name, unique within a node.
    pub name: FileName,
    /// Identity of the stored bytes; empty until computed.
    pub content_id: ContentId,
    /// Size of the stored file in bytes.
    pub size_bytes: u64,
    /// When the name was first stored on this node.
    pub uploaded_at: DateTime<Utc>,
    /// When the bytes were last written on this node.
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// Creates the record for a file stored for the first time.
    #[must_use]
    pub fn new(name: FileName, content_id: ContentId, size_bytes: u64, now: DateTime<Utc>) -> Self {
        Self {
            name,
            content_id,
            size_bytes,
            uploaded_at: now,
            modified_at: now,
        }
    }

    /// Returns the record after the file was overwritten.
    ///
    /// `uploaded_at` is kept and `modified_at` never moves backwards, even
    /// if the wall clock did.
    #[must_use]
    pub fn replaced(&self, content_id: ContentId, size_bytes: u64, now: DateTime<Utc>) -> Self {
        Self {
            name: self.name.clone(),
            content_id,
            size_bytes,
            uploaded_at: self.uploaded_at,
            modified_at: now.max(self.modified_at),
        }
    }

    /// Whether the identity still has to be computed.
    #[must_use]
    pub fn needs_hash(&self) -> bool {
        self.content_id.is_empty()
    }
}

/// A peer's file as reported by its listing, valid for one cycle only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileView {
    pub name: FileName,
    pub content_id: ContentId,
    pub size_bytes: u64,
}
