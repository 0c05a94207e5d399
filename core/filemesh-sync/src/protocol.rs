//! Wire protocol between nodes.
//!
//! Plain HTTP: JSON for structured data, raw bytes for file content. Every
//! exchange is a single request and response; no peer holds state or locks
//! across calls, so two nodes syncing against each other cannot deadlock.
//!
//! | Operation | Method + path |
//! |---|---|
//! | List | `GET /files` |
//! | Fetch | `GET /download?filename=<name>` |
//! | Store | `POST /upload` with a `Filename` header and raw body |
//! | Delete | `POST /delete` with `{"filename": ...}` |
//! | HealthCheck | `GET /health` |
//! | Sync trigger | `POST /sync` |
//! | Peer list | `GET /peers`, `PUT /peers` |

use chrono::SecondsFormat;
use filemesh_types::{ContentId, FileName, FileRecord, RemoteFileView};
use serde::{Deserialize, Serialize};

pub const FILES_PATH: &str = "/files";
pub const DOWNLOAD_PATH: &str = "/download";
pub const UPLOAD_PATH: &str = "/upload";
pub const DELETE_PATH: &str = "/delete";
pub const HEALTH_PATH: &str = "/health";
pub const SYNC_PATH: &str = "/sync";
pub const PEERS_PATH: &str = "/peers";

/// Header carrying the target name of an upload.
pub const FILENAME_HEADER: &str = "Filename";

/// Query parameter naming the file to download.
pub const FILENAME_PARAM: &str = "filename";

/// Status string reported by a healthy node.
pub const STATUS_HEALTHY: &str = "healthy";

/// One file in a `/files` listing.
///
/// `name` is kept as the raw string the peer sent; it is only trusted after
/// [`FileEntry::to_remote_view`] validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub hash: ContentId,
    #[serde(default)]
    pub uploaded: String,
    #[serde(default)]
    pub modified: String,
}

impl FileEntry {
    /// Validates the entry into a per-cycle remote view.
    pub fn to_remote_view(&self) -> filemesh_types::Result<RemoteFileView> {
        Ok(RemoteFileView {
            name: FileName::parse(&self.name)?,
            content_id: self.hash.clone(),
            size_bytes: self.size,
        })
    }
}

impl From<&FileRecord> for FileEntry {
    fn from(record: &FileRecord) -> Self {
        Self {
            name: record.name.to_string(),
            size: record.size_bytes,
            hash: record.content_id.clone(),
            uploaded: record.uploaded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            modified: record.modified_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

/// Acknowledgement of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub message: String,
    pub filename: String,
    pub size: u64,
    pub hash: ContentId,
}

impl StoreResponse {
    /// Builds the acknowledgement for a freshly written record.
    pub fn stored(record: &FileRecord) -> Self {
        Self {
            message: "Stored successfully".to_string(),
            filename: record.name.to_string(),
            size: record.size_bytes,
            hash: record.content_id.clone(),
        }
    }
}

/// Body of a delete request. The field is optional so a missing name can
/// be answered with 400 rather than a decoding error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub filename: Option<String>,
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub filename: String,
}

/// Liveness report. Never used for reconciliation decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage_files: usize,
    pub nodes_configured: usize,
    pub local_address: String,
}

/// Answer to an on-demand sync trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTriggerResponse {
    /// `false` when a cycle was already running and the trigger coalesced.
    pub triggered: bool,
}

/// The configured peer set, as `host:port` strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeersBody {
    pub nodes: Vec<String>,
}

/// Error body returned with every non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
