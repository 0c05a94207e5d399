//! Node errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use filemesh_storage::StorageError;
use filemesh_sync::{ErrorBody, SyncError};
use thiserror::Error;
use tracing::error;

/// Result type for node setup.
pub type NodeResult<T> = Result<T, NodeError>;

/// Failures while configuring or assembling a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid address: {0}")]
    Address(#[from] filemesh_types::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Request failures, rendered as a JSON [`ErrorBody`].
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request: missing header, parameter or field, or an
    /// unusable name.
    BadRequest { error: String, details: Option<String> },
    /// The named file does not exist.
    NotFound(String),
    /// Local storage or an internal task failed.
    Internal(String),
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::BadRequest {
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request_with(error: impl Into<String>, details: impl ToString) -> Self {
        Self::BadRequest {
            error: error.into(),
            details: Some(details.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(name) => Self::NotFound(name),
            StorageError::InvalidName(e) => Self::bad_request_with("Invalid filename", e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Storage(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest { error, details } => {
                (StatusCode::BAD_REQUEST, ErrorBody { error, details })
            }
            ApiError::NotFound(name) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "File not found".to_string(),
                    details: Some(name),
                },
            ),
            ApiError::Internal(msg) => {
                error!("Request failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "Internal error".to_string(),
                        details: Some(msg),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
