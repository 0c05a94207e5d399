//! HTTP API served to peers and clients.

use crate::NodeState;
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use filemesh_sync::protocol::{
    DELETE_PATH, DOWNLOAD_PATH, FILENAME_HEADER, FILES_PATH, HEALTH_PATH, PEERS_PATH,
    STATUS_HEALTHY, SYNC_PATH, UPLOAD_PATH,
};
use filemesh_sync::{
    DeleteRequest, DeleteResponse, ErrorBody, FileEntry, HealthResponse, PeersBody,
    StoreResponse, SyncTriggerResponse, run_blocking,
};
use filemesh_types::{FileName, PeerAddress};
use serde::Deserialize;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct DownloadParams {
    filename: Option<String>,
}

/// Build the HTTP API router over a node.
pub fn build_router(state: Arc<NodeState>) -> Router {
    let limit = state.upload_limit();
    Router::new()
        .route(FILES_PATH, get(list_files))
        .route(DOWNLOAD_PATH, get(download))
        .route(UPLOAD_PATH, post(upload))
        .route(DELETE_PATH, post(delete_file))
        .route(HEALTH_PATH, get(health))
        .route(SYNC_PATH, post(trigger_sync))
        .route(PEERS_PATH, get(get_peers).put(put_peers))
        .layer(DefaultBodyLimit::max(limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_files(State(state): State<Arc<NodeState>>) -> ApiResult<Json<Vec<FileEntry>>> {
    let records = run_blocking(state.store(), |s| s.list()).await?;
    debug!("Listing {} files", records.len());
    Ok(Json(records.iter().map(FileEntry::from).collect()))
}

async fn download(
    State(state): State<Arc<NodeState>>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let raw = params
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing filename"))?;
    let name = sanitize(&raw)?;

    let served = name.clone();
    let bytes = run_blocking(state.store(), move |s| s.read(&served)).await?;
    info!("Served file: {} ({} bytes)", name, bytes.len());
    Ok(([(CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

async fn upload(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<StoreResponse>> {
    let raw = headers
        .get(FILENAME_HEADER)
        .ok_or_else(|| ApiError::bad_request("Missing Filename header"))?
        .to_str()
        .map_err(|e| ApiError::bad_request_with("Invalid Filename header", e))?;
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Content-Length header"))?;
    if declared != body.len() as u64 {
        return Err(ApiError::bad_request_with(
            "Content-Length mismatch",
            format!("declared {declared}, received {}", body.len()),
        ));
    }
    let name = sanitize(raw)?;

    let stored = name.clone();
    let record = run_blocking(state.store(), move |s| s.write(&stored, &body)).await?;
    info!(
        "Stored file: {} ({} bytes, hash: {})",
        name, record.size_bytes, record.content_id
    );
    Ok(Json(StoreResponse::stored(&record)))
}

async fn delete_file(
    State(state): State<Arc<NodeState>>,
    body: Bytes,
) -> ApiResult<Json<DeleteResponse>> {
    let request: DeleteRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request_with("Invalid JSON body", e))?;
    let raw = request
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing filename"))?;
    let name = sanitize(&raw)?;

    let target = name.clone();
    if !run_blocking(state.store(), move |s| s.delete(&target)).await? {
        return Err(ApiError::NotFound(name.to_string()));
    }
    Ok(Json(DeleteResponse {
        message: "Deleted successfully".to_string(),
        filename: name.to_string(),
    }))
}

async fn health(State(state): State<Arc<NodeState>>) -> ApiResult<Json<HealthResponse>> {
    let storage_files = run_blocking(state.store(), |s| s.file_count()).await?;
    Ok(Json(HealthResponse {
        status: STATUS_HEALTHY.to_string(),
        storage_files,
        nodes_configured: state.peers().len().await,
        local_address: state
            .local_address()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }))
}

async fn trigger_sync(State(state): State<Arc<NodeState>>) -> impl IntoResponse {
    let triggered = state.scheduler().trigger().await;
    info!("Sync requested over HTTP (triggered: {})", triggered);
    (StatusCode::ACCEPTED, Json(SyncTriggerResponse { triggered }))
}

async fn get_peers(State(state): State<Arc<NodeState>>) -> Json<PeersBody> {
    let nodes = state
        .peers()
        .snapshot()
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    Json(PeersBody { nodes })
}

async fn put_peers(State(state): State<Arc<NodeState>>, body: Bytes) -> ApiResult<Json<PeersBody>> {
    let request: PeersBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request_with("Invalid JSON body", e))?;
    let peers = request
        .nodes
        .iter()
        .map(|raw| PeerAddress::parse(raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::bad_request_with("Invalid peer address", e))?;

    let kept = state
        .update_peers(peers)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(PeersBody {
        nodes: kept.iter().map(ToString::to_string).collect(),
    }))
}

/// Reduces a network-supplied name to a safe base name.
fn sanitize(raw: &str) -> ApiResult<FileName> {
    let name = FileName::sanitize(raw)
        .map_err(|e| ApiError::bad_request_with("Invalid filename", e))?;
    if name.as_str() != raw {
        debug!("Sanitized filename {:?} to {:?}", raw, name.as_str());
    }
    Ok(name)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Request handler panicked: {}", details);
    let body = ErrorBody {
        error: "Internal error".to_string(),
        details: Some(details),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
