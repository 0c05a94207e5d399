//! HTTP implementation of [`PeerTransport`].

use crate::error::{SyncError, SyncResult, TransferError, TransferResult};
use crate::protocol::{
    DELETE_PATH, DOWNLOAD_PATH, DeleteRequest, FILENAME_HEADER, FILENAME_PARAM, FILES_PATH,
    FileEntry, HEALTH_PATH, HealthResponse, PEERS_PATH, PeersBody, SYNC_PATH, StoreResponse,
    SyncTriggerResponse, UPLOAD_PATH,
};
use crate::transport::PeerTransport;
use async_trait::async_trait;
use filemesh_types::{FileName, PeerAddress};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Timeouts for peer calls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Limit for connection establishment.
    pub connect_timeout: Duration,
    /// Limit for small requests (listing, health, control calls).
    pub probe_timeout: Duration,
    /// Limit for requests carrying file content.
    pub transfer_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(30),
        }
    }
}

/// Talks to peers over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: Client,
    config: ClientConfig,
}

impl HttpPeerClient {
    /// Creates a client with the given timeouts.
    pub fn new(config: ClientConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Creates a client with the default timeouts.
    pub fn with_defaults() -> SyncResult<Self> {
        Self::new(ClientConfig::default())
    }

    /// The configured timeouts.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Asks a node to start a sync cycle.
    pub async fn trigger_sync(&self, peer: &PeerAddress) -> TransferResult<SyncTriggerResponse> {
        let request = self
            .client
            .post(url(peer, SYNC_PATH))
            .timeout(self.config.probe_timeout);
        let response = send(peer, request, None).await?;
        json(peer, response).await
    }

    /// Reads a node's configured peer set.
    pub async fn peers(&self, peer: &PeerAddress) -> TransferResult<PeersBody> {
        let request = self
            .client
            .get(url(peer, PEERS_PATH))
            .timeout(self.config.probe_timeout);
        let response = send(peer, request, None).await?;
        json(peer, response).await
    }

    /// Replaces a node's configured peer set.
    pub async fn set_peers(
        &self,
        peer: &PeerAddress,
        nodes: Vec<String>,
    ) -> TransferResult<PeersBody> {
        let request = self
            .client
            .put(url(peer, PEERS_PATH))
            .json(&PeersBody { nodes })
            .timeout(self.config.probe_timeout);
        let response = send(peer, request, None).await?;
        json(peer, response).await
    }
}

#[async_trait]
impl PeerTransport for HttpPeerClient {
    async fn list(&self, peer: &PeerAddress) -> TransferResult<Vec<FileEntry>> {
        let request = self
            .client
            .get(url(peer, FILES_PATH))
            .timeout(self.config.probe_timeout);
        let response = send(peer, request, None).await?;
        json(peer, response).await
    }

    async fn fetch(&self, peer: &PeerAddress, name: &FileName) -> TransferResult<Vec<u8>> {
        let request = self
            .client
            .get(url(peer, DOWNLOAD_PATH))
            .query(&[(FILENAME_PARAM, name.as_str())])
            .timeout(self.config.transfer_timeout);
        let response = send(peer, request, Some(name)).await?;
        let bytes = response.bytes().await.map_err(|e| classify(peer, e))?;
        debug!("Fetched '{}' from {} ({} bytes)", name, peer, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn store(
        &self,
        peer: &PeerAddress,
        name: &FileName,
        bytes: Vec<u8>,
    ) -> TransferResult<StoreResponse> {
        let request = self
            .client
            .post(url(peer, UPLOAD_PATH))
            .header(FILENAME_HEADER, name.as_str())
            .body(bytes)
            .timeout(self.config.transfer_timeout);
        let response = send(peer, request, Some(name)).await?;
        json(peer, response).await
    }

    async fn delete(&self, peer: &PeerAddress, name: &FileName) -> TransferResult<bool> {
        let request = self
            .client
            .post(url(peer, DELETE_PATH))
            .json(&DeleteRequest {
                filename: Some(name.to_string()),
            })
            .timeout(self.config.transfer_timeout);
        match send(peer, request, Some(name)).await {
            Ok(_) => Ok(true),
            Err(TransferError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn health(&self, peer: &PeerAddress) -> TransferResult<HealthResponse> {
        let request = self
            .client
            .get(url(peer, HEALTH_PATH))
            .timeout(self.config.probe_timeout);
        let response = send(peer, request, None).await?;
        json(peer, response).await
    }
}

fn url(peer: &PeerAddress, path: &str) -> String {
    format!("{}{}", peer.base_url(), path)
}

/// Sends a request and turns every failure mode into a [`TransferError`].
async fn send(
    peer: &PeerAddress,
    request: RequestBuilder,
    name: Option<&FileName>,
) -> TransferResult<Response> {
    let response = request.send().await.map_err(|e| classify(peer, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    Err(match status {
        StatusCode::BAD_REQUEST => TransferError::InvalidRequest {
            peer: peer.clone(),
            reason,
        },
        StatusCode::NOT_FOUND => TransferError::NotFound {
            peer: peer.clone(),
            name: name.map(ToString::to_string).unwrap_or_default(),
        },
        _ => TransferError::TransferFailed {
            peer: peer.clone(),
            reason,
        },
    })
}

async fn json<T: DeserializeOwned>(peer: &PeerAddress, response: Response) -> TransferResult<T> {
    let bytes = response.bytes().await.map_err(|e| classify(peer, e))?;
    serde_json::from_slice(&bytes).map_err(|e| TransferError::TransferFailed {
        peer: peer.clone(),
        reason: format!("invalid response body: {e}"),
    })
}

fn classify(peer: &PeerAddress, e: reqwest::Error) -> TransferError {
    if e.is_connect() || e.is_timeout() {
        TransferError::PeerUnreachable {
            peer: peer.clone(),
            reason: e.to_string(),
        }
    } else {
        TransferError::TransferFailed {
            peer: peer.clone(),
            reason: e.to_string(),
        }
    }
}
