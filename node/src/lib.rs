//! filemesh node: storage, HTTP API and sync scheduler wired together.

mod api;
pub mod config;
mod error;

pub use api::build_router;
pub use config::NodeConfig;
pub use error::{ApiError, NodeError, NodeResult};

use filemesh_storage::FileStore;
use filemesh_sync::{
    ClientConfig, HttpPeerClient, PeerSet, ReconciliationEngine, SchedulerConfig, SyncScheduler,
};
use filemesh_types::PeerAddress;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Everything a running node shares between its handlers and scheduler.
pub struct NodeState {
    store: Arc<FileStore>,
    peers: PeerSet,
    scheduler: SyncScheduler,
    client: HttpPeerClient,
    config: Mutex<NodeConfig>,
    config_path: Option<PathBuf>,
    upload_limit: usize,
}

impl NodeState {
    /// Opens storage and assembles the engine and scheduler. The scheduler
    /// is not started.
    ///
    /// `config_path` is where peer updates are persisted; `None` keeps them
    /// in memory only.
    pub fn build(
        config: NodeConfig,
        config_path: Option<PathBuf>,
        local: PeerAddress,
        client_config: ClientConfig,
    ) -> NodeResult<Arc<Self>> {
        let store = Arc::new(FileStore::open(&config.storage_dir, &config.metadata_file)?);
        let client = HttpPeerClient::new(client_config)?;
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::clone(&store),
            Arc::new(client.clone()),
        ));
        let peers = PeerSet::new(config.peer_addresses()?, Some(local));
        let scheduler = SyncScheduler::new(
            engine,
            peers.clone(),
            SchedulerConfig {
                interval: config.sync_interval()?,
                run_on_start: true,
            },
        );

        info!(
            "Node storage at {:?}, metadata at {:?}",
            config.storage_dir, config.metadata_file
        );
        Ok(Arc::new(Self {
            store,
            peers,
            scheduler,
            client,
            upload_limit: config.upload_limit(),
            config: Mutex::new(config),
            config_path,
        }))
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// Client used for outbound peer calls.
    pub fn client(&self) -> &HttpPeerClient {
        &self.client
    }

    /// The address this node advertises.
    pub fn local_address(&self) -> Option<&PeerAddress> {
        self.peers.local_address()
    }

    /// Current configuration, including peer updates.
    pub async fn config(&self) -> NodeConfig {
        self.config.lock().await.clone()
    }

    pub(crate) fn upload_limit(&self) -> usize {
        self.upload_limit
    }

    /// Replaces the peer set and persists it.
    ///
    /// Only `nodes` is written back; other settings in the file are left as
    /// they are, even if command-line flags overrode them at startup.
    pub(crate) async fn update_peers(
        &self,
        peers: Vec<PeerAddress>,
    ) -> NodeResult<Vec<PeerAddress>> {
        let mut config = self.config.lock().await;
        let kept = self.peers.replace(peers).await;
        config.nodes = kept.iter().map(ToString::to_string).collect();
        if let Some(path) = self.config_path.clone() {
            let nodes = config.nodes.clone();
            tokio::task::spawn_blocking(move || -> NodeResult<()> {
                let mut on_disk = if path.exists() {
                    NodeConfig::load(&path)?
                } else {
                    NodeConfig::default()
                };
                on_disk.nodes = nodes;
                on_disk.save(&path)
            })
            .await
            .map_err(|e| NodeError::Config(format!("config writer failed: {e}")))??;
        }
        Ok(kept)
    }
}
