//! The configured set of peer addresses.
//!
//! Shared by the scheduler and the HTTP handlers. The engine never reads it
//! directly: each cycle works on a [`PeerSet::snapshot`] taken at cycle
//! start, so an update lands on the next cycle and never mid-cycle.

use filemesh_types::PeerAddress;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Mutable, shared peer set that never contains the node itself.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Arc<RwLock<Vec<PeerAddress>>>,
    local: Option<PeerAddress>,
}

impl PeerSet {
    /// Creates a peer set, dropping duplicates and the local address.
    pub fn new(peers: impl IntoIterator<Item = PeerAddress>, local: Option<PeerAddress>) -> Self {
        let peers = normalize(peers, local.as_ref());
        Self {
            peers: Arc::new(RwLock::new(peers)),
            local,
        }
    }

    /// This node's own address, if known.
    pub fn local_address(&self) -> Option<&PeerAddress> {
        self.local.as_ref()
    }

    /// Copy of the current peers, in configuration order.
    pub async fn snapshot(&self) -> Vec<PeerAddress> {
        self.peers.read().await.clone()
    }

    /// Number of configured peers.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether no peers are configured.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Replaces the peer set and returns what was kept.
    pub async fn replace(&self, peers: impl IntoIterator<Item = PeerAddress>) -> Vec<PeerAddress> {
        let peers = normalize(peers, self.local.as_ref());
        info!("Peer set updated: {} peers", peers.len());
        *self.peers.write().await = peers.clone();
        peers
    }
}

fn normalize(
    peers: impl IntoIterator<Item = PeerAddress>,
    local: Option<&PeerAddress>,
) -> Vec<PeerAddress> {
    let mut out: Vec<PeerAddress> = Vec::new();
    for peer in peers {
        if Some(&peer) == local || out.contains(&peer) {
            continue;
        }
        out.push(peer);
    }
    out
}
