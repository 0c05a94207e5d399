//! Client side of the transfer protocol.
//!
//! The engine talks to peers only through [`PeerTransport`], so it can run
//! against HTTP in production and against [`mock::MockNetwork`] in tests.

use crate::error::TransferResult;
use crate::protocol::{FileEntry, HealthResponse, StoreResponse};
use async_trait::async_trait;
use filemesh_types::{FileName, PeerAddress};

/// Calls a node can make on a peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Lists every file the peer holds.
    async fn list(&self, peer: &PeerAddress) -> TransferResult<Vec<FileEntry>>;

    /// Downloads the complete current bytes of a file.
    async fn fetch(&self, peer: &PeerAddress, name: &FileName) -> TransferResult<Vec<u8>>;

    /// Uploads a file, overwriting the peer's copy.
    async fn store(
        &self,
        peer: &PeerAddress,
        name: &FileName,
        bytes: Vec<u8>,
    ) -> TransferResult<StoreResponse>;

    /// Deletes a file. Returns `false` if the peer did not have it.
    async fn delete(&self, peer: &PeerAddress, name: &FileName) -> TransferResult<bool>;

    /// Liveness probe.
    async fn health(&self, peer: &PeerAddress) -> TransferResult<HealthResponse>;
}

/// An in-memory network of peers for testing.
pub mod mock {
    use super::*;
    use crate::error::TransferError;
    use crate::protocol::STATUS_HEALTHY;
    use filemesh_storage::content_id;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct MockPeer {
        files: BTreeMap<FileName, Vec<u8>>,
        unreachable: bool,
        fail_store: HashSet<FileName>,
        fail_fetch: HashSet<FileName>,
        list_delay: Option<Duration>,
        panic_on_list: bool,
    }

    /// Peers that exist only in memory. Unknown addresses are unreachable.
    #[derive(Debug, Default)]
    pub struct MockNetwork {
        peers: Mutex<HashMap<PeerAddress, MockPeer>>,
        list_calls: AtomicUsize,
        store_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl MockNetwork {
        /// Creates an empty network.
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds a reachable peer with no files.
        pub fn add_peer(&self, peer: &PeerAddress) {
            self.peers.lock().unwrap().entry(peer.clone()).or_default();
        }

        /// Places a file on a peer, adding the peer if needed.
        pub fn put_file(&self, peer: &PeerAddress, name: &FileName, bytes: &[u8]) {
            self.peers
                .lock()
                .unwrap()
                .entry(peer.clone())
                .or_default()
                .files
                .insert(name.clone(), bytes.to_vec());
        }

        /// Current content of a file on a peer.
        pub fn file(&self, peer: &PeerAddress, name: &FileName) -> Option<Vec<u8>> {
            self.peers
                .lock()
                .unwrap()
                .get(peer)
                .and_then(|p| p.files.get(name).cloned())
        }

        /// Names held by a peer.
        pub fn file_names(&self, peer: &PeerAddress) -> Vec<FileName> {
            self.peers
                .lock()
                .unwrap()
                .get(peer)
                .map(|p| p.files.keys().cloned().collect())
                .unwrap_or_default()
        }

        /// Makes every call to the peer fail as unreachable.
        pub fn set_unreachable(&self, peer: &PeerAddress, unreachable: bool) {
            self.peers.lock().unwrap().entry(peer.clone()).or_default().unreachable = unreachable;
        }

        /// Makes uploads of one name to the peer fail.
        pub fn fail_store(&self, peer: &PeerAddress, name: &FileName) {
            self.peers
                .lock()
                .unwrap()
                .entry(peer.clone())
                .or_default()
                .fail_store
                .insert(name.clone());
        }

        /// Makes downloads of one name from the peer fail.
        pub fn fail_fetch(&self, peer: &PeerAddress, name: &FileName) {
            self.peers
                .lock()
                .unwrap()
                .entry(peer.clone())
                .or_default()
                .fail_fetch
                .insert(name.clone());
        }

        /// Delays every listing of the peer.
        pub fn set_list_delay(&self, peer: &PeerAddress, delay: Duration) {
            self.peers.lock().unwrap().entry(peer.clone()).or_default().list_delay = Some(delay);
        }

        /// Makes the next listing of the peer panic.
        pub fn panic_on_next_list(&self, peer: &PeerAddress) {
            self.peers.lock().unwrap().entry(peer.clone()).or_default().panic_on_list = true;
        }

        /// Number of list calls made so far.
        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        /// Number of store calls made so far.
        pub fn store_calls(&self) -> usize {
            self.store_calls.load(Ordering::SeqCst)
        }

        /// Number of fetch calls made so far.
        pub fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        fn unreachable(peer: &PeerAddress) -> TransferError {
            TransferError::PeerUnreachable {
                peer: peer.clone(),
                reason: "connection refused".to_string(),
            }
        }

        fn with_peer<T>(
            &self,
            peer: &PeerAddress,
            f: impl FnOnce(&mut MockPeer) -> TransferResult<T>,
        ) -> TransferResult<T> {
            let mut peers = self.peers.lock().unwrap();
            match peers.get_mut(peer) {
                Some(p) if !p.unreachable => f(p),
                _ => Err(Self::unreachable(peer)),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for MockNetwork {
        async fn list(&self, peer: &PeerAddress) -> TransferResult<Vec<FileEntry>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let (delay, panic) = self.with_peer(peer, |p| {
                Ok((p.list_delay, std::mem::take(&mut p.panic_on_list)))
            })?;
            if panic {
                panic!("mock listing of {peer} panicked");
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.with_peer(peer, |p| {
                Ok(p.files
                    .iter()
                    .map(|(name, bytes)| FileEntry {
                        name: name.to_string(),
                        size: bytes.len() as u64,
                        hash: content_id(bytes),
                        uploaded: String::new(),
                        modified: String::new(),
                    })
                    .collect())
            })
        }

        async fn fetch(&self, peer: &PeerAddress, name: &FileName) -> TransferResult<Vec<u8>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.with_peer(peer, |p| {
                if p.fail_fetch.contains(name) {
                    return Err(TransferError::TransferFailed {
                        peer: peer.clone(),
                        reason: "HTTP 500".to_string(),
                    });
                }
                p.files.get(name).cloned().ok_or_else(|| TransferError::NotFound {
                    peer: peer.clone(),
                    name: name.to_string(),
                })
            })
        }

        async fn store(
            &self,
            peer: &PeerAddress,
            name: &FileName,
            bytes: Vec<u8>,
        ) -> TransferResult<StoreResponse> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            self.with_peer(peer, |p| {
                if p.fail_store.contains(name) {
                    return Err(TransferError::TransferFailed {
                        peer: peer.clone(),
                        reason: "HTTP 500".to_string(),
                    });
                }
                let response = StoreResponse {
                    message: "Stored successfully".to_string(),
                    filename: name.to_string(),
                    size: bytes.len() as u64,
                    hash: content_id(&bytes),
                };
                p.files.insert(name.clone(), bytes);
                Ok(response)
            })
        }

        async fn delete(&self, peer: &PeerAddress, name: &FileName) -> TransferResult<bool> {
            self.with_peer(peer, |p| Ok(p.files.remove(name).is_some()))
        }

        async fn health(&self, peer: &PeerAddress) -> TransferResult<HealthResponse> {
            self.with_peer(peer, |p| {
                Ok(HealthResponse {
                    status: STATUS_HEALTHY.to_string(),
                    storage_files: p.files.len(),
                    nodes_configured: 0,
                    local_address: peer.to_string(),
                })
            })
        }
    }
}
