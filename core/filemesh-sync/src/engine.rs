//! Reconciliation engine: one sync cycle against a set of peers.
//!
//! A cycle scans local storage once, then visits each peer in turn:
//! 1. List the peer's files. If that fails the peer is skipped for this
//!    cycle; nothing is retried until the next cycle.
//! 2. Push every local file the peer lacks or holds with a different
//!    identity. Local is authoritative for divergent names.
//! 3. Pull every file only the peer has, plus divergent names whose push
//!    failed. Identities are recomputed locally, never taken from the peer.
//!
//! A failure on one file is recorded and the rest of the peer's files are
//! still attempted. A divergent name that was pushed is not pulled back:
//! if both nodes run cycles against each other, which copy survives depends
//! on call order. There is no merge and no versioning.

use crate::error::{SyncError, SyncResult, TransferError};
use crate::transport::PeerTransport;
use chrono::{DateTime, Utc};
use filemesh_storage::{FileStore, StorageResult, content_id};
use filemesh_types::{ContentId, FileName, FileRecord, PeerAddress};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name → identity, for either side of a comparison.
pub type FileView = BTreeMap<FileName, ContentId>;

/// Transfers decided for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Local files to upload: missing on the peer or divergent.
    pub push: Vec<FileName>,
    /// Peer files to download: missing locally.
    pub pull: Vec<FileName>,
    /// Names present on both sides with different identities. Always a
    /// subset of `push`.
    pub divergent: Vec<FileName>,
}

impl SyncPlan {
    /// Compares the local view with a peer's view.
    pub fn compute(local: &FileView, remote: &FileView) -> Self {
        let push = local
            .iter()
            .filter(|(name, id)| remote.get(*name) != Some(*id))
            .map(|(name, _)| name.clone())
            .collect();
        let pull = remote
            .keys()
            .filter(|name| !local.contains_key(*name))
            .cloned()
            .collect();
        let divergent = local
            .iter()
            .filter(|(name, id)| remote.get(*name).is_some_and(|r| r != *id))
            .map(|(name, _)| name.clone())
            .collect();
        Self {
            push,
            pull,
            divergent,
        }
    }

    /// Whether both sides already agree.
    pub fn is_empty(&self) -> bool {
        self.push.is_empty() && self.pull.is_empty()
    }
}

/// Direction of a single file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Pull => f.write_str("pull"),
        }
    }
}

/// A file that could not be transferred this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub name: FileName,
    pub direction: Direction,
    pub reason: String,
}

/// What happened with one reachable peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSummary {
    pub pushed: Vec<FileName>,
    pub pulled: Vec<FileName>,
    pub failures: Vec<FileFailure>,
    /// Listing entries whose names failed validation.
    pub rejected_names: Vec<String>,
}

/// Outcome of a cycle for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    /// The listing failed; the peer was skipped.
    Unreachable { reason: String },
    /// The listing succeeded and the plan was executed.
    Synced(PeerSummary),
}

/// Per-peer entry of a [`CycleReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerReport {
    pub peer: PeerAddress,
    pub outcome: PeerOutcome,
}

impl PeerReport {
    /// The summary, if the peer was reachable.
    pub fn summary(&self) -> Option<&PeerSummary> {
        match &self.outcome {
            PeerOutcome::Synced(summary) => Some(summary),
            PeerOutcome::Unreachable { .. } => None,
        }
    }

    /// Whether the peer was skipped.
    pub fn is_unreachable(&self) -> bool {
        matches!(self.outcome, PeerOutcome::Unreachable { .. })
    }
}

/// Result of one full cycle. Says nothing about global convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of local files when the cycle started.
    pub local_files: usize,
    pub peers: Vec<PeerReport>,
}

impl CycleReport {
    /// Report for a given peer.
    pub fn peer(&self, peer: &PeerAddress) -> Option<&PeerReport> {
        self.peers.iter().find(|r| &r.peer == peer)
    }

    /// Peers skipped this cycle.
    pub fn unreachable(&self) -> impl Iterator<Item = &PeerAddress> {
        self.peers.iter().filter(|r| r.is_unreachable()).map(|r| &r.peer)
    }

    /// Total files pushed across peers.
    pub fn pushed(&self) -> usize {
        self.peers.iter().filter_map(PeerReport::summary).map(|s| s.pushed.len()).sum()
    }

    /// Total files pulled across peers.
    pub fn pulled(&self) -> usize {
        self.peers.iter().filter_map(PeerReport::summary).map(|s| s.pulled.len()).sum()
    }

    /// Total per-file failures across peers.
    pub fn failures(&self) -> usize {
        self.peers.iter().filter_map(PeerReport::summary).map(|s| s.failures.len()).sum()
    }
}

/// Drives sync cycles for one node.
pub struct ReconciliationEngine {
    store: Arc<FileStore>,
    transport: Arc<dyn PeerTransport>,
}

impl ReconciliationEngine {
    /// Creates an engine over local storage and a peer transport.
    pub fn new(store: Arc<FileStore>, transport: Arc<dyn PeerTransport>) -> Self {
        Self { store, transport }
    }

    /// The local storage.
    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    /// Runs one cycle against the given peers.
    ///
    /// Only a failure to scan local storage aborts the cycle; every peer and
    /// file failure is recorded in the report instead.
    pub async fn run_cycle(&self, peers: &[PeerAddress]) -> SyncResult<CycleReport> {
        let started_at = Utc::now();
        info!("Starting sync cycle with {} peers", peers.len());

        let mut local = run_blocking(&self.store, |s| s.local_view()).await?;
        let local_files = local.len();

        let mut reports = Vec::with_capacity(peers.len());
        for peer in peers {
            let outcome = self.sync_peer(peer, &mut local).await;
            reports.push(PeerReport {
                peer: peer.clone(),
                outcome,
            });
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            local_files,
            peers: reports,
        };
        info!(
            pushed = report.pushed(),
            pulled = report.pulled(),
            failures = report.failures(),
            unreachable = report.unreachable().count(),
            "Sync cycle completed"
        );
        Ok(report)
    }

    async fn sync_peer(&self, peer: &PeerAddress, local: &mut FileView) -> PeerOutcome {
        let listing = match self.transport.list(peer).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(peer = %peer, "Skipping peer this cycle: {}", e);
                return PeerOutcome::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let mut summary = PeerSummary::default();
        let mut remote = FileView::new();
        for entry in &listing {
            match entry.to_remote_view() {
                Ok(view) => {
                    remote.insert(view.name, view.content_id);
                }
                Err(_) => {
                    warn!(peer = %peer, "Ignoring unsafe name {:?} in listing", entry.name);
                    summary.rejected_names.push(entry.name.clone());
                }
            }
        }

        let SyncPlan {
            push,
            mut pull,
            divergent,
        } = SyncPlan::compute(local, &remote);
        debug!(peer = %peer, push = push.len(), pull = pull.len(), "Computed sync plan");

        for name in push {
            match self.push(peer, &name).await {
                Ok(()) => {
                    info!(peer = %peer, file = %name, "Pushed");
                    summary.pushed.push(name);
                }
                Err(e) => {
                    log_failure(peer, &name, Direction::Push, &e);
                    summary.failures.push(FileFailure {
                        name,
                        direction: Direction::Push,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // A divergent name the peer would not take falls back to the peer's copy.
        pull.extend(
            summary
                .failures
                .iter()
                .filter(|f| divergent.contains(&f.name))
                .map(|f| f.name.clone()),
        );

        for name in pull {
            let reported = remote.get(&name).cloned().unwrap_or_default();
            match self.pull(peer, &name, &reported).await {
                Ok(record) => {
                    info!(peer = %peer, file = %name, "Pulled");
                    local.insert(name.clone(), record.content_id);
                    summary.pulled.push(name);
                }
                Err(e) => {
                    log_failure(peer, &name, Direction::Pull, &e);
                    summary.failures.push(FileFailure {
                        name,
                        direction: Direction::Pull,
                        reason: e.to_string(),
                    });
                }
            }
        }

        PeerOutcome::Synced(summary)
    }

    /// Uploads the current local bytes and checks the peer's acknowledgement.
    async fn push(&self, peer: &PeerAddress, name: &FileName) -> SyncResult<()> {
        let owned = name.clone();
        let bytes = run_blocking(&self.store, move |s| s.read(&owned)).await?;
        let expected = content_id(&bytes);
        let size = bytes.len() as u64;

        let ack = self.transport.store(peer, name, bytes).await?;
        if ack.hash != expected || ack.size != size {
            return Err(TransferError::TransferFailed {
                peer: peer.clone(),
                reason: format!(
                    "peer stored {} bytes as {}, expected {} bytes as {}",
                    ack.size, ack.hash, size, expected
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Downloads a file and stores it locally under a freshly computed identity.
    async fn pull(
        &self,
        peer: &PeerAddress,
        name: &FileName,
        reported: &ContentId,
    ) -> SyncResult<FileRecord> {
        let bytes = self.transport.fetch(peer, name).await?;
        let owned = name.clone();
        let record = run_blocking(&self.store, move |s| s.write(&owned, &bytes)).await?;
        if &record.content_id != reported {
            debug!(peer = %peer, file = %name, "Content changed on peer since listing");
        }
        Ok(record)
    }
}

fn log_failure(peer: &PeerAddress, name: &FileName, direction: Direction, e: &SyncError) {
    match e {
        SyncError::Storage(_) => {
            error!(peer = %peer, file = %name, "Local storage failed during {}: {}", direction, e)
        }
        _ => warn!(peer = %peer, file = %name, "Failed to {}: {}", direction, e),
    }
}

/// Runs a blocking storage call off the async runtime.
pub async fn run_blocking<T, F>(store: &Arc<FileStore>, f: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce(&FileStore) -> StorageResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
        .map_err(SyncError::from)
}
