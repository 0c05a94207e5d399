//! Peer sync for filemesh.
//!
//! # Architecture
//!
//! Nodes are symmetric: each serves the same HTTP API and runs the same
//! reconciliation against every peer it is configured with. There is no
//! coordinator and no persistent per-peer state.
//!
//! ## Components
//!
//! - **Protocol**: request and response bodies of the HTTP API
//! - **Transport**: the [`PeerTransport`] seam, with [`HttpPeerClient`] as
//!   the production implementation and [`transport::mock`] for tests
//! - **Engine**: [`ReconciliationEngine`] runs one cycle against a peer list
//! - **Scheduler**: [`SyncScheduler`] runs cycles periodically and on
//!   demand, never more than one at a time
//!
//! ## Sync Process
//!
//! 1. **Scan**: read the local name → identity view
//! 2. **List**: fetch each peer's listing; skip peers that fail
//! 3. **Push**: upload files the peer lacks or holds differently
//! 4. **Pull**: download files only the peer has
//!
//! # Example
//!
//! ```no_run
//! use filemesh_storage::FileStore;
//! use filemesh_sync::{HttpPeerClient, PeerSet, ReconciliationEngine};
//! use filemesh_types::PeerAddress;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileStore::open("storage", "metadata.json")?);
//! let client = Arc::new(HttpPeerClient::with_defaults()?);
//! let engine = ReconciliationEngine::new(store, client);
//!
//! let peers = PeerSet::new([PeerAddress::parse("10.0.0.2:8000")?], None);
//! let report = engine.run_cycle(&peers.snapshot().await).await?;
//! println!("pushed {} pulled {}", report.pushed(), report.pulled());
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod peers;
pub mod protocol;
mod scheduler;
pub mod transport;

pub use client::{ClientConfig, HttpPeerClient};
pub use engine::{
    CycleReport, Direction, FileFailure, FileView, PeerOutcome, PeerReport, PeerSummary,
    ReconciliationEngine, SyncPlan, run_blocking,
};
pub use error::{SyncError, SyncResult, TransferError, TransferResult};
pub use peers::PeerSet;
pub use protocol::{
    DeleteRequest, DeleteResponse, ErrorBody, FileEntry, HealthResponse, PeersBody,
    StoreResponse, SyncTriggerResponse,
};
pub use scheduler::{SchedulerConfig, SyncScheduler};
pub use transport::PeerTransport;
