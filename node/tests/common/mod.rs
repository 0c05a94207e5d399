#![allow(dead_code)]

use filemesh_node::{NodeConfig, NodeState, build_router};
use filemesh_sync::ClientConfig;
use filemesh_types::PeerAddress;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestNode {
    pub dir: TempDir,
    pub state: Arc<NodeState>,
    pub addr: PeerAddress,
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr.base_url(), path)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }
}

/// Spin up a node on an OS-assigned port.
pub async fn spawn_node() -> TestNode {
    spawn_node_with(|_| {}).await
}

pub async fn spawn_node_with(customize: impl FnOnce(&mut NodeConfig)) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = PeerAddress::from(listener.local_addr().unwrap());

    let mut config = NodeConfig {
        storage_dir: dir.path().join("storage"),
        metadata_file: dir.path().join("metadata.json"),
        port: addr_port(&addr),
        ..NodeConfig::default()
    };
    customize(&mut config);

    let state = NodeState::build(
        config,
        Some(dir.path().join("config.json")),
        addr.clone(),
        ClientConfig::default(),
    )
    .unwrap();
    let app = build_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode { dir, state, addr }
}

/// An address with nothing listening on it.
pub fn dead_address() -> PeerAddress {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    PeerAddress::from(listener.local_addr().unwrap())
}

fn addr_port(addr: &PeerAddress) -> u16 {
    addr.as_str()
        .rsplit_once(':')
        .and_then(|(_, p)| p.parse().ok())
        .unwrap()
}
