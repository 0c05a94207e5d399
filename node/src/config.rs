//! Node configuration file and local address detection.

use crate::error::{NodeError, NodeResult};
use filemesh_types::PeerAddress;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// Contents of `config.json`. Missing fields take their defaults, so a bare
/// `{"nodes": [...]}` file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Peer addresses as `host:port`.
    pub nodes: Vec<String>,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub metadata_file: PathBuf,
    pub sync_interval_secs: u64,
    pub max_upload_bytes: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            port: DEFAULT_PORT,
            storage_dir: PathBuf::from("storage"),
            metadata_file: PathBuf::from("metadata.json"),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl NodeConfig {
    /// Reads a config file.
    pub fn load(path: &Path) -> NodeResult<Self> {
        let bytes = fs::read(path)?;
        let config = serde_json::from_slice(&bytes)?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reads a config file, writing the defaults first if it is missing.
    pub fn load_or_create(path: &Path) -> NodeResult<Self> {
        if path.exists() {
            return Self::load(path);
        }
        warn!("{:?} not found. Creating default config.", path);
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Writes the config as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> NodeResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Parses every configured peer address.
    pub fn peer_addresses(&self) -> NodeResult<Vec<PeerAddress>> {
        self.nodes
            .iter()
            .map(|raw| PeerAddress::parse(raw).map_err(NodeError::from))
            .collect()
    }

    /// Interval between periodic sync cycles.
    pub fn sync_interval(&self) -> NodeResult<Duration> {
        if self.sync_interval_secs == 0 {
            return Err(NodeError::Config("sync_interval_secs must be positive".to_string()));
        }
        Ok(Duration::from_secs(self.sync_interval_secs))
    }

    /// Upload size limit in bytes, clamped to the platform's address space.
    pub fn upload_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes).unwrap_or(usize::MAX)
    }
}

/// IP address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route. Falls
/// back to loopback when there is no route.
pub fn detect_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };
    probe().unwrap_or_else(|e| {
        warn!("Could not detect local IP, using loopback: {}", e);
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    })
}

/// The address this node advertises and excludes from its peer set.
pub fn local_address(advertise: Option<&str>, port: u16) -> NodeResult<PeerAddress> {
    let address = match advertise {
        Some(raw) => PeerAddress::parse(raw)?,
        None => PeerAddress::from(std::net::SocketAddr::new(detect_local_ip(), port)),
    };
    info!("Local address: {}", address);
    Ok(address)
}
