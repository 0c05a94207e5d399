use filemesh_node::NodeConfig;
use filemesh_node::config::{
    self, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, DEFAULT_SYNC_INTERVAL_SECS,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;

// ── Defaults ────────────────────────────────────────────────────

#[test]
fn node_config_default() {
    let cfg = NodeConfig::default();
    assert!(cfg.nodes.is_empty());
    assert_eq!(cfg.port, 8000);
    assert_eq!(cfg.storage_dir, PathBuf::from("storage"));
    assert_eq!(cfg.metadata_file, PathBuf::from("metadata.json"));
    assert_eq!(cfg.sync_interval_secs, 86_400);
    assert_eq!(cfg.max_upload_bytes, 1 << 30);
    assert_eq!(DEFAULT_PORT, cfg.port);
    assert_eq!(DEFAULT_SYNC_INTERVAL_SECS, cfg.sync_interval_secs);
    assert_eq!(DEFAULT_MAX_UPLOAD_BYTES, cfg.max_upload_bytes);
}

#[test]
fn bare_nodes_file_fills_in_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"nodes": ["192.168.1.10:8000", "192.168.1.11:8000"]}"#).unwrap();

    let cfg = NodeConfig::load(&path).unwrap();

    assert_eq!(cfg.nodes, vec!["192.168.1.10:8000", "192.168.1.11:8000"]);
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.peer_addresses().unwrap().len(), 2);
}

// ── Load / save ─────────────────────────────────────────────────

#[test]
fn missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let cfg = NodeConfig::load_or_create(&path).unwrap();

    assert_eq!(cfg, NodeConfig::default());
    assert!(path.is_file());
    assert_eq!(NodeConfig::load(&path).unwrap(), cfg);
}

#[test]
fn save_then_load_preserves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let cfg = NodeConfig {
        nodes: vec!["10.0.0.2:9000".to_string()],
        port: 9000,
        sync_interval_secs: 60,
        ..NodeConfig::default()
    };

    cfg.save(&path).unwrap();

    assert_eq!(NodeConfig::load(&path).unwrap(), cfg);
    assert!(!dir.path().join("config.json.tmp").exists());
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{nodes:").unwrap();

    assert!(NodeConfig::load(&path).is_err());
    assert!(NodeConfig::load_or_create(&path).is_err());
}

// ── Validation ──────────────────────────────────────────────────

#[test]
fn invalid_peer_address_is_an_error() {
    let cfg = NodeConfig {
        nodes: vec!["10.0.0.2:8000".to_string(), "http://10.0.0.3".to_string()],
        ..NodeConfig::default()
    };
    assert!(cfg.peer_addresses().is_err());
}

#[test]
fn zero_interval_is_rejected() {
    let cfg = NodeConfig {
        sync_interval_secs: 0,
        ..NodeConfig::default()
    };
    assert!(cfg.sync_interval().is_err());
    assert_eq!(
        NodeConfig::default().sync_interval().unwrap(),
        Duration::from_secs(86_400)
    );
}

// ── Local address ───────────────────────────────────────────────

#[test]
fn advertised_address_wins() {
    let addr = config::local_address(Some("node-a.lan:8123"), 8000).unwrap();
    assert_eq!(addr.as_str(), "node-a.lan:8123");
    assert!(config::local_address(Some("bad address"), 8000).is_err());
}

#[test]
fn detected_address_uses_configured_port() {
    let addr = config::local_address(None, 8123).unwrap();
    assert!(addr.as_str().ends_with(":8123"));
}
