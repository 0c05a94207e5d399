//! filemesh node and client.
//!
//! `filemesh-node serve` runs a node: the HTTP file API plus a scheduler
//! that reconciles with every configured peer once per interval. The other
//! subcommands talk to a running node.
//!
//! Usage:
//!   filemesh-node serve --config config.json
//!   filemesh-node upload ./notes.txt --node 10.0.0.2:8000
//!   filemesh-node status
//!   filemesh-node peers --set 10.0.0.2:8000 10.0.0.3:8000

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use filemesh_node::config::{self, DEFAULT_CONFIG_FILE};
use filemesh_node::{NodeConfig, NodeState, build_router};
use filemesh_sync::{ClientConfig, HttpPeerClient, PeerTransport};
use filemesh_types::{FileName, PeerAddress};
use futures::future::join_all;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "filemesh-node")]
#[command(about = "Peer-to-peer file replication node", version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node
    Serve(ServeArgs),
    #[command(flatten)]
    Client(ClientCommand),
}

/// Subcommands that talk to a running node.
#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// List files on a node
    List(RemoteArgs),
    /// Upload a local file to a node
    Upload {
        #[command(flatten)]
        remote: RemoteArgs,
        /// File to upload
        path: PathBuf,
        /// Name to store it under (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a file from a node
    Download {
        #[command(flatten)]
        remote: RemoteArgs,
        name: String,
        /// Output path (defaults to the file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file on a node
    Delete {
        #[command(flatten)]
        remote: RemoteArgs,
        name: String,
    },
    /// Show a node's health
    Health(RemoteArgs),
    /// Ask a node to start a sync cycle now
    Sync(RemoteArgs),
    /// Show the health of a node and every peer it is configured with
    Status(RemoteArgs),
    /// Show or replace a node's peer list
    Peers {
        #[command(flatten)]
        remote: RemoteArgs,
        /// Replace the peer list with these host:port addresses
        #[arg(long = "set", value_name = "HOST:PORT", num_args = 1..)]
        set: Vec<String>,
        /// Remove every peer
        #[arg(long, conflicts_with = "set")]
        clear: bool,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to the config file (created with defaults if missing)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// HTTP port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Directory holding the replicated files
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Metadata file path
    #[arg(long)]
    metadata_file: Option<PathBuf>,

    /// Seconds between sync cycles
    #[arg(long)]
    sync_interval: Option<u64>,

    /// Largest accepted upload in bytes
    #[arg(long)]
    max_upload_bytes: Option<u64>,

    /// Address peers know this node by (default: detected IP and port)
    #[arg(long)]
    advertise: Option<String>,
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Node to talk to
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    node: String,
}

impl RemoteArgs {
    fn address(&self) -> Result<PeerAddress> {
        PeerAddress::parse(&self.node)
            .with_context(|| format!("Invalid node address {:?}", self.node))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Client(command) => run_client(command).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = NodeConfig::load_or_create(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(file) = args.metadata_file {
        config.metadata_file = file;
    }
    if let Some(secs) = args.sync_interval {
        config.sync_interval_secs = secs;
    }
    if let Some(limit) = args.max_upload_bytes {
        config.max_upload_bytes = limit;
    }

    let port = config.port;
    let local = config::local_address(args.advertise.as_deref(), port)?;
    let state = NodeState::build(
        config,
        Some(args.config.clone()),
        local.clone(),
        ClientConfig::default(),
    )
    .context("Failed to initialize node")?;

    let listener = tokio::net::TcpListener::bind((args.bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.bind, port))?;
    let peers = state.peers().snapshot().await;
    info!("Starting node at {}", local);
    info!(
        "Connected nodes: {:?}",
        peers.iter().map(ToString::to_string).collect::<Vec<_>>()
    );

    println!("\n========================================");
    println!("  filemesh node running");
    println!("========================================");
    println!("  Address:  {}", local);
    println!("  Storage:  {:?}", state.store().root());
    println!("  Peers:    {}", peers.len());
    println!("========================================\n");

    state.scheduler().start().await;
    axum::serve(listener, build_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    state.scheduler().stop().await;
    info!("Node stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn run_client(command: ClientCommand) -> Result<()> {
    let client = HttpPeerClient::with_defaults()?;
    match command {
        ClientCommand::List(remote) => {
            let node = remote.address()?;
            let entries = client.list(&node).await?;
            if entries.is_empty() {
                println!("No files on {node}");
            }
            for entry in entries {
                println!(
                    "{:<40} {:>12}  {}  {}",
                    entry.name, entry.size, entry.hash, entry.modified
                );
            }
        }
        ClientCommand::Upload { remote, path, name } => {
            let node = remote.address()?;
            let raw = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .with_context(|| format!("Cannot derive a file name from {path:?}"))?,
            };
            let name = parse_name(&raw)?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {path:?}"))?;
            let ack = client.store(&node, &name, bytes).await?;
            println!("{}: {} ({} bytes, {})", ack.message, ack.filename, ack.size, ack.hash);
        }
        ClientCommand::Download { remote, name, output } => {
            let node = remote.address()?;
            let name = parse_name(&name)?;
            let bytes = client.fetch(&node, &name).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(name.as_str()));
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {output:?}"))?;
            println!("Downloaded {} ({} bytes) to {:?}", name, bytes.len(), output);
        }
        ClientCommand::Delete { remote, name } => {
            let node = remote.address()?;
            let name = parse_name(&name)?;
            if !client.delete(&node, &name).await? {
                bail!("{name} not found on {node}");
            }
            println!("Deleted {name}");
        }
        ClientCommand::Health(remote) => {
            let node = remote.address()?;
            let health = client.health(&node).await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        ClientCommand::Sync(remote) => {
            let node = remote.address()?;
            let response = client.trigger_sync(&node).await?;
            if response.triggered {
                println!("Sync started on {node}");
            } else {
                println!("Sync not started on {node}: busy or scheduler stopped");
            }
        }
        ClientCommand::Status(remote) => {
            let node = remote.address()?;
            let mut targets = vec![node.clone()];
            for raw in client.peers(&node).await?.nodes {
                match PeerAddress::parse(&raw) {
                    Ok(peer) => targets.push(peer),
                    Err(e) => warn!("Skipping peer {:?}: {}", raw, e),
                }
            }
            let probes = targets.iter().map(|target| client.health(target));
            for (target, health) in targets.iter().zip(join_all(probes).await) {
                match health {
                    Ok(h) => println!(
                        "{:<24} {:<8} files={:<6} peers={}",
                        target, h.status, h.storage_files, h.nodes_configured
                    ),
                    Err(e) => println!("{:<24} offline  ({})", target, e),
                }
            }
        }
        ClientCommand::Peers { remote, set, clear } => {
            let node = remote.address()?;
            let body = if clear || !set.is_empty() {
                for raw in &set {
                    PeerAddress::parse(raw)
                        .with_context(|| format!("Invalid peer address {raw:?}"))?;
                }
                client.set_peers(&node, set).await?
            } else {
                client.peers(&node).await?
            };
            if body.nodes.is_empty() {
                println!("No peers configured on {node}");
            }
            for peer in body.nodes {
                println!("{peer}");
            }
        }
    }
    Ok(())
}

fn parse_name(raw: &str) -> Result<FileName> {
    FileName::parse(raw).with_context(|| format!("Invalid file name {raw:?}"))
}
