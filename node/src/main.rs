// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Umbra Node
//!
//! Entry point for the `umbra-node` binary. Parses CLI arguments, sets up
//! logging, opens the stores under the data directory, and either seeds
//! them, adds a party, serves the API, or opens an audit escrow.
//!
//! Data directory layout:
//!
//! ```text
//! <data_dir>/
//! ├── ledger/        sled world state
//! ├── keys/          one <address>.json per party (0600)
//! ├── auditor.key    auditor secret, hex (0600)
//! └── node.json      manifest: auditor public key, demo parties
//! ```

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;

use umbra_protocol::config::{ProtocolConfig, PROTOCOL_FINGERPRINT, PROTOCOL_VERSION};
use umbra_protocol::crypto::{CurveKeypair, CurvePublicKey};
use umbra_protocol::keystore::{FileKeyStore, KeyStore, Party};
use umbra_protocol::ledger::SledLedger;
use umbra_protocol::records::Genesis;
use umbra_protocol::registry::RegistryRingSource;
use umbra_protocol::SettlementProtocol;

use api::NodeProtocol;
use cli::{Commands, DataArgs, UmbraNodeCli};
use metrics::NodeMetrics;

const DEFAULT_LOG_LEVEL: &str = "umbra_node=info,umbra_protocol=info,tower_http=info";

/// What `init` leaves behind for the other subcommands.
#[derive(Debug, Serialize, Deserialize)]
struct NodeManifest {
    auditor: CurvePublicKey,
    buyer: String,
    seller: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = UmbraNodeCli::parse();
    logging::init_logging(DEFAULT_LOG_LEVEL, cli.log_format);

    match cli.command {
        Commands::Init(args) => init_node(args),
        Commands::Keygen(args) => keygen(args),
        Commands::Serve(args) => serve(args).await,
        Commands::Audit(args) => audit(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

fn ledger_path(dir: &Path) -> PathBuf {
    dir.join("ledger")
}

fn keys_path(dir: &Path) -> PathBuf {
    dir.join("keys")
}

fn auditor_path(dir: &Path) -> PathBuf {
    dir.join("auditor.key")
}

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("node.json")
}

fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn read_manifest(dir: &Path) -> Result<NodeManifest> {
    let path = manifest_path(dir);
    let raw = std::fs::read(&path)
        .with_context(|| format!("{} missing; run `umbra-node init` first", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("malformed {}", path.display()))
}

fn open_protocol(data: &DataArgs, auditor: CurvePublicKey) -> Result<NodeProtocol> {
    let ledger_dir = ledger_path(&data.data_dir);
    let ledger = SledLedger::open(&ledger_dir)
        .with_context(|| format!("failed to open ledger at {}", ledger_dir.display()))?;
    let keys = FileKeyStore::open(keys_path(&data.data_dir)).context("failed to open key store")?;
    let config = ProtocolConfig {
        max_amount: data.max_amount,
        ..Default::default()
    };
    SettlementProtocol::new(ledger, keys, RegistryRingSource, auditor, config)
        .context("failed to start settlement protocol")
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// Seed a fresh data directory: auditor key, two demo parties with
/// wallets, decoy ring members, and the genesis catalogue.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let dir = &args.data.data_dir;
    if manifest_path(dir).exists() {
        bail!("{} is already initialized", dir.display());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    tracing::info!(data_dir = %dir.display(), "initializing node");

    let auditor = CurveKeypair::generate();
    write_private(&auditor_path(dir), hex::encode(auditor.secret_bytes()).as_bytes())?;

    let protocol = open_protocol(&args.data, auditor.public_key())?;
    let buyer = protocol.keystore().insert(Party::generate("buyer"))?;
    let seller = protocol.keystore().insert(Party::generate("seller"))?;

    let decoys = (0..args.decoys)
        .map(|_| CurveKeypair::generate().public_key())
        .collect();
    protocol
        .init_ledger(&Genesis::demo(&seller, decoys))
        .context("failed to seed genesis")?;
    protocol.create_wallet(&buyer, args.buyer_funds)?;
    protocol.create_wallet(&seller, args.seller_funds)?;
    protocol.ledger().flush()?;

    let manifest = NodeManifest {
        auditor: auditor.public_key(),
        buyer: buyer.clone(),
        seller: seller.clone(),
        created_at: chrono::Utc::now(),
    };
    std::fs::write(manifest_path(dir), serde_json::to_vec_pretty(&manifest)?)?;

    println!("Node initialized.");
    println!("  Data directory : {}", dir.display());
    println!("  Auditor key    : {}", manifest.auditor);
    println!("  Buyer          : {buyer} ({} funds)", args.buyer_funds);
    println!("  Seller         : {seller} ({} funds)", args.seller_funds);
    Ok(())
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let store = FileKeyStore::open(keys_path(&args.data.data_dir)).context("failed to open key store")?;
    let address = store.insert(Party::generate(args.name))?;
    let identity = store.identity(&address)?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

async fn serve(args: cli::ServeArgs) -> Result<()> {
    let manifest = read_manifest(&args.data.data_dir)?;
    let protocol = tokio::task::spawn_blocking({
        let data = args.data.clone();
        move || open_protocol(&data, manifest.auditor)
    })
    .await
    .context("protocol setup task failed")??;

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        protocol: Arc::new(protocol),
        metrics: Arc::clone(&node_metrics),
    };

    let api_router = api::create_router(state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "API server listening");

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(node_metrics);
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("umbra-node stopped");
    Ok(())
}

fn audit(args: cli::AuditArgs) -> Result<()> {
    let dir = &args.data.data_dir;
    let raw = std::fs::read_to_string(auditor_path(dir))
        .with_context(|| format!("no auditor key in {}", dir.display()))?;
    let auditor = CurveKeypair::from_hex(raw.trim()).context("malformed auditor key")?;
    let protocol = open_protocol(&args.data, auditor.public_key())?;
    let record = protocol.audit(&args.order, &auditor)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn print_version() {
    println!("umbra-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", PROTOCOL_VERSION);
    println!("wire       {}", PROTOCOL_FINGERPRINT);
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C only off Unix).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => res.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    Ok(())
}
