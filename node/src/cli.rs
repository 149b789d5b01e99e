//! # CLI Interface
//!
//! `clap` derive definitions for `umbra-node`. Five subcommands: `init`,
//! `keygen`, `serve`, `audit` and `version`. Every knob that matters in a
//! deployment also reads an `UMBRA_*` environment variable.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Umbra trade-settlement node.
///
/// Hosts the ledger and key store, serves the settlement protocol over
/// HTTP, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "umbra-node",
    about = "Umbra confidential trade settlement node",
    version,
    propagate_version = true
)]
pub struct UmbraNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "UMBRA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, the auditor key, demo parties, and the
    /// genesis goods.
    Init(InitArgs),
    /// Add a party to the key store and print its public identity.
    Keygen(KeygenArgs),
    /// Serve the HTTP API and the metrics endpoint.
    Serve(ServeArgs),
    /// Open an order's auditor escrow with the auditor key.
    Audit(AuditArgs),
    /// Print version information and exit.
    Version,
}

/// Settings shared by every subcommand that touches the stores.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding the ledger, the key store and the auditor key.
    #[arg(long, short = 'd', env = "UMBRA_DATA_DIR", default_value = "./umbra-data")]
    pub data_dir: PathBuf,

    /// Largest amount a balance decryption will recover.
    #[arg(long, env = "UMBRA_MAX_AMOUNT", default_value_t = umbra_protocol::config::DEFAULT_MAX_AMOUNT)]
    pub max_amount: u64,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Opening balance for the demo buyer.
    #[arg(long, default_value_t = 100)]
    pub buyer_funds: u64,

    /// Opening balance for the demo seller.
    #[arg(long, default_value_t = 50)]
    pub seller_funds: u64,

    /// Decoy keys seeded into the ring registry.
    #[arg(long, default_value_t = 8)]
    pub decoys: usize,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Display name for the new party.
    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Port for the JSON API.
    #[arg(long, env = "UMBRA_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Port for the Prometheus endpoint.
    #[arg(long, env = "UMBRA_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Order number to open.
    #[arg(long)]
    pub order: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        UmbraNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_serve_with_ports() {
        let cli = UmbraNodeCli::try_parse_from([
            "umbra-node",
            "--log-format",
            "json",
            "serve",
            "--data-dir",
            "/tmp/u",
            "--api-port",
            "1234",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.api_port, 1234);
                assert_eq!(args.data.data_dir, PathBuf::from("/tmp/u"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn keygen_requires_name() {
        assert!(UmbraNodeCli::try_parse_from(["umbra-node", "keygen"]).is_err());
    }
}
