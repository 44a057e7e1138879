//! lnd-fleet - launch and drive lnd test networks
//!
//! Usage:
//!   lnd-fleet start [NAME...]                     - Start nodes (all by default)
//!   lnd-fleet exec NAME CMD...                    - Run any lncli subcommand
//!   lnd-fleet info NAME                           - getinfo
//!   lnd-fleet address NAME                        - New np2wkh address
//!   lnd-fleet balance NAME                        - Wallet balance
//!   lnd-fleet channel-balance NAME                - Channel balance
//!   lnd-fleet peers NAME                          - Connected peers
//!   lnd-fleet channels NAME                       - Open channels
//!   lnd-fleet open-channel NAME PEER LOCAL [PUSH] - Open a channel

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use lnd_fleet::node::{LndNode, SystemRunner};
use lnd_fleet::{logging, Fleet, FleetConfig};
use log::LevelFilter;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "lnd-fleet")]
#[command(about = "Launch and drive containerized lnd nodes for local test networks")]
#[command(version)]
struct Args {
    /// Fleet file (defaults to the user config directory)
    #[arg(short, long, env = "LND_FLEET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory for rotating log files (overrides the fleet file)
    #[arg(long, env = "LND_FLEET_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start nodes and wait until they answer getinfo
    Start {
        /// Nodes to start; all when empty
        names: Vec<String>,
    },

    /// Run an arbitrary lncli subcommand
    Exec {
        node: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Node identity and sync status
    Info { node: String },

    /// Generate a new address
    Address { node: String },

    /// On-chain wallet balance
    Balance { node: String },

    /// Balance held in channels
    ChannelBalance { node: String },

    /// Connected peers
    Peers { node: String },

    /// Open channels
    Channels { node: String },

    /// Open a channel to a fleet node or a raw public key
    OpenChannel {
        node: String,
        /// Fleet node name or 66-character hex public key
        peer: String,
        /// Funding amount in satoshis
        local: u64,
        /// Amount pushed to the peer in satoshis
        #[arg(default_value_t = 0)]
        push: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(FleetConfig::config_path);
    let config = FleetConfig::load_from(&path)
        .with_context(|| format!("Failed to load fleet from {}", path.display()))?;

    let log_dir = args.log_dir.clone().or_else(|| config.log_dir());
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::init_logger(log_dir.as_deref(), level)?;

    let fleet = Fleet::new(&config, Arc::new(SystemRunner))?;

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    run_interruptible(&fleet, run(&fleet, args.command), interrupt).await
}

/// Drive `work` to completion; on interrupt, cancel pending retries and let
/// in-flight commands finish before reporting.
async fn run_interruptible(
    fleet: &Fleet,
    work: impl Future<Output = Result<()>>,
    interrupt: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(work);
    tokio::select! {
        result = &mut work => result,
        _ = interrupt => {
            log::warn!("Interrupted, stopping pending retries");
            fleet.cancel();
            work.await?;
            bail!("Interrupted")
        }
    }
}

async fn run(fleet: &Fleet, command: Commands) -> Result<()> {
    match command {
        Commands::Start { names } => {
            let results = if names.is_empty() {
                fleet.start_all().await
            } else {
                fleet.start(&names).await
            };

            let mut failed = 0;
            let mut report = serde_json::Map::new();
            for (name, result) in results {
                let entry = match result {
                    Ok(pubkey) => json!({ "identity_pubkey": pubkey }),
                    Err(e) => {
                        failed += 1;
                        json!({ "error": e.to_string() })
                    }
                };
                report.insert(name, entry);
            }
            print_json(&report)?;

            if failed > 0 {
                bail!("{} node(s) failed to start", failed);
            }
            Ok(())
        }
        Commands::Exec { node, command } => {
            print_json(&find(fleet, &node)?.exec_args(&command).await?)
        }
        Commands::Info { node } => print_json(&find(fleet, &node)?.get_info().await?),
        Commands::Address { node } => {
            let address = find(fleet, &node)?.get_address().await?;
            print_json(&json!({ "address": address }))
        }
        Commands::Balance { node } => print_json(&find(fleet, &node)?.get_balance().await?),
        Commands::ChannelBalance { node } => {
            print_json(&find(fleet, &node)?.channel_balance().await?)
        }
        Commands::Peers { node } => print_json(&find(fleet, &node)?.list_peers().await?),
        Commands::Channels { node } => print_json(&find(fleet, &node)?.list_channels().await?),
        Commands::OpenChannel {
            node,
            peer,
            local,
            push,
        } => {
            let from = find(fleet, &node)?;
            // A fleet node's key is only known to this process after asking it.
            let pubkey = match fleet.node(&peer) {
                Some(peer_node) => peer_node.get_info().await?.identity_pubkey,
                None => peer,
            };
            print_json(&from.open_channel_with_push(&pubkey, local, push).await?)
        }
    }
}

fn find<'a>(fleet: &'a Fleet, name: &str) -> Result<&'a LndNode> {
    fleet
        .node(name)
        .ok_or_else(|| anyhow!("No node named {} in the fleet", name))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
