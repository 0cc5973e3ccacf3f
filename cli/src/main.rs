//! ChainFeed CLI — run real-time block ingestion for proof-of-stake ledgers.
//!
//! # Commands
//! ```text
//! chainfeed run       --config <file.json> [--network <id>]...
//! chainfeed backfill  --config <file.json> --network <id> --era <n>
//! chainfeed networks  --config <file.json>
//! chainfeed info
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use chainfeed_core::config::EngineConfig;
use chainfeed_core::registry::ConnectorRegistry;
use chainfeed_core::store::PersistenceStore;
use chainfeed_storage::{InMemoryStore, SqliteStore};

mod cmd_backfill;
mod cmd_run;
mod config;
mod logging;

use config::{FeedConfig, StorageConfig};

#[derive(Parser)]
#[command(
    name = "chainfeed",
    about = "Real-time block ingestion for Substrate ledgers — ChainFeed CLI",
    long_about = "
ChainFeed CLI: follow new blocks, keep a per-network snapshot, publish
block and transaction events, and backfill staking rewards on era change.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter; overrides the `log` section of the config file
",
    version
)]
struct Cli {
    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every enabled network until Ctrl-C
    Run {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,
        /// Only ingest these network ids (repeatable)
        #[arg(long)]
        network: Vec<String>,
    },

    /// Store the staking rewards of one era and exit
    Backfill {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        network: String,
        #[arg(long)]
        era: u32,
    },

    /// List configured networks
    Networks {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show ChainFeed build and default settings
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, network } => {
            let feed = load_config(&config, cli.verbose)?;
            cmd_run::run(&config, feed, &network).await
        }

        Commands::Backfill { config, network, era } => {
            let feed = load_config(&config, cli.verbose)?;
            cmd_backfill::run(feed, &network, era).await
        }

        Commands::Networks { config } => cmd_networks(&FeedConfig::load(&config)?),

        Commands::Info => cmd_info(),
    }
}

fn load_config(path: &Path, verbose: bool) -> Result<FeedConfig> {
    let mut config = FeedConfig::load(path)?;
    if verbose {
        config.log.level = "debug".into();
    }
    logging::init_tracing(&config.log);
    Ok(config)
}

/// Every adapter this binary ships with.
pub(crate) fn registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    chainfeed_substrate::register(&mut registry);
    registry
}

pub(crate) async fn open_store(config: &StorageConfig) -> Result<Arc<dyn PersistenceStore>> {
    let store: Arc<dyn PersistenceStore> = match &config.sqlite_path {
        Some(path) => {
            tracing::info!(%path, "using sqlite store");
            Arc::new(SqliteStore::open(path).await?)
        }
        None => Arc::new(InMemoryStore::new()),
    };
    Ok(store)
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_networks(config: &FeedConfig) -> Result<()> {
    let registry = registry();
    println!("{:<16} {:<12} {:<6} {:<8} {}", "ID", "TYPE", "MODE", "ENABLED", "ENDPOINT");
    for n in &config.networks {
        let supported = if registry.supports(&n.network_type) { "" } else { "  (unsupported type)" };
        println!(
            "{:<16} {:<12} {:<6} {:<8} {}{}",
            n.id, n.network_type, n.mode, n.enabled, n.rpc_url, supported
        );
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = EngineConfig::default();
    println!("ChainFeed v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Network types:               {}", registry().network_types().join(", "));
    println!("Storage:                     memory, sqlite");
    println!("Backfill modes:              process, in_process, disabled");
    println!();
    println!("Engine defaults:");
    println!("  poll interval              {} ms", defaults.poll_interval_ms);
    println!("  max connection age         {} s", defaults.max_connection_age_secs);
    println!("  handoff grace              {} s", defaults.handoff_grace_secs);
    println!("  reconnect delay            {} ms", defaults.reconnect_delay_ms);
    println!("  reorder capacity           {}", defaults.reorder_capacity);
    println!(
        "  reconcile on reconnect     {} (window {})",
        defaults.reconcile_on_reconnect, defaults.reconcile_window
    );
    Ok(())
}
