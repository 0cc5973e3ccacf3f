//! `chainfeed run`: one ingestion engine per selected network.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;

use chainfeed_core::backfill::{BackfillQueue, BackfillTrigger, NoopBackfill, ProcessBackfill, RewardsBackfillJob};
use chainfeed_core::client::Connector;
use chainfeed_core::config::NetworkConfig;
use chainfeed_core::engine::{Collaborators, IngestionEngine};
use chainfeed_core::fault::{FaultReporter, TracingFaultReporter};
use chainfeed_core::publisher::{BroadcastPublisher, FeedEvent};
use chainfeed_core::store::PersistenceStore;

use crate::config::{BackfillConfig, BackfillMode, FeedConfig};

pub async fn run(config_path: &Path, config: FeedConfig, only: &[String]) -> Result<()> {
    let networks = config.selected_networks(only);
    if networks.is_empty() {
        bail!("no enabled network matches the selection");
    }

    let store = crate::open_store(&config.storage).await?;
    if config.storage.sqlite_path.is_none() && config.backfill.mode == BackfillMode::Process {
        tracing::warn!("backfill processes cannot see the in-memory store; their rows will be lost");
    }

    let publisher = Arc::new(BroadcastPublisher::default());
    tokio::spawn(log_events(publisher.subscribe()));

    let registry = crate::registry();
    let faults: Arc<dyn FaultReporter> = Arc::new(TracingFaultReporter);
    let mut engines = JoinSet::new();

    for network in networks {
        let connector = registry
            .connector_for(network)
            .with_context(|| format!("network '{}'", network.id))?;
        let backfill = backfill_trigger(
            &config.backfill,
            config_path,
            network,
            Arc::clone(&connector),
            Arc::clone(&store),
            Arc::clone(&faults),
        )?;

        let collaborators = Collaborators::new(Arc::clone(&store), publisher.clone())
            .with_backfill(backfill)
            .with_faults(Arc::clone(&faults));
        let engine = IngestionEngine::new(network.clone(), config.engine.clone(), connector, collaborators);

        let mut status = engine.status();
        let network_id = network.id.clone();
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let current = *status.borrow();
                tracing::info!(network = %network_id, status = %current, "engine status");
            }
        });

        engines.spawn(engine.run());
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("shutting down");
    engines.shutdown().await;
    Ok(())
}

fn backfill_trigger(
    config: &BackfillConfig,
    config_path: &Path,
    network: &NetworkConfig,
    connector: Arc<dyn Connector>,
    store: Arc<dyn PersistenceStore>,
    faults: Arc<dyn FaultReporter>,
) -> Result<Arc<dyn BackfillTrigger>> {
    let trigger: Arc<dyn BackfillTrigger> = match config.mode {
        BackfillMode::Disabled => Arc::new(NoopBackfill),
        BackfillMode::InProcess => {
            let job = RewardsBackfillJob::new(network.id.clone(), network.staking_denom.clone(), connector, store);
            let (queue, _worker) = BackfillQueue::spawn(job, faults);
            Arc::new(queue)
        }
        BackfillMode::Process => {
            let program: OsString = match &config.program {
                Some(program) => program.into(),
                None => std::env::current_exe()
                    .context("locating the chainfeed executable")?
                    .into(),
            };
            Arc::new(ProcessBackfill::new(program, process_args(config, config_path, network), faults))
        }
    };
    Ok(trigger)
}

fn process_args(config: &BackfillConfig, config_path: &Path, network: &NetworkConfig) -> Vec<OsString> {
    if !config.args.is_empty() {
        return config.args.iter().map(OsString::from).collect();
    }
    vec![
        "backfill".into(),
        "--config".into(),
        config_path.as_os_str().to_owned(),
        "--network".into(),
        network.id.clone().into(),
    ]
}

async fn log_events(mut events: broadcast::Receiver<FeedEvent>) {
    loop {
        match events.recv().await {
            Ok(FeedEvent::BlockAdded { network_id, block }) => {
                tracing::info!(
                    network = %network_id,
                    height = block.height,
                    txs = block.transactions.len(),
                    "block added"
                );
            }
            Ok(FeedEvent::TransactionAdded { network_id, address, tx }) => {
                tracing::debug!(network = %network_id, %address, hash = %tx.hash, kind = %tx.kind(), "transaction added");
            }
            Ok(FeedEvent::Domain { network_id, event, address, tx, .. }) => {
                tracing::debug!(network = %network_id, %address, %event, hash = %tx.hash, "transfer event");
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagging");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
