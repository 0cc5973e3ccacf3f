//! `chainfeed backfill`: store the reward rows of one era, then exit.

use anyhow::{Context, Result};

use chainfeed_core::backfill::{BackfillOutcome, RewardsBackfillJob};

use crate::config::FeedConfig;

pub async fn run(config: FeedConfig, network_id: &str, era: u32) -> Result<()> {
    let network = config.network(network_id)?;
    let store = crate::open_store(&config.storage).await?;
    let connector = crate::registry()
        .connector_for(network)
        .with_context(|| format!("network '{network_id}'"))?;

    let job = RewardsBackfillJob::new(network.id.clone(), network.staking_denom.clone(), connector, store);
    let outcome = job
        .run(era)
        .await
        .with_context(|| format!("backfilling era {era} for '{network_id}'"))?;

    match outcome {
        BackfillOutcome::AlreadyPresent => {
            println!("{network_id}: rewards for era {era} already stored");
        }
        BackfillOutcome::Stored(rows) => {
            println!("{network_id}: stored {rows} reward rows for era {era}");
        }
    }
    Ok(())
}
