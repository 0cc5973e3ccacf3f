//! `ChainClient` over a Substrate API sidecar, with node WebSocket heads.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use chainfeed_core::client::{ChainClient, HeadSubscription};
use chainfeed_core::error::FeedError;
use chainfeed_core::types::{Block, RawReward, ValidatorSet};

use crate::decode;
use crate::heads;
use crate::transport::SidecarTransport;

/// Concurrent payout queries per rewards fetch.
const PAYOUT_CONCURRENCY: usize = 8;

/// A Substrate ledger client. Reads go through `T`; head subscriptions open
/// their own socket to `heads_url`.
pub struct SubstrateClient<T> {
    network_id: String,
    transport: T,
    heads_url: Option<String>,
}

impl<T: SidecarTransport> SubstrateClient<T> {
    pub fn new(network_id: impl Into<String>, transport: T) -> Self {
        Self {
            network_id: network_id.into(),
            transport,
            heads_url: None,
        }
    }

    /// Enable push mode against the node WebSocket at `url`.
    pub fn with_heads_url(mut self, url: impl Into<String>) -> Self {
        self.heads_url = Some(url.into());
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn session_index_at(&self, height: Option<u64>) -> Result<u64, FeedError> {
        let path = match height {
            Some(h) => format!("/pallets/session/storage/currentIndex?at={h}"),
            None => "/pallets/session/storage/currentIndex".to_string(),
        };
        decode::decode_session_index(&self.transport.get(&path).await?)
    }
}

#[async_trait]
impl<T: SidecarTransport> ChainClient for SubstrateClient<T> {
    async fn current_height(&self) -> Result<u64, FeedError> {
        let header = self.transport.get("/blocks/head/header").await?;
        decode::decode_header_number(&header)
    }

    async fn block_by_height(&self, height: u64) -> Result<Block, FeedError> {
        let path = format!("/blocks/{height}");
        let (body, session_index) = futures::try_join!(
            self.transport.get(&path),
            self.session_index_at(Some(height))
        )?;
        decode::decode_block(&body, session_index)
    }

    async fn validator_set(&self) -> Result<ValidatorSet, FeedError> {
        let (body, session_index) = futures::try_join!(
            self.transport.get("/pallets/session/storage/validators"),
            self.session_index_at(None)
        )?;
        decode::decode_validators(&body, session_index)
    }

    async fn current_era(&self) -> Result<u32, FeedError> {
        let body = self.transport.get("/pallets/staking/storage/activeEra").await?;
        decode::decode_active_era(&body)
    }

    async fn era_rewards(&self, era: u32) -> Result<Vec<RawReward>, FeedError> {
        let validators = self.validator_set().await?;
        tracing::info!(
            network = %self.network_id,
            era,
            validators = validators.len(),
            "fetching staking payouts"
        );

        let batches: Vec<Vec<RawReward>> = futures::stream::iter(validators.validators.into_keys())
            .map(|address| async move {
                let path = format!("/accounts/{address}/staking-payouts?era={era}");
                let body = self.transport.get(&path).await?;
                decode::decode_payouts(&body, &address)
            })
            .buffer_unordered(PAYOUT_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    async fn subscribe_heads(&self) -> Result<HeadSubscription, FeedError> {
        match &self.heads_url {
            Some(url) => heads::subscribe_new_heads(url).await,
            None => Err(FeedError::Unsupported(format!(
                "{}: no node WebSocket configured for head subscriptions",
                self.network_id
            ))),
        }
    }

    async fn disconnect(&self) {
        tracing::debug!(network = %self.network_id, url = %self.transport.base_url(), "client released");
    }
}
