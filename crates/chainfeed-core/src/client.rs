//! The chain client contract, implemented once per supported ledger.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::FeedError;
use crate::types::{Block, RawReward, ValidatorSet};

/// Read access to a ledger node. Owns the wire protocol.
///
/// Implementations must be `Send + Sync`; the engine shares a handle across
/// concurrently running block-processing tasks as `Arc<dyn ChainClient>`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the current chain head.
    async fn current_height(&self) -> Result<u64, FeedError>;

    /// Fetch and decode the full block at `height`.
    async fn block_by_height(&self, height: u64) -> Result<Block, FeedError>;

    /// The validator set of the current session.
    async fn validator_set(&self) -> Result<ValidatorSet, FeedError>;

    /// The currently active staking era.
    async fn current_era(&self) -> Result<u32, FeedError>;

    /// Reward entries for `era`. Depending on the ledger this may cover every
    /// era since `era`, so the result can be large.
    async fn era_rewards(&self, era: u32) -> Result<Vec<RawReward>, FeedError>;

    /// Subscribe to new-head notifications (push mode).
    async fn subscribe_heads(&self) -> Result<HeadSubscription, FeedError> {
        Err(FeedError::Unsupported("head subscriptions".into()))
    }

    /// Release the underlying transport. Called once the handle is retired.
    async fn disconnect(&self) {}
}

/// Produces ready-to-use client handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new handle and wait until it is ready to serve requests.
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError>;
}

// ─── HeadSubscription ─────────────────────────────────────────────────────────

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A live stream of new head heights plus the means to cancel it.
///
/// Dropping the subscription unsubscribes as well.
pub struct HeadSubscription {
    heads: mpsc::Receiver<u64>,
    unsubscribe: Option<Unsubscribe>,
}

impl HeadSubscription {
    pub fn new(heads: mpsc::Receiver<u64>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            heads,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next announced head height; `None` once the transport has closed.
    pub async fn next(&mut self) -> Option<u64> {
        self.heads.recv().await
    }

    /// Stop routing notifications. Heads already buffered are discarded.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
        self.heads.close();
    }
}

impl Drop for HeadSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl futures::Stream for HeadSubscription {
    type Item = u64;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<u64>> {
        self.heads.poll_recv(cx)
    }
}

impl std::fmt::Debug for HeadSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadSubscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
