//! Connection lifecycle: owns the client handle and rotates it before it
//! gets old.
//!
//! Long-lived streaming connections to a ledger node accumulate client-side
//! memory. The manager enforces a maximum connection age: once exceeded, the
//! head subscription is cancelled, the handle is retired (kept open for a
//! grace window so in-flight queries can finish) and a fresh one is opened.
//!
//! ```text
//! DISCONNECTED → CONNECTING → ACTIVE → HANDOFF_PENDING → CONNECTING → ACTIVE …
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::{ChainClient, Connector, HeadSubscription};
use crate::error::FeedError;

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Active,
    /// The previous handle was retired; a new one has not been opened yet.
    HandoffPending,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::HandoffPending => write!(f, "handoff-pending"),
        }
    }
}

/// Owns the active client handle for one network.
pub struct ConnectionLifecycleManager {
    network_id: String,
    connector: Arc<dyn Connector>,
    active: Option<Arc<dyn ChainClient>>,
    opened_at: Option<Instant>,
    state: ConnectionState,
    max_age: Duration,
    grace: Duration,
    handoffs: u64,
}

impl ConnectionLifecycleManager {
    pub fn new(
        network_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        max_age: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            network_id: network_id.into(),
            connector,
            active: None,
            opened_at: None,
            state: ConnectionState::Disconnected,
            max_age,
            grace,
            handoffs: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The active handle, if any.
    pub fn active(&self) -> Option<Arc<dyn ChainClient>> {
        self.active.clone()
    }

    /// When the active handle became ready.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Number of completed rotations.
    pub fn handoffs(&self) -> u64 {
        self.handoffs
    }

    /// Return the active handle, opening one if none exists. Returns only once
    /// the new handle is ready.
    pub async fn ensure_connected(&mut self) -> Result<Arc<dyn ChainClient>, FeedError> {
        if let Some(client) = &self.active {
            return Ok(Arc::clone(client));
        }

        self.state = ConnectionState::Connecting;
        tracing::info!(network = %self.network_id, "connecting to ledger node");

        match self.connector.connect().await {
            Ok(client) => {
                self.active = Some(Arc::clone(&client));
                self.opened_at = Some(Instant::now());
                self.state = ConnectionState::Active;
                tracing::info!(network = %self.network_id, "ledger node connection ready");
                Ok(client)
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Whether the active handle is older than the maximum age at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.opened_at
            .map_or(false, |opened| now.saturating_duration_since(opened) > self.max_age)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Retire the active handle.
    ///
    /// `subscription` is cancelled before the handle reference is cleared, so
    /// no further heads are routed from the retiring handle. The handle itself
    /// is disconnected after the grace window; the returned task performs that
    /// teardown.
    pub fn begin_handoff(&mut self, subscription: Option<HeadSubscription>) -> Option<JoinHandle<()>> {
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }

        let retired = self.active.take()?;
        self.opened_at = None;
        self.state = ConnectionState::HandoffPending;
        self.handoffs += 1;

        tracing::info!(
            network = %self.network_id,
            grace_secs = self.grace.as_secs(),
            "rotating ledger node connection"
        );

        let grace = self.grace;
        let network_id = self.network_id.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            retired.disconnect().await;
            tracing::debug!(network = %network_id, "retired connection closed");
        }))
    }

    /// Drop a handle whose transport has failed. It is torn down right away.
    pub fn mark_lost(&mut self) {
        if let Some(lost) = self.active.take() {
            tokio::spawn(async move { lost.disconnect().await });
        }
        self.opened_at = None;
        self.state = ConnectionState::Disconnected;
        tracing::warn!(network = %self.network_id, "ledger node connection lost");
    }
}
