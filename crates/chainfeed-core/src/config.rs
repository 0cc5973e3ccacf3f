//! Network and engine configuration, plus the engine status type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reorder::DEFAULT_REORDER_CAPACITY;

/// How heights reach the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    /// New-head notifications over a subscription.
    #[default]
    Push,
    /// Query the head height on a fixed interval.
    Poll,
}

impl std::fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Poll => write!(f, "poll"),
        }
    }
}

/// One ledger network to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Unique network id (e.g. `"polkadot"`); scopes snapshots and rewards.
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Ledger chain id reported by the node.
    #[serde(default)]
    pub chain_id: Option<String>,
    /// Adapter lookup key (e.g. `"polkadot"`).
    pub network_type: String,
    /// Node endpoint used for subscriptions (`ws://` / `wss://`).
    pub rpc_url: String,
    /// REST endpoint used for reads.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Denomination attached to reward rows that carry none.
    #[serde(default = "default_denom")]
    pub staking_denom: String,
    #[serde(default)]
    pub mode: IngestionMode,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn default_denom() -> String {
    "DOT".into()
}

fn bool_true() -> bool {
    true
}

impl NetworkConfig {
    pub fn new(
        id: impl Into<String>,
        network_type: impl Into<String>,
        rpc_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: None,
            chain_id: None,
            network_type: network_type.into(),
            rpc_url: rpc_url.into(),
            api_url: None,
            staking_denom: default_denom(),
            mode: IngestionMode::default(),
            enabled: true,
        }
    }

    pub fn with_mode(mut self, mode: IngestionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// The REST endpoint, falling back to the node endpoint.
    pub fn read_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(&self.rpc_url)
    }
}

/// Tuning knobs for an ingestion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Poll mode tick interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Connection age after which the handle is rotated (seconds).
    #[serde(default = "default_max_connection_age_secs")]
    pub max_connection_age_secs: u64,
    /// How long a retired handle stays open for in-flight queries (seconds).
    #[serde(default = "default_handoff_grace_secs")]
    pub handoff_grace_secs: u64,
    /// Delay before re-entering CONNECTING after a failed attempt (milliseconds).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Entries the reorder buffer holds back.
    #[serde(default = "default_reorder_capacity")]
    pub reorder_capacity: usize,
    /// Replay heights announced while a connection was being replaced.
    #[serde(default = "bool_true")]
    pub reconcile_on_reconnect: bool,
    /// Maximum number of heights replayed after a reconnect.
    #[serde(default = "default_reconcile_window")]
    pub reconcile_window: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_max_connection_age_secs() -> u64 {
    6 * 60 * 60
}
fn default_handoff_grace_secs() -> u64 {
    5 * 60
}
fn default_reconnect_delay_ms() -> u64 {
    1_000
}
fn default_reorder_capacity() -> usize {
    DEFAULT_REORDER_CAPACITY
}
fn default_reconcile_window() -> u64 {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_connection_age_secs: default_max_connection_age_secs(),
            handoff_grace_secs: default_handoff_grace_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reorder_capacity: default_reorder_capacity(),
            reconcile_on_reconnect: true,
            reconcile_window: default_reconcile_window(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_connection_age(&self) -> Duration {
        Duration::from_secs(self.max_connection_age_secs)
    }

    pub fn handoff_grace(&self) -> Duration {
        Duration::from_secs(self.handoff_grace_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Observable status of an ingestion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    /// Created, not yet started.
    Idle,
    /// Waiting for a ready connection.
    Connecting,
    /// Ingesting.
    Running(IngestionMode),
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Running(mode) => write!(f, "running ({mode})"),
        }
    }
}
