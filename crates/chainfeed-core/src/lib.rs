//! chainfeed-core — real-time block ingestion for proof-of-stake ledgers.
//!
//! # Architecture
//!
//! ```text
//! IngestionEngine (one per network)
//!     ├── ConnectionLifecycleManager (max-age rotation, deferred teardown)
//!     ├── push loop: HeadSubscription → one task per height
//!     ├── poll loop: interval tick → sequential catch-up
//!     └── BlockProcessor
//!             ├── ReorderBuffer      (bounded late-arrival window)
//!             ├── session check      → ChainClient::validator_set
//!             ├── era check          → BackfillTrigger
//!             ├── PersistenceStore   (snapshot overwrite)
//!             └── EventPublisher     (block / transaction / SEND-RECEIVE)
//! ```
//!
//! Ledger adapters implement [`ChainClient`] and [`Connector`] and register
//! with a [`ConnectorRegistry`].

pub mod backfill;
pub mod builder;
pub mod client;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod fault;
pub mod publisher;
pub mod registry;
pub mod reorder;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use backfill::{BackfillOutcome, BackfillQueue, BackfillTrigger, NoopBackfill, ProcessBackfill, RewardsBackfillJob};
pub use builder::EngineConfigBuilder;
pub use client::{ChainClient, Connector, HeadSubscription};
pub use config::{EngineConfig, EngineStatus, IngestionMode, NetworkConfig};
pub use connection::{ConnectionLifecycleManager, ConnectionState};
pub use engine::{BlockProcessor, Collaborators, IngestionEngine, IngestionStats, StatsSnapshot};
pub use error::FeedError;
pub use fault::{FaultReporter, FaultScope, TracingFaultReporter};
pub use publisher::{classify_transfer, BroadcastPublisher, EventPublisher, EventType, FeedEvent, ResourceType};
pub use registry::ConnectorRegistry;
pub use reorder::{ReorderBuffer, Sequenced, DEFAULT_REORDER_CAPACITY};
pub use state::IngestionState;
pub use store::PersistenceStore;
pub use types::{
    Amount, Block, EraRewardRecord, RawReward, Snapshot, Transaction, TxDetails, TxKind, Validator,
    ValidatorSet,
};
