//! Event fan-out to live subscribers.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Block, Transaction, TxKind};

/// Resource a domain event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Transaction,
}

/// Classified domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TransactionSend,
    TransactionReceive,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransactionSend => write!(f, "SEND"),
            Self::TransactionReceive => write!(f, "RECEIVE"),
        }
    }
}

/// Classify a Send transaction from the point of view of `address`.
///
/// Returns `None` for every other transaction type.
pub fn classify_transfer(address: &str, tx: &Transaction) -> Option<EventType> {
    if tx.kind() != TxKind::Send {
        return None;
    }
    if tx.details.sender() == Some(address) {
        Some(EventType::TransactionSend)
    } else {
        Some(EventType::TransactionReceive)
    }
}

/// Fire-and-forget publisher. Nothing returned here is observed by the engine.
pub trait EventPublisher: Send + Sync {
    fn block_added(&self, network_id: &str, block: &Block);

    fn transaction_added(&self, network_id: &str, address: &str, tx: &Transaction);

    fn domain_event(
        &self,
        network_id: &str,
        resource: ResourceType,
        event: EventType,
        address: &str,
        tx: &Transaction,
    );
}

// ─── Broadcast implementation ─────────────────────────────────────────────────

/// An event delivered to subscribers of [`BroadcastPublisher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    BlockAdded {
        network_id: String,
        block: Block,
    },
    TransactionAdded {
        network_id: String,
        address: String,
        tx: Transaction,
    },
    Domain {
        network_id: String,
        resource: ResourceType,
        event: EventType,
        address: String,
        tx: Transaction,
    },
}

impl FeedEvent {
    pub fn network_id(&self) -> &str {
        match self {
            Self::BlockAdded { network_id, .. }
            | Self::TransactionAdded { network_id, .. }
            | Self::Domain { network_id, .. } => network_id,
        }
    }
}

/// Publisher backed by a `tokio::sync::broadcast` channel. Slow subscribers
/// lag and lose the oldest events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<FeedEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: FeedEvent) {
        // No receivers is not an error for a live feed.
        if self.tx.send(event).is_err() {
            tracing::trace!("no active feed subscribers");
        }
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1_024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn block_added(&self, network_id: &str, block: &Block) {
        self.send(FeedEvent::BlockAdded {
            network_id: network_id.to_string(),
            block: block.clone(),
        });
    }

    fn transaction_added(&self, network_id: &str, address: &str, tx: &Transaction) {
        self.send(FeedEvent::TransactionAdded {
            network_id: network_id.to_string(),
            address: address.to_string(),
            tx: tx.clone(),
        });
    }

    fn domain_event(
        &self,
        network_id: &str,
        resource: ResourceType,
        event: EventType,
        address: &str,
        tx: &Transaction,
    ) {
        self.send(FeedEvent::Domain {
            network_id: network_id.to_string(),
            resource,
            event,
            address: address.to_string(),
            tx: tx.clone(),
        });
    }
}
