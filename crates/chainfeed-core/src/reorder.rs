//! Reorder buffer. Restores ascending-height order from out-of-order
//! block completions.
//!
//! Concurrent fetches can finish in any order. The buffer holds up to
//! `capacity` pending entries; once a push takes it past capacity, the
//! lowest-height entry is released. With the default capacity of 2 a block
//! is published after the two blocks following it have arrived.

use crate::types::Block;

/// Default number of entries held back before release.
pub const DEFAULT_REORDER_CAPACITY: usize = 2;

/// Anything with a position in the chain.
pub trait Sequenced {
    fn sequence(&self) -> u64;
}

impl Sequenced for Block {
    fn sequence(&self) -> u64 {
        self.height
    }
}

impl Sequenced for u64 {
    fn sequence(&self) -> u64 {
        *self
    }
}

/// Fixed-capacity ordering stage.
///
/// No deduplication is performed; callers must not push the same height
/// twice. Entries still buffered at shutdown are dropped.
#[derive(Debug, Clone)]
pub struct ReorderBuffer<T> {
    pending: Vec<T>,
    capacity: usize,
}

impl<T: Sequenced> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REORDER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert `item`. Returns the lowest-height entry when the buffer now
    /// holds more than `capacity` entries.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.pending.push(item);
        if self.pending.len() > self.capacity {
            self.pending.sort_by_key(Sequenced::sequence);
            return Some(self.pending.remove(0));
        }
        None
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Heights currently held back, in insertion order.
    pub fn pending_heights(&self) -> Vec<u64> {
        self.pending.iter().map(Sequenced::sequence).collect()
    }
}

impl<T: Sequenced> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
