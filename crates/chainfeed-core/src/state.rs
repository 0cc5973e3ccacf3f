//! Per-network ingestion state.
//!
//! Owned by exactly one engine. Never persisted as a resumable checkpoint: a
//! restart starts from whatever head is observed first.

use tokio::time::Instant;

use crate::reorder::ReorderBuffer;
use crate::types::{Block, ValidatorSet};

/// Mutable state of a single network's ingestion run.
#[derive(Debug)]
pub struct IngestionState {
    pub network_id: String,
    /// Highest height dispatched for processing. `None` before the first head.
    pub last_observed_height: Option<u64>,
    /// Session index of the most recent validator refresh.
    pub current_session_index: Option<u64>,
    /// Most recently determined era.
    pub current_era: Option<u32>,
    /// Validator set of `current_session_index`, once fetched.
    pub validator_set: Option<ValidatorSet>,
    pub reorder: ReorderBuffer<Block>,
    pub connection_opened_at: Option<Instant>,
}

impl IngestionState {
    pub fn new(network_id: impl Into<String>, reorder_capacity: usize) -> Self {
        Self {
            network_id: network_id.into(),
            last_observed_height: None,
            current_session_index: None,
            current_era: None,
            validator_set: None,
            reorder: ReorderBuffer::with_capacity(reorder_capacity),
            connection_opened_at: None,
        }
    }

    /// Record a pushed head. Returns `true` if `height` is new and should be
    /// dispatched.
    pub fn observe_head(&mut self, height: u64) -> bool {
        match self.last_observed_height {
            Some(last) if height <= last => false,
            _ => {
                self.last_observed_height = Some(height);
                true
            }
        }
    }

    /// Advance by one towards `remote_head` (poll mode). On the very first
    /// observation jumps straight to the head. Returns the height to process,
    /// or `None` once caught up.
    pub fn next_poll_height(&mut self, remote_head: u64) -> Option<u64> {
        let next = match self.last_observed_height {
            None => remote_head,
            Some(last) if remote_head > last => last + 1,
            Some(_) => return None,
        };
        self.last_observed_height = Some(next);
        Some(next)
    }

    /// Claim a session transition. Returns the previous index when
    /// `session_index` is newer than the current one (or is the first seen);
    /// the caller then owns the validator refresh for that session.
    pub fn claim_session(&mut self, session_index: u64) -> Option<Option<u64>> {
        match self.current_session_index {
            Some(current) if session_index <= current => None,
            previous => {
                self.current_session_index = Some(session_index);
                Some(previous)
            }
        }
    }

    /// Undo a claimed session transition whose refresh failed, unless a newer
    /// session has been claimed in the meantime.
    pub fn release_session(&mut self, session_index: u64, previous: Option<u64>) {
        if self.current_session_index == Some(session_index) {
            self.current_session_index = previous;
        }
    }

    /// Store a freshly fetched validator set unless a newer one is present.
    pub fn install_validators(&mut self, set: ValidatorSet) {
        let newer = self
            .validator_set
            .as_ref()
            .map_or(true, |current| set.session_index >= current.session_index);
        if newer {
            self.validator_set = Some(set);
        }
    }

    /// Record an era reading. Returns `true` on the first determination or
    /// when `era` is strictly greater than the current one.
    pub fn observe_era(&mut self, era: u32) -> bool {
        match self.current_era {
            Some(current) if era <= current => false,
            _ => {
                self.current_era = Some(era);
                true
            }
        }
    }
}
