//! Speculative state over the committed store.
//!
//! Blocks are validated against an overlay: reads fall through to the
//! committed address store, writes stay in memory until the overlay is
//! staged into a batch. Dropping an overlay discards its changes.

use crate::error::ChainError;
use quanta_consensus::StakeValidatorsTracker;
use quanta_storage::{AddressStateStore, WriteBatch};
use quanta_types::{Address, AddressState};
use std::collections::HashMap;

pub struct StateOverlay<'a> {
    base: &'a AddressStateStore,
    /// `None` marks an address that must not exist after commit.
    changes: HashMap<Address, Option<AddressState>>,
    tracker: StakeValidatorsTracker,
}

impl<'a> StateOverlay<'a> {
    pub fn new(base: &'a AddressStateStore, tracker: StakeValidatorsTracker) -> Self {
        Self {
            base,
            changes: HashMap::new(),
            tracker,
        }
    }

    /// Current state; the zero state for unknown addresses.
    pub fn get(&self, address: &Address) -> Result<AddressState, ChainError> {
        Ok(self.find(address)?.unwrap_or_default())
    }

    /// Current state, `None` if the address does not exist.
    pub fn find(&self, address: &Address) -> Result<Option<AddressState>, ChainError> {
        match self.changes.get(address) {
            Some(change) => Ok(change.clone()),
            None => Ok(self.base.find(address)?),
        }
    }

    pub fn put(&mut self, address: Address, state: AddressState) {
        self.changes.insert(address, Some(state));
    }

    /// Restore a prior state recorded in an undo entry.
    pub fn restore(&mut self, address: Address, prior: Option<AddressState>) {
        self.changes.insert(address, prior);
    }

    pub fn tracker(&self) -> &StakeValidatorsTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut StakeValidatorsTracker {
        &mut self.tracker
    }

    pub fn set_tracker(&mut self, tracker: StakeValidatorsTracker) {
        self.tracker = tracker;
    }

    /// Number of addresses changed so far.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Stage every change into `batch`; returns the resulting tracker.
    pub fn stage(self, batch: &mut WriteBatch) -> Result<StakeValidatorsTracker, ChainError> {
        let mut changes: Vec<_> = self.changes.into_iter().collect();
        // Deterministic batch order
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        for (address, change) in changes {
            match change {
                Some(state) => self.base.stage(batch, &address, &state)?,
                None => self.base.stage_delete(batch, &address),
            }
        }
        Ok(self.tracker)
    }
}
