//! Stake validator tracker.
//!
//! Owned by the chain writer. A clone is taken before every block so the
//! block's undo record can restore it exactly.

use crate::error::ConsensusError;
use crate::validator::StakeValidator;
use borsh::{BorshDeserialize, BorshSerialize};
use quanta_types::{Address, ChainParams};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StakeValidatorsTracker {
    blocks_per_epoch: u64,
    min_stake: u64,
    max_stakers: u64,
    current_epoch: u64,
    validators: BTreeMap<Address, StakeValidator>,
    /// Eligible producers for `current_epoch`
    eligible: BTreeSet<Address>,
}

impl StakeValidatorsTracker {
    pub fn new(params: &ChainParams) -> Self {
        Self {
            blocks_per_epoch: params.blocks_per_epoch.max(1),
            min_stake: params.min_stake,
            max_stakers: params.max_stakers as u64,
            current_epoch: 0,
            validators: BTreeMap::new(),
            eligible: BTreeSet::new(),
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn epoch_of(&self, height: u64) -> u64 {
        height / self.blocks_per_epoch
    }

    pub fn get(&self, address: &Address) -> Option<&StakeValidator> {
        self.validators.get(address)
    }

    pub fn validators(&self) -> impl Iterator<Item = &StakeValidator> {
        self.validators.values()
    }

    /// Register a validator active from `activation_epoch`.
    ///
    /// Activation must lie after the current epoch: the eligible set never
    /// changes inside an epoch.
    pub fn register(
        &mut self,
        address: Address,
        amount: u64,
        activation_epoch: u64,
    ) -> Result<(), ConsensusError> {
        if activation_epoch <= self.current_epoch {
            return Err(ConsensusError::InvalidActivationEpoch {
                activation: activation_epoch,
                current: self.current_epoch,
            });
        }
        self.insert(address, amount, activation_epoch)
    }

    /// Register a genesis validator, active from epoch 0.
    pub fn register_genesis(&mut self, address: Address, amount: u64) -> Result<(), ConsensusError> {
        self.insert(address, amount, 0)?;
        self.eligible = self.compute_eligible(self.current_epoch);
        Ok(())
    }

    fn insert(&mut self, address: Address, amount: u64, activation_epoch: u64) -> Result<(), ConsensusError> {
        if amount < self.min_stake {
            return Err(ConsensusError::InsufficientStake {
                amount,
                minimum: self.min_stake,
            });
        }
        if self.validators.contains_key(&address) {
            return Err(ConsensusError::ValidatorAlreadyExists(address.to_string()));
        }
        self.coins_at_stake()
            .checked_add(amount)
            .ok_or(ConsensusError::StakeOverflow)?;

        self.validators
            .insert(address, StakeValidator::new(address, amount, activation_epoch));
        tracing::debug!(%address, amount, activation_epoch, "Stake validator registered");
        Ok(())
    }

    /// Terminate a validator at the next epoch boundary.
    pub fn deactivate(&mut self, address: &Address) -> Result<u64, ConsensusError> {
        let termination = self.current_epoch + 1;
        let validator = self
            .validators
            .get_mut(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.to_string()))?;
        if validator.is_terminating() {
            return Err(ConsensusError::AlreadyTerminating(address.to_string()));
        }
        validator.terminate_at(termination);
        tracing::debug!(%address, termination, "Stake validator deactivated");
        Ok(termination)
    }

    /// Whether `address` may produce the block at `height`.
    ///
    /// Depends only on the validator set and the height: the cached set
    /// serves the current epoch, later epochs are recomputed.
    pub fn is_eligible(&self, address: &Address, height: u64) -> bool {
        let epoch = self.epoch_of(height);
        if epoch == self.current_epoch {
            self.eligible.contains(address)
        } else {
            self.compute_eligible(epoch).contains(address)
        }
    }

    /// Fork-choice weight of a block produced by `address` at `height`.
    pub fn stake_priority(&self, address: &Address, height: u64) -> u64 {
        if self.is_eligible(address, height) {
            self.validators
                .get(address)
                .map_or(0, |v| v.balance_at_stake)
        } else {
            0
        }
    }

    /// Eligible producers for an epoch, in address order.
    pub fn eligible_at(&self, epoch: u64) -> Vec<Address> {
        if epoch == self.current_epoch {
            self.eligible.iter().copied().collect()
        } else {
            self.compute_eligible(epoch).into_iter().collect()
        }
    }

    /// Move to `epoch`: drop terminated validators and recompute the
    /// eligible set. Returns the stake to credit back to each address.
    pub fn advance_epoch(&mut self, epoch: u64) -> Result<Vec<(Address, u64)>, ConsensusError> {
        if epoch <= self.current_epoch {
            return Err(ConsensusError::InvalidEpoch {
                current: self.current_epoch,
                actual: epoch,
            });
        }

        let terminated: Vec<Address> = self
            .validators
            .values()
            .filter(|v| v.termination_epoch.map_or(false, |t| t <= epoch))
            .map(|v| v.address)
            .collect();
        let refunds: Vec<(Address, u64)> = terminated
            .iter()
            .filter_map(|address| self.validators.remove(address))
            .map(|v| (v.address, v.balance_at_stake))
            .collect();

        self.current_epoch = epoch;
        self.eligible = self.compute_eligible(epoch);

        tracing::info!(
            epoch,
            eligible = self.eligible.len(),
            refunded = refunds.len(),
            "Epoch transition"
        );
        Ok(refunds)
    }

    /// Top `max_stakers` active validators by stake; address breaks ties.
    fn compute_eligible(&self, epoch: u64) -> BTreeSet<Address> {
        let mut candidates: Vec<&StakeValidator> = self
            .validators
            .values()
            .filter(|v| v.is_active_at(epoch))
            .collect();
        candidates.sort_by(|a, b| {
            b.balance_at_stake
                .cmp(&a.balance_at_stake)
                .then_with(|| a.address.cmp(&b.address))
        });
        candidates
            .into_iter()
            .take(self.max_stakers as usize)
            .map(|v| v.address)
            .collect()
    }

    /// Number of registered validators, including pending and terminating.
    pub fn stakers_count(&self) -> usize {
        self.validators.len()
    }

    /// Coins locked across every registration.
    pub fn coins_at_stake(&self) -> u64 {
        self.validators
            .values()
            .fold(0u64, |acc, v| acc.saturating_add(v.balance_at_stake))
    }
}
