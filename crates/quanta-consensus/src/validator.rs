//! Stake validator records.
//!
//! Tracks a single registration from activation to termination.

use borsh::{BorshDeserialize, BorshSerialize};
use quanta_types::Address;

/// Validator lifecycle states, relative to an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorStatus {
    /// Registered, activation epoch not reached yet
    Pending,
    /// Inside `[activation, termination)`
    Active,
    /// Deactivated; still active until the termination epoch
    Terminating,
    /// Termination epoch reached; stake is refundable
    Terminated,
}

impl ValidatorStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ValidatorStatus::Active | ValidatorStatus::Terminating)
    }
}

/// Stake record of a block producer.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StakeValidator {
    /// Validator address
    pub address: Address,
    /// Coins locked out of the address balance
    pub balance_at_stake: u64,
    /// First epoch the validator may produce in
    pub activation_epoch: u64,
    /// First epoch the validator may no longer produce in
    pub termination_epoch: Option<u64>,
}

impl StakeValidator {
    pub fn new(address: Address, balance_at_stake: u64, activation_epoch: u64) -> Self {
        Self {
            address,
            balance_at_stake,
            activation_epoch,
            termination_epoch: None,
        }
    }

    /// Status as of `epoch`.
    pub fn status(&self, epoch: u64) -> ValidatorStatus {
        match self.termination_epoch {
            Some(t) if epoch >= t => ValidatorStatus::Terminated,
            _ if epoch < self.activation_epoch => ValidatorStatus::Pending,
            Some(_) => ValidatorStatus::Terminating,
            None => ValidatorStatus::Active,
        }
    }

    /// Whether `epoch` falls in `[activation, termination)`.
    pub fn is_active_at(&self, epoch: u64) -> bool {
        epoch >= self.activation_epoch && self.termination_epoch.map_or(true, |t| epoch < t)
    }

    pub fn is_terminating(&self) -> bool {
        self.termination_epoch.is_some()
    }

    /// Set the termination epoch.
    pub fn terminate_at(&mut self, epoch: u64) {
        self.termination_epoch = Some(epoch);
    }
}
