//! Coin emission schedule.
//!
//! Block `h >= 1` emits `initial_block_reward >> ((h - 1) / halving_interval)`
//! until the emission cap (`total_supply` minus the genesis allocation) is
//! reached. Genesis emits nothing. Emitted totals are derived, never stored.

use quanta_types::ChainParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmissionSchedule {
    initial_reward: u64,
    halving_interval: u64,
    total_supply: u64,
    cap: u64,
}

impl EmissionSchedule {
    pub fn new(params: &ChainParams, genesis_supply: u64) -> Self {
        Self {
            initial_reward: params.initial_block_reward,
            halving_interval: params.halving_interval.max(1),
            total_supply: params.total_supply,
            cap: params.total_supply.saturating_sub(genesis_supply),
        }
    }

    /// Protocol supply constant.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Coins the schedule may ever emit after genesis.
    pub fn emission_cap(&self) -> u64 {
        self.cap
    }

    /// Coins emitted by blocks `1..=height`.
    pub fn coins_emitted(&self, height: u64) -> u64 {
        let mut emitted: u128 = 0;
        let mut era: u32 = 0;
        let mut remaining = height;
        while remaining > 0 && era < 64 {
            let reward = self.initial_reward >> era;
            if reward == 0 {
                break;
            }
            let blocks = remaining.min(self.halving_interval);
            emitted += blocks as u128 * reward as u128;
            if emitted >= self.cap as u128 {
                return self.cap;
            }
            remaining -= blocks;
            era += 1;
        }
        emitted as u64
    }

    /// Genesis allocation plus everything emitted up to `height`.
    pub fn circulating_supply(&self, height: u64) -> u64 {
        (self.total_supply - self.cap).saturating_add(self.coins_emitted(height))
    }

    /// Reward the header at `height` must claim.
    pub fn block_reward(&self, height: u64) -> u64 {
        if height == 0 {
            return 0;
        }
        self.coins_emitted(height) - self.coins_emitted(height - 1)
    }
}
