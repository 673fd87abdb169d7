use crate::address::Address;
use crate::block::Block;
use crate::chain_params::ChainParams;
use crate::error::TypesError;
use std::collections::HashSet;

/// Genesis configuration: the state block 0 establishes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenesisConfig {
    /// Genesis timestamp
    pub timestamp: u64,
    /// Pre-funded addresses
    #[cfg_attr(feature = "serde", serde(default))]
    pub balances: Vec<GenesisAlloc>,
    /// Stake validators active from epoch 0
    #[cfg_attr(feature = "serde", serde(default))]
    pub stakers: Vec<GenesisStaker>,
}

/// Genesis balance entry
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenesisAlloc {
    pub address: Address,
    pub balance: u64,
}

/// Genesis stake validator entry. The stake is minted, not taken from a balance.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenesisStaker {
    pub address: Address,
    pub amount: u64,
}

impl GenesisConfig {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            balances: Vec::new(),
            stakers: Vec::new(),
        }
    }

    /// Add a balance allocation
    pub fn add_balance(&mut self, address: Address, balance: u64) {
        self.balances.push(GenesisAlloc { address, balance });
    }

    /// Add a genesis staker
    pub fn add_staker(&mut self, address: Address, amount: u64) {
        self.stakers.push(GenesisStaker { address, amount });
    }

    /// Coins minted at genesis (balances plus stake), `None` on overflow.
    pub fn total_allocated(&self) -> Option<u64> {
        let balances = self
            .balances
            .iter()
            .try_fold(0u64, |acc, a| acc.checked_add(a.balance))?;
        self.stakers
            .iter()
            .try_fold(balances, |acc, s| acc.checked_add(s.amount))
    }

    /// The genesis block implied by this configuration.
    pub fn block(&self) -> Block {
        Block::genesis(self.timestamp)
    }

    pub fn validate(&self, params: &ChainParams) -> Result<(), TypesError> {
        let total = self
            .total_allocated()
            .ok_or_else(|| TypesError::InvalidGenesis("allocation overflows u64".into()))?;
        if total > params.total_supply {
            return Err(TypesError::InvalidGenesis(format!(
                "allocates {} of a {} total supply",
                total, params.total_supply
            )));
        }

        let mut seen = HashSet::new();
        for alloc in &self.balances {
            if !seen.insert(alloc.address) {
                return Err(TypesError::InvalidGenesis(format!(
                    "duplicate balance for {}",
                    alloc.address
                )));
            }
        }

        let mut stakers = HashSet::new();
        for staker in &self.stakers {
            if staker.amount < params.min_stake {
                return Err(TypesError::InvalidGenesis(format!(
                    "staker {} below minimum stake",
                    staker.address
                )));
            }
            if !stakers.insert(staker.address) {
                return Err(TypesError::InvalidGenesis(format!(
                    "duplicate staker {}",
                    staker.address
                )));
            }
        }
        Ok(())
    }
}
