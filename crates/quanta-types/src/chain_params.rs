use crate::error::TypesError;

/// Smallest units per whole coin.
pub const UNITS_PER_COIN: u64 = 1_000_000_000;

/// Protocol parameters shared by every node on a network.
///
/// Nodes replaying the same chain must run with identical values; the
/// node crate loads overrides from the `[chain]` config section.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChainParams {
    pub network_id: String,

    // Epochs & staking
    pub blocks_per_epoch: u64,          // 100
    pub min_stake: u64,                 // 10_000 coins
    pub max_stakers: usize,             // 64

    // Emission
    pub total_supply: u64,              // 105_000_000 coins
    pub initial_block_reward: u64,      // 40 coins
    pub halving_interval: u64,          // 1_051_200 blocks

    // Fork choice
    pub confirmation_depth: u64,        // 0: an equal-height heavier fork wins
    pub retention_depth: u64,           // 10 blocks
    pub pending_timeout_secs: u64,      // 120

    // Limits & stats
    pub max_block_transactions: usize,  // 1_000
    pub block_time_window: usize,       // 100 blocks
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainParams {
    /// Mainnet parameters
    pub fn mainnet() -> Self {
        Self {
            network_id: "quanta-mainnet".to_string(),
            blocks_per_epoch: 100,
            min_stake: 10_000 * UNITS_PER_COIN,
            max_stakers: 64,
            total_supply: 105_000_000 * UNITS_PER_COIN,
            initial_block_reward: 40 * UNITS_PER_COIN,
            halving_interval: 1_051_200,
            confirmation_depth: 0,
            retention_depth: 10,
            pending_timeout_secs: 120,
            max_block_transactions: 1_000,
            block_time_window: 100,
        }
    }

    /// Small numbers for local networks and tests.
    pub fn devnet() -> Self {
        Self {
            network_id: "quanta-devnet".to_string(),
            blocks_per_epoch: 4,
            min_stake: 100,
            max_stakers: 16,
            total_supply: 105_000_000,
            initial_block_reward: 50,
            halving_interval: 1_000,
            confirmation_depth: 0,
            retention_depth: 3,
            pending_timeout_secs: 30,
            max_block_transactions: 100,
            block_time_window: 20,
        }
    }

    /// Epoch a height belongs to.
    pub fn epoch_of(&self, height: u64) -> u64 {
        height / self.blocks_per_epoch.max(1)
    }

    /// First height of an epoch.
    pub fn is_epoch_boundary(&self, height: u64) -> bool {
        height % self.blocks_per_epoch.max(1) == 0
    }

    pub fn validate(&self) -> Result<(), TypesError> {
        if self.network_id.is_empty() {
            return Err(TypesError::InvalidChainParams("network_id is empty".into()));
        }
        if self.blocks_per_epoch == 0 {
            return Err(TypesError::InvalidChainParams("blocks_per_epoch must be > 0".into()));
        }
        if self.max_stakers == 0 {
            return Err(TypesError::InvalidChainParams("max_stakers must be > 0".into()));
        }
        if self.halving_interval == 0 {
            return Err(TypesError::InvalidChainParams("halving_interval must be > 0".into()));
        }
        if self.initial_block_reward > self.total_supply {
            return Err(TypesError::InvalidChainParams(
                "initial_block_reward exceeds total_supply".into(),
            ));
        }
        if self.max_block_transactions == 0 {
            return Err(TypesError::InvalidChainParams(
                "max_block_transactions must be > 0".into(),
            ));
        }
        Ok(())
    }
}
