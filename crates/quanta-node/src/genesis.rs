//! Genesis loading.

use quanta_crypto::Keypair;
use quanta_types::{ChainParams, GenesisConfig};
use std::path::Path;
use tracing::{info, warn};

/// Fixed so that restarts of a development node agree on block 0.
pub const DEV_GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Read a JSON genesis file and check it against `params`.
pub fn load_genesis_file(path: &Path, params: &ChainParams) -> anyhow::Result<GenesisConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read genesis file '{}': {}", path.display(), e))?;
    let genesis: GenesisConfig = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse genesis file '{}': {}", path.display(), e))?;
    genesis
        .validate(params)
        .map_err(|e| anyhow::anyhow!("Invalid genesis '{}': {}", path.display(), e))?;

    info!(
        path = %path.display(),
        balances = genesis.balances.len(),
        stakers = genesis.stakers.len(),
        "Loaded genesis"
    );
    Ok(genesis)
}

/// Development genesis: the local producer, if any, stakes the minimum
/// and holds the same amount again as spendable balance.
pub fn dev_genesis(params: &ChainParams, producer: Option<&Keypair>) -> GenesisConfig {
    let mut genesis = GenesisConfig::new(DEV_GENESIS_TIMESTAMP);
    match producer {
        Some(key) => {
            genesis.add_staker(key.address(), params.min_stake);
            genesis.add_balance(key.address(), params.min_stake);
        }
        None => warn!("Development genesis has no stakers; no block can be produced"),
    }
    genesis
}

pub fn resolve_genesis(
    file: Option<&Path>,
    params: &ChainParams,
    producer: Option<&Keypair>,
) -> anyhow::Result<GenesisConfig> {
    match file {
        Some(path) => load_genesis_file(path, params),
        None => {
            let genesis = dev_genesis(params, producer);
            genesis.validate(params)?;
            Ok(genesis)
        }
    }
}
