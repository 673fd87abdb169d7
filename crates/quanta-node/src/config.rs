//! Node configuration.
//!
//! Handles loading and validation of node configuration from
//! config files and command-line arguments.

use quanta_core::{PeerInfo, PoolConfig};
use quanta_crypto::Keypair;
use quanta_storage::RocksConfig;
use quanta_types::ChainParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name
    pub name: String,
    /// Data directory
    pub data_dir: PathBuf,
    /// Genesis allocation file (JSON); a development genesis is used if unset
    pub genesis_file: Option<PathBuf>,
    /// Protocol parameters
    pub chain: ChainParams,
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub pool: PoolSection,
    pub producer: ProducerConfig,
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "quanta-node".to_string(),
            data_dir: PathBuf::from("./data"),
            genesis_file: None,
            chain: ChainParams::mainnet(),
            storage: StorageConfig::default(),
            network: NetworkConfig::default(),
            pool: PoolSection::default(),
            producer: ProducerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Local development preset: devnet parameters, in-memory storage.
    pub fn devnet() -> Self {
        Self {
            name: "quanta-devnet".to_string(),
            chain: ChainParams::devnet(),
            storage: StorageConfig {
                engine: StorageEngine::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from file.
    /// Path is validated to prevent directory traversal attacks.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: NodeConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Chain parameters with the network section applied.
    pub fn chain_params(&self) -> ChainParams {
        let mut params = self.chain.clone();
        if let Some(network_id) = &self.network.network_id {
            params.network_id = network_id.clone();
        }
        params
    }

    pub fn static_peers(&self) -> anyhow::Result<Vec<PeerInfo>> {
        self.network
            .static_peers
            .iter()
            .map(|s| s.parse::<PeerInfo>().map_err(anyhow::Error::msg))
            .collect()
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.pool.max_size,
            max_per_account: self.pool.max_per_account,
        }
    }

    /// Producer key, if block production is enabled.
    pub fn producer_key(&self) -> anyhow::Result<Option<Keypair>> {
        if !self.producer.enabled {
            return Ok(None);
        }
        let seed = self
            .producer
            .key_seed
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("producer.key_seed is required when producing blocks"))?;
        Ok(Some(Keypair::from_hex(seed)?))
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Node name cannot be empty");
        }
        self.chain_params()
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid [chain] section: {}", e))?;
        self.static_peers()?;

        if self.storage.engine == StorageEngine::RocksDb && self.storage.cache_size_mb == 0 {
            anyhow::bail!("Storage cache size must be greater than 0");
        }
        if self.pool.max_size == 0 || self.pool.max_per_account == 0 {
            anyhow::bail!("Pool limits must be greater than 0");
        }
        if self.producer.enabled && self.producer.block_interval_secs == 0 {
            anyhow::bail!("Block interval cannot be 0");
        }
        self.producer_key()?;
        Ok(())
    }
}

/// Storage engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    /// Lost on exit
    Memory,
    /// RocksDB under `data_dir/chain`
    RocksDb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub engine: StorageEngine,
    /// RocksDB block cache in MB
    pub cache_size_mb: usize,
    pub max_open_files: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let rocks = RocksConfig::default();
        Self {
            engine: StorageEngine::RocksDb,
            cache_size_mb: rocks.cache_size_mb,
            max_open_files: rocks.max_open_files,
        }
    }
}

impl StorageConfig {
    pub fn rocks_config(&self) -> RocksConfig {
        RocksConfig {
            cache_size_mb: self.cache_size_mb,
            max_open_files: self.max_open_files,
            ..RocksConfig::default()
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Overrides `chain.network_id`
    pub network_id: Option<String>,
    /// Known peers as `ip:port`
    pub static_peers: Vec<String>,
}

/// Transaction pool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub max_size: usize,
    pub max_per_account: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            max_size: defaults.max_size,
            max_per_account: defaults.max_per_account,
        }
    }
}

/// Local block production.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub enabled: bool,
    /// Hex-encoded 32-byte key seed
    pub key_seed: Option<String>,
    pub block_interval_secs: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_seed: None,
            block_interval_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `quanta_core=debug`
    pub level: String,
    /// JSON output instead of the pretty format
    pub json: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}
