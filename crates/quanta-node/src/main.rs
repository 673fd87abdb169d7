//! Quanta Node - stake-weighted ledger full node.
//!
//! Wires configuration, storage, genesis and the chain core together and
//! keeps the node running until interrupted.

mod api;
mod config;
mod genesis;
mod telemetry;

use api::PublicApiService;
use clap::Parser;
use config::{NodeConfig, StorageEngine};
use quanta_core::{NodeContext, OfflineNetwork, StaticPeers};
use quanta_crypto::Keypair;
use quanta_storage::{MemoryStore, PersistentStore, RocksStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Command-line arguments. Flags override the config file.
#[derive(Parser, Debug)]
#[command(name = "quanta-node")]
#[command(about = "Quanta Node - stake-weighted ledger full node")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Config file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start from the development preset instead of mainnet defaults
    #[arg(long)]
    devnet: bool,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Keep all state in memory
    #[arg(long)]
    memory: bool,

    /// Genesis file (JSON)
    #[arg(long, value_name = "FILE")]
    genesis: Option<PathBuf>,

    /// Static peers (comma-separated, e.g. "127.0.0.1:19000,10.0.0.1:19000")
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Produce blocks with the producer key
    #[arg(long)]
    produce: bool,

    /// Hex-encoded 32-byte producer key seed
    #[arg(long, env = "QUANTA_PRODUCER_KEY", hide_env_values = true)]
    producer_key: Option<String>,

    /// Seconds between block production attempts
    #[arg(long)]
    block_interval: Option<u64>,

    /// Log level or filter directive
    #[arg(short, long)]
    log_level: Option<String>,

    /// JSON log output
    #[arg(long)]
    log_json: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Seconds between chain statistics log lines (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    /// Serve JSON API requests from stdin, one per line
    #[arg(long)]
    api_stdin: bool,

    /// Write the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None if self.devnet => NodeConfig::devnet(),
            None => NodeConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut NodeConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.memory {
            config.storage.engine = StorageEngine::Memory;
        }
        if let Some(genesis) = &self.genesis {
            config.genesis_file = Some(genesis.clone());
        }
        let peers: Vec<String> = self
            .peers
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !peers.is_empty() {
            config.network.static_peers = peers;
        }
        if self.produce {
            config.producer.enabled = true;
        }
        if let Some(key) = &self.producer_key {
            config.producer.key_seed = Some(key.clone());
        }
        if let Some(interval) = self.block_interval {
            config.producer.block_interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    if let Some(path) = &args.write_config {
        config.validate()?;
        config.to_file(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    telemetry::init_telemetry(&config.logging)?;

    print_banner();

    match &args.config {
        Some(path) => info!("Loaded configuration from: {:?}", path),
        None => info!("Using built-in configuration"),
    }
    config.validate()?;

    let params = config.chain_params();
    info!("Configuration:");
    info!("  Name: {}", config.name);
    info!("  Network: {}", params.network_id);
    info!("  Data dir: {:?}", config.data_dir);
    info!("  Storage: {:?}", config.storage.engine);
    info!("  Static peers: {}", config.network.static_peers.len());
    info!("  Producer: {}", config.producer.enabled);

    let producer = config.producer_key()?;
    let node = Arc::new(build_node(&config, producer.as_ref())?);
    let api = PublicApiService::new(node.clone());

    if let Some(key) = producer {
        info!(
            address = %key.address(),
            public_key = %hex::encode(key.public_key().as_bytes()),
            "Block production enabled"
        );
        let interval = Duration::from_secs(config.producer.block_interval_secs);
        tokio::spawn(run_producer(node.clone(), key, interval));
    }

    if args.stats_interval > 0 {
        tokio::spawn(log_stats(api.clone(), Duration::from_secs(args.stats_interval)));
    }

    if args.api_stdin {
        let api = api.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_stdin(api).await {
                error!("API reader stopped: {}", e);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!(height = node.get_height(), "Shutting down");
    Ok(())
}

/// Open storage, resolve genesis and start the node context.
fn build_node(config: &NodeConfig, producer: Option<&Keypair>) -> anyhow::Result<NodeContext> {
    let params = config.chain_params();
    let genesis = genesis::resolve_genesis(config.genesis_file.as_deref(), &params, producer)?;

    let store: Arc<dyn PersistentStore> = match config.storage.engine {
        StorageEngine::Memory => Arc::new(MemoryStore::new()),
        StorageEngine::RocksDb => {
            let path = config.data_dir.join("chain");
            std::fs::create_dir_all(&path)?;
            Arc::new(RocksStore::open_with(&path, &config.storage.rocks_config())?)
        }
    };

    let peers = StaticPeers::new(config.static_peers()?);
    let node = NodeContext::new(
        store,
        params,
        &genesis,
        Arc::new(peers),
        Arc::new(OfflineNetwork::default()),
    )?
    .with_pool_config(config.pool_config());
    Ok(node)
}

async fn run_producer(node: Arc<NodeContext>, key: Keypair, interval: Duration) {
    let address = key.address();
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if node.is_halted() {
            error!("Chain halted, block production stopped");
            return;
        }
        if !node.is_eligible(&address) {
            debug!(%address, "Not eligible for the next block");
            continue;
        }

        match node.produce_block(&key, unix_now()) {
            Ok((block, outcome)) => info!(
                height = block.height(),
                hash = %block.hash().short(),
                txs = block.tx_count(),
                ?outcome,
                "Produced block"
            ),
            Err(e) if e.is_fatal() => {
                error!("Block production failed: {}", e);
                return;
            }
            Err(e) => warn!("Block production skipped: {}", e),
        }
    }
}

async fn log_stats(api: PublicApiService, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match api.get_stats() {
            Ok(stats) => info!(
                height = stats.node_info.block_height,
                epoch = stats.epoch,
                stakers = stats.stakers_count,
                emitted = stats.coins_emitted,
                at_stake = stats.coins_atstake,
                block_time = stats.block_time_mean,
                state = %stats.node_info.state,
                "Chain stats"
            ),
            Err(e) => warn!("Failed to collect stats: {}", e),
        }
    }
}

async fn serve_stdin(api: PublicApiService) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = api.handle_json(&line);
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Print startup banner.
fn print_banner() {
    println!();
    println!(r#"   ____                   _        "#);
    println!(r#"  / __ \                 | |       "#);
    println!(r#" | |  | |_   _  __ _ _ __| |_ __ _ "#);
    println!(r#" | |  | | | | |/ _` | '_ \ __/ _` |"#);
    println!(r#" | |__| | |_| | (_| | | | | || (_| |"#);
    println!(r#"  \___\_\\__,_|\__,_|_| |_|\__\__,_|"#);
    println!();
    println!("        Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}
