//! Node context: the query and ingestion surfaces over the chain.
//!
//! One writer, many readers. Block ingestion and production serialize on
//! the chain mutex; queries read the store and the published [`ChainView`]
//! and never take it.

use crate::buffered_chain::{AcceptOutcome, BufferedChain, ChainEvent, ChainView};
use crate::emission::EmissionSchedule;
use crate::error::ChainError;
use crate::txpool::{PoolConfig, TransactionPool};
use parking_lot::{Mutex, RwLock};
use quanta_crypto::Keypair;
use quanta_storage::{AddressStateStore, BlockStore, PersistentStore, TxLocation};
use quanta_types::{Address, AddressState, Block, ChainParams, GenesisConfig, Hash, Transaction};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A peer as reported by the peer directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerInfo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("peer '{}' is not ip:port", s))?;
        let port = port
            .parse()
            .map_err(|_| format!("peer '{}' has an invalid port", s))?;
        if ip.is_empty() {
            return Err(format!("peer '{}' has no host", s));
        }
        Ok(Self {
            ip: ip.to_string(),
            port,
        })
    }
}

/// Synchronization state reported by the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    Unknown,
    #[default]
    Unsynced,
    Syncing,
    Synced,
    Forked,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Unknown => "unknown",
            SyncState::Unsynced => "unsynced",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Forked => "forked",
        };
        f.write_str(s)
    }
}

/// Source of peer addresses and connection counts.
pub trait PeerDirectory: Send + Sync {
    fn known_peers(&self) -> Vec<PeerInfo>;
    fn connection_count(&self) -> usize;
}

/// Outbound side of the gossip network.
pub trait NetworkFactory: Send + Sync {
    fn sync_state(&self) -> SyncState;
    fn broadcast_transaction(&self, tx: &Transaction);
    fn broadcast_block(&self, block: &Block);
}

/// Fixed peer list with no live connections.
#[derive(Debug, Clone, Default)]
pub struct StaticPeers {
    peers: Vec<PeerInfo>,
}

impl StaticPeers {
    pub fn new(peers: Vec<PeerInfo>) -> Self {
        Self { peers }
    }
}

impl PeerDirectory for StaticPeers {
    fn known_peers(&self) -> Vec<PeerInfo> {
        self.peers.clone()
    }

    fn connection_count(&self) -> usize {
        0
    }
}

/// Network stand-in for a node without gossip: broadcasts are dropped.
#[derive(Debug, Default)]
pub struct OfflineNetwork {
    state: RwLock<SyncState>,
}

impl OfflineNetwork {
    pub fn new(state: SyncState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn set_sync_state(&self, state: SyncState) {
        *self.state.write() = state;
    }
}

impl NetworkFactory for OfflineNetwork {
    fn sync_state(&self) -> SyncState {
        *self.state.read()
    }

    fn broadcast_transaction(&self, tx: &Transaction) {
        debug!(tx = %tx.txhash().short(), "No network, transaction not broadcast");
    }

    fn broadcast_block(&self, block: &Block) {
        debug!(block = %block.hash().short(), "No network, block not broadcast");
    }
}

/// Block lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Height(u64),
    Hash(Hash),
}

/// Result of a transaction submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(Hash),
    Rejected(ChainError),
}

/// Anything a free-form query can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainObject {
    Address {
        address: Address,
        state: AddressState,
    },
    /// `location` is `None` for a pooled transaction.
    Transaction {
        tx: Transaction,
        location: Option<TxLocation>,
    },
    Block(Block),
}

/// Chain statistics over committed state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub epoch: u64,
    pub stakers_count: usize,
    pub block_last_reward: u64,
    pub block_time_mean: f64,
    pub block_time_sd: f64,
    pub coins_total_supply: u64,
    /// Genesis allocation plus block rewards so far
    pub coins_emitted: u64,
    pub coins_at_stake: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub version: String,
    pub state: SyncState,
    pub num_connections: usize,
    pub num_known_peers: usize,
    pub uptime_secs: u64,
    pub block_height: u64,
    pub network_id: String,
}

pub struct NodeContext {
    chain: Mutex<BufferedChain>,
    pool: Mutex<TransactionPool>,
    view: Arc<RwLock<ChainView>>,
    addresses: AddressStateStore,
    blocks: BlockStore,
    params: ChainParams,
    schedule: EmissionSchedule,
    peers: Arc<dyn PeerDirectory>,
    network: Arc<dyn NetworkFactory>,
    started: Instant,
}

impl NodeContext {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        params: ChainParams,
        genesis: &GenesisConfig,
        peers: Arc<dyn PeerDirectory>,
        network: Arc<dyn NetworkFactory>,
    ) -> Result<Self, ChainError> {
        let chain = BufferedChain::open(store, params.clone(), genesis)?;
        info!(
            network = %params.network_id,
            height = chain.height(),
            peers = peers.known_peers().len(),
            "Node context ready"
        );
        Ok(Self {
            view: chain.view(),
            addresses: chain.address_store().clone(),
            blocks: chain.block_store().clone(),
            schedule: *chain.schedule(),
            chain: Mutex::new(chain),
            pool: Mutex::new(TransactionPool::new(PoolConfig::default())),
            params,
            peers,
            network,
            started: Instant::now(),
        })
    }

    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = Mutex::new(TransactionPool::new(config));
        self
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn view(&self) -> ChainView {
        self.view.read().clone()
    }

    pub fn get_height(&self) -> u64 {
        self.view.read().tip.height
    }

    /// State of an encoded address; unknown addresses yield the zero state.
    pub fn get_address_state(&self, address: &str) -> Result<AddressState, ChainError> {
        let address = Address::from_str(address)
            .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)))?;
        Ok(self.addresses.get(&address)?)
    }

    /// Most recent `window` transaction hashes of an address.
    pub fn get_address_tx_hashes(&self, address: &Address, window: usize) -> Result<Vec<Hash>, ChainError> {
        Ok(self.addresses.get_tx_hashes(address, window)?)
    }

    pub fn get_block(&self, id: BlockId) -> Result<Option<Block>, ChainError> {
        let block = match id {
            BlockId::Height(height) => self.blocks.get_block_by_height(height)?,
            BlockId::Hash(hash) => self.blocks.get_block(&hash)?,
        };
        Ok(block)
    }

    /// Up to `count` finalized blocks, newest first, skipping the `offset`
    /// newest.
    pub fn get_latest_blocks(&self, offset: u64, count: usize) -> Result<Vec<Block>, ChainError> {
        let tip = self.get_height();
        let Some(start) = tip.checked_sub(offset) else {
            return Ok(Vec::new());
        };
        let mut blocks = Vec::with_capacity(count);
        for height in (0..=start).rev().take(count) {
            if let Some(block) = self.blocks.get_block_by_height(height)? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    /// A finalized transaction and where it lives.
    pub fn find_transaction(&self, txhash: &Hash) -> Result<Option<(Transaction, TxLocation)>, ChainError> {
        let Some(location) = self.blocks.get_tx_location(txhash)? else {
            return Ok(None);
        };
        let block = self.blocks.get_block(&location.block_hash)?.ok_or_else(|| {
            ChainError::ChainInconsistency(format!("indexed block {} missing", location.block_hash))
        })?;
        let tx = block
            .transactions
            .get(location.index as usize)
            .filter(|tx| tx.txhash() == *txhash)
            .cloned()
            .ok_or_else(|| {
                ChainError::ChainInconsistency(format!("transaction index stale for {}", txhash))
            })?;
        Ok(Some((tx, location)))
    }

    pub fn find_pending_transaction(&self, txhash: &Hash) -> Option<Transaction> {
        self.pool.lock().get(txhash).cloned()
    }

    /// Resolve a free-form query: address, transaction or block hash, or
    /// block height. `None` when nothing matches.
    pub fn get_object(&self, query: &str) -> Result<Option<ChainObject>, ChainError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Ok(address) = Address::from_str(query) {
            return match self.addresses.get_existing(&address) {
                Ok(state) => Ok(Some(ChainObject::Address { address, state })),
                Err(quanta_storage::StorageError::NotFound(_)) => Ok(None),
                Err(e) => Err(e.into()),
            };
        }

        if let Ok(hash) = Hash::from_str(query) {
            if let Some((tx, location)) = self.find_transaction(&hash)? {
                return Ok(Some(ChainObject::Transaction {
                    tx,
                    location: Some(location),
                }));
            }
            if let Some(tx) = self.find_pending_transaction(&hash) {
                return Ok(Some(ChainObject::Transaction { tx, location: None }));
            }
            return Ok(self.blocks.get_block(&hash)?.map(ChainObject::Block));
        }

        if let Ok(height) = query.parse::<u64>() {
            return Ok(self.blocks.get_block_by_height(height)?.map(ChainObject::Block));
        }
        Ok(None)
    }

    pub fn get_known_peers(&self) -> Vec<PeerInfo> {
        self.peers.known_peers()
    }

    pub fn get_stats(&self) -> Result<ChainStats, ChainError> {
        let view = self.view();
        let height = view.tip.height;
        let (block_time_mean, block_time_sd) = self.block_time_stats(height)?;
        Ok(ChainStats {
            epoch: view.epoch,
            stakers_count: view.tracker.stakers_count(),
            block_last_reward: self.schedule.block_reward(height),
            block_time_mean,
            block_time_sd,
            coins_total_supply: self.schedule.total_supply(),
            coins_emitted: self.schedule.circulating_supply(height),
            coins_at_stake: view.tracker.coins_at_stake(),
        })
    }

    /// Mean and standard deviation of the gaps between the last
    /// `block_time_window` block timestamps.
    fn block_time_stats(&self, height: u64) -> Result<(f64, f64), ChainError> {
        let first = height.saturating_sub(self.params.block_time_window as u64);
        let mut timestamps = Vec::new();
        for h in first..=height {
            if let Some(block) = self.blocks.get_block_by_height(h)? {
                timestamps.push(block.header.timestamp);
            }
        }
        let gaps: Vec<f64> = timestamps
            .windows(2)
            .map(|w| w[1].saturating_sub(w[0]) as f64)
            .collect();
        if gaps.is_empty() {
            return Ok((0.0, 0.0));
        }
        let n = gaps.len() as f64;
        let mean = gaps.iter().sum::<f64>() / n;
        let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;
        Ok((mean, variance.sqrt()))
    }

    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: self.network.sync_state(),
            num_connections: self.peers.connection_count(),
            num_known_peers: self.peers.known_peers().len(),
            uptime_secs: self.started.elapsed().as_secs(),
            block_height: self.get_height(),
            network_id: self.params.network_id.clone(),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.view.read().halted
    }

    pub fn pool_size(&self) -> usize {
        self.pool.lock().len()
    }

    /// Validate a transaction against committed state and pool it.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<SubmitOutcome, ChainError> {
        if self.is_halted() {
            return Err(ChainError::ChainInconsistency("chain halted".into()));
        }
        let sender = self.addresses.get(&tx.addr_from)?;
        let tracker = self.view.read().tracker.clone();
        let result = self.pool.lock().submit(tx.clone(), &sender, &tracker);
        match result {
            Ok(txhash) => {
                self.network.broadcast_transaction(&tx);
                Ok(SubmitOutcome::Accepted(txhash))
            }
            Err(ChainError::Storage(msg)) => Err(ChainError::Storage(msg)),
            Err(e) => {
                debug!(tx = %tx.txhash().short(), reason = %e, "Transaction rejected");
                Ok(SubmitOutcome::Rejected(e))
            }
        }
    }

    /// Offer a block received from a peer.
    pub fn submit_block(&self, block: Block) -> Result<AcceptOutcome, ChainError> {
        let mut chain = self.chain.lock();
        let outcome = chain.accept(block.clone())?;
        let events = chain.take_events();
        self.sync_pool(events)?;
        if matches!(outcome, AcceptOutcome::Finalized | AcceptOutcome::Buffered) {
            self.network.broadcast_block(&block);
        }
        Ok(outcome)
    }

    /// Build a block from the pool with `producer`'s key and offer it.
    pub fn produce_block(&self, producer: &Keypair, timestamp: u64) -> Result<(Block, AcceptOutcome), ChainError> {
        let mut chain = self.chain.lock();
        let candidates = self
            .pool
            .lock()
            .pending(self.params.max_block_transactions.saturating_sub(1));
        let block = chain.build_block(producer, timestamp, &candidates)?;
        let outcome = chain.accept(block.clone())?;
        let events = chain.take_events();
        self.sync_pool(events)?;
        if outcome == AcceptOutcome::Finalized {
            self.network.broadcast_block(&block);
        }
        Ok((block, outcome))
    }

    /// Whether `producer` may produce the next block.
    pub fn is_eligible(&self, producer: &Address) -> bool {
        self.chain.lock().is_eligible(producer)
    }

    /// Evict included transactions, re-offer displaced ones, then drop
    /// whatever no longer applies to the new tip.
    fn sync_pool(&self, events: Vec<ChainEvent>) -> Result<(), ChainError> {
        if events.is_empty() {
            return Ok(());
        }
        let tracker = self.view.read().tracker.clone();
        let mut pool = self.pool.lock();
        let mut displaced = Vec::new();
        for event in events {
            match event {
                ChainEvent::Finalized(block) => {
                    pool.remove_included(&block);
                }
                ChainEvent::Displaced(block) => {
                    displaced.extend(block.transactions.into_iter().filter(|tx| !tx.is_coinbase()));
                }
            }
        }
        for tx in displaced {
            let sender = self.addresses.get(&tx.addr_from)?;
            if let Err(e) = pool.submit(tx, &sender, &tracker) {
                debug!(reason = %e, "Displaced transaction not re-pooled");
            }
        }
        pool.revalidate(&tracker, |address| Ok(self.addresses.get(address)?))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_storage::MemoryStore;

    fn context() -> (NodeContext, Keypair, Keypair) {
        let producer = Keypair::from_seed(&[10u8; 32]);
        let alice = Keypair::from_seed(&[1u8; 32]);
        let mut genesis = GenesisConfig::new(1_000);
        genesis.add_balance(alice.address(), 1_000);
        genesis.add_staker(producer.address(), 500);

        let peers = StaticPeers::new(vec![
            "127.0.0.1:9000".parse().unwrap(),
            "192.168.1.1:9000".parse().unwrap(),
        ]);
        let ctx = NodeContext::new(
            Arc::new(MemoryStore::new()),
            ChainParams::devnet(),
            &genesis,
            Arc::new(peers),
            Arc::new(OfflineNetwork::default()),
        )
        .unwrap();
        (ctx, producer, alice)
    }

    #[test]
    fn test_peer_info_parsing() {
        let peer: PeerInfo = "10.0.0.1:19000".parse().unwrap();
        assert_eq!(peer.ip, "10.0.0.1");
        assert_eq!(peer.port, 19000);
        assert_eq!(peer.to_string(), "10.0.0.1:19000");
        assert!("10.0.0.1".parse::<PeerInfo>().is_err());
        assert!("10.0.0.1:x".parse::<PeerInfo>().is_err());
    }

    #[test]
    fn test_node_info_defaults() {
        let (ctx, _, _) = context();
        let info = ctx.node_info();
        assert_eq!(info.state, SyncState::Unsynced);
        assert_eq!(info.num_connections, 0);
        assert_eq!(info.num_known_peers, 2);
        assert_eq!(info.block_height, 0);
        assert_eq!(info.network_id, "quanta-devnet");
        assert_eq!(ctx.get_known_peers()[1].ip, "192.168.1.1");
    }

    #[test]
    fn test_invalid_address_rejected_before_lookup() {
        let (ctx, _, _) = context();
        assert!(matches!(
            ctx.get_address_state("Qnot-an-address"),
            Err(ChainError::InvalidAddress(_))
        ));
        assert!(matches!(ctx.get_address_state(""), Err(ChainError::InvalidAddress(_))));
    }

    #[test]
    fn test_transaction_lifecycle() {
        let (ctx, producer, alice) = context();
        let bob = Keypair::from_seed(&[2u8; 32]);
        let mut tx = Transaction::transfer(alice.public_key(), bob.address(), 125, 19, 0);
        alice.sign_transaction(&mut tx);
        let txhash = tx.txhash();

        assert_eq!(
            ctx.submit_transaction(tx.clone()).unwrap(),
            SubmitOutcome::Accepted(txhash)
        );
        assert!(ctx.find_transaction(&txhash).unwrap().is_none());
        assert_eq!(ctx.find_pending_transaction(&txhash), Some(tx.clone()));
        assert!(matches!(
            ctx.get_object(&txhash.to_hex()).unwrap(),
            Some(ChainObject::Transaction { location: None, .. })
        ));

        let (block, outcome) = ctx.produce_block(&producer, 1_010).unwrap();
        assert_eq!(outcome, AcceptOutcome::Finalized);
        assert_eq!(ctx.get_height(), 1);
        assert_eq!(ctx.pool_size(), 0);

        let (found, location) = ctx.find_transaction(&txhash).unwrap().unwrap();
        assert_eq!(found, tx);
        assert_eq!(location.block_hash, block.hash());

        let bob_state = ctx.get_address_state(&bob.address().to_string()).unwrap();
        assert_eq!(bob_state.balance, 125);
        assert_eq!(
            ctx.get_address_tx_hashes(&bob.address(), 10).unwrap(),
            vec![txhash]
        );
    }

    #[test]
    fn test_stats_track_emission_and_block_times() {
        let (ctx, producer, _) = context();
        ctx.produce_block(&producer, 1_010).unwrap();
        ctx.produce_block(&producer, 1_030).unwrap();

        let stats = ctx.get_stats().unwrap();
        let reward = ChainParams::devnet().initial_block_reward;
        assert_eq!(stats.stakers_count, 1);
        assert_eq!(stats.coins_at_stake, 500);
        assert_eq!(stats.coins_total_supply, ChainParams::devnet().total_supply);
        assert_eq!(stats.coins_emitted, 1_500 + 2 * reward);
        assert_eq!(stats.block_last_reward, reward);
        assert_eq!(stats.block_time_mean, 15.0);
        assert_eq!(stats.block_time_sd, 5.0);
    }

    #[test]
    fn test_get_object_resolution() {
        let (ctx, producer, alice) = context();
        assert_eq!(ctx.get_object("").unwrap(), None);
        assert_eq!(ctx.get_object("garbage").unwrap(), None);

        let stranger = Keypair::from_seed(&[77u8; 32]).address();
        assert_eq!(ctx.get_object(&stranger.to_string()).unwrap(), None);
        assert!(matches!(
            ctx.get_object(&alice.address().to_string()).unwrap(),
            Some(ChainObject::Address { state, .. }) if state.balance == 1_000
        ));

        let (block, _) = ctx.produce_block(&producer, 1_010).unwrap();
        assert_eq!(ctx.get_object("1").unwrap(), Some(ChainObject::Block(block.clone())));
        assert_eq!(
            ctx.get_object(&block.hash().to_hex()).unwrap(),
            Some(ChainObject::Block(block.clone()))
        );
        assert_eq!(ctx.get_latest_blocks(0, 5).unwrap().len(), 2);
        assert_eq!(ctx.get_latest_blocks(0, 1).unwrap(), vec![block]);
        assert!(ctx.get_latest_blocks(5, 1).unwrap().is_empty());
    }
}
