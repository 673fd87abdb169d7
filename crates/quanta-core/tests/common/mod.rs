//! Shared fixtures for chain integration tests.
#![allow(dead_code)]

use quanta_core::BufferedChain;
use quanta_crypto::Keypair;
use quanta_storage::{MemoryStore, PersistentStore};
use quanta_types::{Block, BlockHeader, ChainParams, GenesisConfig, Transaction, TransactionKind};
use std::sync::Arc;

pub const GENESIS_TIME: u64 = 1_000;

pub struct Actors {
    /// Genesis staker with 500 at stake
    pub heavy: Keypair,
    /// Genesis staker with 200 at stake
    pub light: Keypair,
    /// Funded with 1_000
    pub alice: Keypair,
    pub bob: Keypair,
    pub carol: Keypair,
}

impl Actors {
    pub fn new() -> Self {
        Self {
            heavy: Keypair::from_seed(&[10u8; 32]),
            light: Keypair::from_seed(&[11u8; 32]),
            alice: Keypair::from_seed(&[1u8; 32]),
            bob: Keypair::from_seed(&[2u8; 32]),
            carol: Keypair::from_seed(&[3u8; 32]),
        }
    }

    pub fn genesis(&self) -> GenesisConfig {
        let mut genesis = GenesisConfig::new(GENESIS_TIME);
        genesis.add_balance(self.alice.address(), 1_000);
        genesis.add_staker(self.heavy.address(), 500);
        genesis.add_staker(self.light.address(), 200);
        genesis
    }
}

pub fn open_chain(actors: &Actors) -> (BufferedChain, Arc<MemoryStore>) {
    open_chain_with(actors, ChainParams::devnet())
}

pub fn open_chain_with(actors: &Actors, params: ChainParams) -> (BufferedChain, Arc<MemoryStore>) {
    let db = Arc::new(MemoryStore::new());
    let store: Arc<dyn PersistentStore> = db.clone();
    let chain = BufferedChain::open(store, params, &actors.genesis()).unwrap();
    (chain, db)
}

pub fn genesis_block(chain: &BufferedChain) -> Block {
    chain.block_store().get_block_by_height(0).unwrap().unwrap()
}

/// Signed block on `parent`; `ots` must be unused for the producer key.
pub fn block_on(
    chain: &BufferedChain,
    parent: &Block,
    producer: &Keypair,
    ots: u64,
    txs: Vec<Transaction>,
) -> Block {
    let height = parent.height() + 1;
    let mut coinbase = Transaction::coinbase(producer.public_key(), ots);
    producer.sign_transaction(&mut coinbase);
    let mut transactions = vec![coinbase];
    transactions.extend(txs);
    let header = BlockHeader::new(
        parent.hash(),
        height,
        parent.header.timestamp + 10,
        producer.public_key(),
        chain.schedule().block_reward(height),
    );
    let mut block = Block::new(header, transactions);
    producer.sign_header(&mut block.header);
    block
}

pub fn transfer(from: &Keypair, to: &Keypair, amount: u64, fee: u64, ots: u64) -> Transaction {
    let mut tx = Transaction::transfer(from.public_key(), to.address(), amount, fee, ots);
    from.sign_transaction(&mut tx);
    tx
}

pub fn stake(from: &Keypair, amount: u64, activation_epoch: u64, fee: u64, ots: u64) -> Transaction {
    let mut tx = Transaction::stake(from.public_key(), amount, activation_epoch, fee, ots);
    from.sign_transaction(&mut tx);
    tx
}

pub fn destake(from: &Keypair, fee: u64, ots: u64) -> Transaction {
    let mut tx = Transaction::new(from.public_key(), ots, fee, TransactionKind::Destake);
    from.sign_transaction(&mut tx);
    tx
}
