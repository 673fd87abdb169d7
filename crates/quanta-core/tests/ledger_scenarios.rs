//! End-to-end ledger scenarios: staking lifecycle, persistence and the node
//! query and ingestion surfaces.

mod common;

use common::*;
use quanta_core::{
    AcceptOutcome, BufferedChain, ChainError, ChainObject, NodeContext, OfflineNetwork,
    StaticPeers, SubmitOutcome,
};
use quanta_storage::{AddressStateStore, MemoryStore, PersistentStore, RocksConfig, RocksStore};
use quanta_types::{AddressState, ChainParams, Hash};
use std::sync::Arc;
use tempfile::TempDir;

fn produce(chain: &mut BufferedChain, producer: &quanta_crypto::Keypair, txs: &[quanta_types::Transaction]) {
    let timestamp = GENESIS_TIME + 10 * (chain.height() + 1);
    let block = chain.build_block(producer, timestamp, txs).unwrap();
    assert_eq!(block.tx_count(), txs.len() + 1, "every candidate should apply");
    assert_eq!(chain.accept(block).unwrap(), AcceptOutcome::Finalized);
}

#[test]
fn test_stake_lifecycle_across_epochs() {
    let actors = Actors::new();
    let (mut chain, _db) = open_chain(&actors);
    let alice = actors.alice.address();
    let reward = chain.params().initial_block_reward;

    // Epoch 0: lock 300 for activation in epoch 1
    produce(&mut chain, &actors.heavy, &[stake(&actors.alice, 300, 1, 5, 0)]);
    assert_eq!(chain.address_store().get(&alice).unwrap().balance, 695);
    assert_eq!(chain.tracker().coins_at_stake(), 1_000);
    assert!(!chain.is_eligible(&alice));

    produce(&mut chain, &actors.heavy, &[]);
    produce(&mut chain, &actors.heavy, &[]);
    // Height 4 opens epoch 1
    assert!(chain.is_eligible(&alice));
    produce(&mut chain, &actors.alice, &[]);
    assert_eq!(chain.tracker().current_epoch(), 1);
    assert_eq!(chain.address_store().get(&alice).unwrap().balance, 695 + reward);

    // Leaving takes effect from the next epoch, never the current one
    produce(&mut chain, &actors.heavy, &[destake(&actors.alice, 1, 2)]);
    assert!(chain.is_eligible(&alice));
    produce(&mut chain, &actors.heavy, &[]);
    produce(&mut chain, &actors.heavy, &[]);
    assert!(!chain.is_eligible(&alice));

    // Height 8 opens epoch 2 and releases the stake
    produce(&mut chain, &actors.heavy, &[]);
    assert_eq!(chain.tracker().current_epoch(), 2);
    assert_eq!(chain.tracker().stakers_count(), 2);
    assert_eq!(
        chain.address_store().get(&alice).unwrap().balance,
        695 + reward - 1 + 300
    );

    // Nothing created or destroyed beyond the schedule
    let balances: u64 = [&actors.alice, &actors.heavy, &actors.light]
        .iter()
        .map(|k| chain.address_store().get(&k.address()).unwrap().balance)
        .sum();
    let supply = chain.schedule().circulating_supply(chain.height());
    assert_eq!(balances + chain.tracker().coins_at_stake(), supply);
}

#[test]
fn test_stake_for_current_epoch_rejected() {
    let actors = Actors::new();
    let (chain, _db) = open_chain(&actors);
    let block = chain
        .build_block(&actors.heavy, GENESIS_TIME + 10, &[stake(&actors.alice, 300, 0, 0, 0)])
        .unwrap();
    // The builder skips what cannot apply
    assert_eq!(block.tx_count(), 1);
}

fn small_rocks() -> RocksConfig {
    RocksConfig {
        cache_size_mb: 8,
        max_open_files: 64,
        write_buffer_size_mb: 4,
        compress: false,
    }
}

#[test]
fn test_rocks_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let actors = Actors::new();
    let tip = {
        let store: Arc<dyn PersistentStore> = Arc::new(RocksStore::open_with(dir.path(), &small_rocks()).unwrap());
        let mut chain = BufferedChain::open(store, ChainParams::devnet(), &actors.genesis()).unwrap();
        produce(&mut chain, &actors.heavy, &[transfer(&actors.alice, &actors.bob, 100, 1, 0)]);
        produce(&mut chain, &actors.light, &[]);
        chain.tip()
    };

    let store: Arc<dyn PersistentStore> = Arc::new(RocksStore::open_with(dir.path(), &small_rocks()).unwrap());
    let chain = BufferedChain::open(store, ChainParams::devnet(), &actors.genesis()).unwrap();
    assert_eq!(chain.tip(), tip);
    assert_eq!(
        chain.address_store().get(&actors.alice.address()).unwrap().balance,
        899
    );
    assert_eq!(
        chain.address_store().get(&actors.bob.address()).unwrap().balance,
        100
    );
    assert_eq!(chain.tracker().stakers_count(), 2);
}

fn node(actors: &Actors, db: Arc<MemoryStore>) -> NodeContext {
    let peers = StaticPeers::new(vec!["127.0.0.1:9000".parse().unwrap()]);
    NodeContext::new(
        db,
        ChainParams::devnet(),
        &actors.genesis(),
        Arc::new(peers),
        Arc::new(OfflineNetwork::default()),
    )
    .unwrap()
}

#[test]
fn test_address_state_query() {
    let actors = Actors::new();
    let db = Arc::new(MemoryStore::new());
    let a = actors.carol.address();
    let state = AddressState {
        nonce: 25,
        balance: 10,
        used_pubkey_hashes: vec![Hash::compute(b"a"), Hash::compute(b"b")],
        tx_hashes: vec![Hash::compute(b"0"), Hash::compute(b"1")],
        ..AddressState::default()
    };
    AddressStateStore::new(db.clone()).put(&a, &state).unwrap();

    let node = node(&actors, db);
    let found = node.get_address_state(&a.to_string()).unwrap();
    assert_eq!(found, state);
    assert_eq!(
        node.get_address_tx_hashes(&a, 10).unwrap(),
        vec![Hash::compute(b"1"), Hash::compute(b"0")]
    );
    assert!(matches!(
        node.get_object(&a.to_string()).unwrap(),
        Some(ChainObject::Address { state: s, .. }) if s == state
    ));
}

#[test]
fn test_unknown_object_not_found() {
    let actors = Actors::new();
    let node = node(&actors, Arc::new(MemoryStore::new()));
    assert_eq!(node.get_object(&Hash::compute(b"nothing").to_hex()).unwrap(), None);
    assert_eq!(node.get_object("999").unwrap(), None);
}

#[test]
fn test_insufficient_balance_leaves_balances_untouched() {
    let actors = Actors::new();
    let db = Arc::new(MemoryStore::new());
    AddressStateStore::new(db.clone())
        .put(&actors.carol.address(), &AddressState::with_balance(10))
        .unwrap();
    let node = node(&actors, db);

    let tx = transfer(&actors.carol, &actors.bob, 125, 19, 13);
    assert_eq!(
        node.submit_transaction(tx).unwrap(),
        SubmitOutcome::Rejected(ChainError::InsufficientBalance {
            required: 144,
            available: 10
        })
    );
    let carol = node.get_address_state(&actors.carol.address().to_string()).unwrap();
    assert_eq!(carol.balance, 10);
    assert_eq!(carol.nonce, 0);
    assert_eq!(node.pool_size(), 0);
}

#[test]
fn test_displaced_transactions_return_to_the_pool() {
    let actors = Actors::new();
    let node = node(&actors, Arc::new(MemoryStore::new()));
    let genesis = node.get_block(quanta_core::BlockId::Height(0)).unwrap().unwrap();

    // Reference chain only used to read the emission schedule
    let (reference, _db) = open_chain(&actors);
    let tx = transfer(&actors.alice, &actors.bob, 100, 1, 0);
    let light = block_on(&reference, &genesis, &actors.light, 0, vec![tx.clone()]);
    let heavy = block_on(&reference, &genesis, &actors.heavy, 0, vec![]);

    assert_eq!(node.submit_block(light).unwrap(), AcceptOutcome::Finalized);
    assert!(node.find_transaction(&tx.txhash()).unwrap().is_some());
    assert_eq!(node.submit_block(heavy).unwrap(), AcceptOutcome::Finalized);

    assert!(node.find_transaction(&tx.txhash()).unwrap().is_none());
    assert_eq!(node.find_pending_transaction(&tx.txhash()), Some(tx.clone()));

    // The next block picks it back up
    let (block, outcome) = node.produce_block(&actors.heavy, GENESIS_TIME + 20).unwrap();
    assert_eq!(outcome, AcceptOutcome::Finalized);
    assert_eq!(block.transactions[1], tx);
    assert_eq!(node.pool_size(), 0);
}

#[test]
fn test_pool_rejects_replayed_finalized_transaction() {
    let actors = Actors::new();
    let node = node(&actors, Arc::new(MemoryStore::new()));
    let tx = transfer(&actors.alice, &actors.bob, 10, 0, 0);
    assert_eq!(
        node.submit_transaction(tx.clone()).unwrap(),
        SubmitOutcome::Accepted(tx.txhash())
    );
    node.produce_block(&actors.heavy, GENESIS_TIME + 10).unwrap();

    assert_eq!(
        node.submit_transaction(tx.clone()).unwrap(),
        SubmitOutcome::Rejected(ChainError::DuplicateTransaction(tx.txhash()))
    );
    let reused = transfer(&actors.alice, &actors.bob, 11, 0, 0);
    assert!(matches!(
        node.submit_transaction(reused).unwrap(),
        SubmitOutcome::Rejected(ChainError::ReplayedOneTimeKey { .. })
    ));
}

#[test]
fn test_pool_rejects_stake_that_can_never_apply() {
    let actors = Actors::new();
    let node = node(&actors, Arc::new(MemoryStore::new()));

    let too_small = stake(&actors.alice, 1, 1, 0, 0);
    assert!(matches!(
        node.submit_transaction(too_small).unwrap(),
        SubmitOutcome::Rejected(ChainError::StakeIneligible(_))
    ));
    let not_staked = destake(&actors.alice, 0, 0);
    assert!(matches!(
        node.submit_transaction(not_staked).unwrap(),
        SubmitOutcome::Rejected(ChainError::StakeIneligible(_))
    ));
    assert_eq!(node.pool_size(), 0);

    // The rejected one-time key is still free
    let valid = stake(&actors.alice, 300, 1, 0, 0);
    assert_eq!(
        node.submit_transaction(valid.clone()).unwrap(),
        SubmitOutcome::Accepted(valid.txhash())
    );
    let (block, _) = node.produce_block(&actors.heavy, GENESIS_TIME + 10).unwrap();
    assert_eq!(block.transactions[1], valid);
    assert_eq!(node.pool_size(), 0);

    let leave = destake(&actors.alice, 0, 1);
    assert_eq!(
        node.submit_transaction(leave.clone()).unwrap(),
        SubmitOutcome::Accepted(leave.txhash())
    );
}
