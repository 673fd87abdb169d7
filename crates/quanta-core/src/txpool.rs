//! Transaction pool.
//!
//! Holds validated transactions until a block includes them. Admission is
//! checked against committed state plus the debits of the sender's other
//! pooled transactions, so everything in the pool can be applied together.
//! Staking transactions must also pass the validator tracker's checks.

use crate::error::ChainError;
use crate::executor::{apply_stake, check_balance, validate_transaction};
use quanta_consensus::StakeValidatorsTracker;
use quanta_types::{Address, AddressState, Block, Hash, Transaction};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Configuration for the transaction pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of pooled transactions
    pub max_size: usize,
    /// Maximum pooled transactions per sender
    pub max_per_account: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_per_account: 64,
        }
    }
}

#[derive(Debug, Clone)]
struct PooledTransaction {
    tx: Transaction,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct TransactionPool {
    config: PoolConfig,
    txs: HashMap<Hash, PooledTransaction>,
    /// Arrival order
    order: BTreeMap<u64, Hash>,
    by_sender: HashMap<Address, Vec<Hash>>,
    next_seq: u64,
}

impl TransactionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Validate and admit a transaction. `sender` is the committed state of
    /// `tx.addr_from`, `tracker` the committed validator set.
    pub fn submit(
        &mut self,
        tx: Transaction,
        sender: &AddressState,
        tracker: &StakeValidatorsTracker,
    ) -> Result<Hash, ChainError> {
        if tx.is_coinbase() {
            return Err(ChainError::MalformedTransaction(
                "coinbase claims are only valid inside blocks".into(),
            ));
        }
        validate_transaction(&tx, sender)?;

        let txhash = tx.txhash();
        if self.txs.contains_key(&txhash) {
            return Err(ChainError::DuplicateTransaction(txhash));
        }
        if self.txs.len() >= self.config.max_size {
            return Err(ChainError::PoolFull(self.config.max_size));
        }

        let queued = self.transactions_of(&tx.addr_from);
        if queued.len() >= self.config.max_per_account {
            return Err(ChainError::PoolFull(self.config.max_per_account));
        }
        if queued
            .iter()
            .any(|other| other.public_key == tx.public_key && other.ots_key_index == tx.ots_key_index)
        {
            return Err(ChainError::ReplayedOneTimeKey {
                address: tx.addr_from.to_string(),
                ots_key_index: tx.ots_key_index,
            });
        }
        let pending_debit = queued
            .iter()
            .try_fold(0u64, |acc, other| acc.checked_add(other.total_debit()?))
            .and_then(|acc| acc.checked_add(tx.total_debit()?))
            .unwrap_or(u64::MAX);
        check_balance(sender, pending_debit)?;

        if tx.is_staking() {
            let mut scratch = tracker.clone();
            let mut ordered = queued;
            ordered.sort_by_key(|other| other.ots_key_index);
            for other in ordered.iter().filter(|other| other.is_staking()) {
                if let Err(e) = apply_stake(other, &mut scratch) {
                    debug!(tx = %other.txhash().short(), reason = %e, "Stale staking transaction in pool");
                }
            }
            apply_stake(&tx, &mut scratch)?;
        }

        debug!(tx = %txhash.short(), from = %tx.addr_from, "Pooled transaction");
        self.insert(txhash, tx);
        Ok(txhash)
    }

    fn insert(&mut self, txhash: Hash, tx: Transaction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_sender.entry(tx.addr_from).or_default().push(txhash);
        self.order.insert(seq, txhash);
        self.txs.insert(txhash, PooledTransaction { tx, seq });
    }

    pub fn remove(&mut self, txhash: &Hash) -> Option<Transaction> {
        let pooled = self.txs.remove(txhash)?;
        self.order.remove(&pooled.seq);
        if let Some(hashes) = self.by_sender.get_mut(&pooled.tx.addr_from) {
            hashes.retain(|h| h != txhash);
            if hashes.is_empty() {
                self.by_sender.remove(&pooled.tx.addr_from);
            }
        }
        Some(pooled.tx)
    }

    /// Evict every transaction a finalized block included.
    pub fn remove_included(&mut self, block: &Block) -> usize {
        block
            .transactions
            .iter()
            .filter_map(|tx| self.remove(&tx.txhash()))
            .count()
    }

    /// Re-check every pooled transaction against fresh committed state and
    /// drop those that no longer apply. Returns the number dropped.
    pub fn revalidate<F>(
        &mut self,
        tracker: &StakeValidatorsTracker,
        mut lookup: F,
    ) -> Result<usize, ChainError>
    where
        F: FnMut(&Address) -> Result<AddressState, ChainError>,
    {
        let senders: Vec<Address> = self.by_sender.keys().copied().collect();
        let mut dropped = 0;
        for sender in senders {
            let state = lookup(&sender)?;
            let mut queued = self.transactions_of(&sender);
            queued.sort_by_key(|tx| tx.ots_key_index);

            let mut scratch = tracker.clone();
            let mut debit = 0u64;
            for tx in queued {
                let total = tx.total_debit().unwrap_or(u64::MAX);
                let fits = validate_transaction(&tx, &state).is_ok()
                    && debit.checked_add(total).map_or(false, |d| d <= state.balance)
                    && apply_stake(&tx, &mut scratch).is_ok();
                if fits {
                    debit += total;
                } else {
                    self.remove(&tx.txhash());
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, remaining = self.len(), "Revalidated pool");
        }
        Ok(dropped)
    }

    /// Up to `max` transactions in arrival order, each sender's own
    /// transactions reordered by one-time key index so they apply in turn.
    pub fn pending(&self, max: usize) -> Vec<Transaction> {
        let arrival: Vec<&Transaction> = self
            .order
            .values()
            .filter_map(|h| self.txs.get(h).map(|p| &p.tx))
            .collect();

        let mut by_sender: HashMap<Address, Vec<&Transaction>> = HashMap::new();
        for tx in &arrival {
            by_sender.entry(tx.addr_from).or_default().push(tx);
        }
        for queue in by_sender.values_mut() {
            // Reversed so pop() yields the lowest index
            queue.sort_by(|a, b| b.ots_key_index.cmp(&a.ots_key_index));
        }

        arrival
            .iter()
            .filter_map(|tx| by_sender.get_mut(&tx.addr_from).and_then(|q| q.pop()))
            .take(max)
            .cloned()
            .collect()
    }

    pub fn get(&self, txhash: &Hash) -> Option<&Transaction> {
        self.txs.get(txhash).map(|p| &p.tx)
    }

    pub fn contains(&self, txhash: &Hash) -> bool {
        self.txs.contains_key(txhash)
    }

    /// Pooled transactions of one sender, in arrival order.
    pub fn transactions_of(&self, sender: &Address) -> Vec<Transaction> {
        self.by_sender
            .get(sender)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| self.txs.get(h).map(|p| p.tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
