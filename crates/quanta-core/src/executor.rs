//! Transaction validation and application.
//!
//! A transaction moves through structural, signature, one-time key and
//! balance checks before it is applied. Application touches every affected
//! address through a working set and writes them back together, so a
//! failing transaction leaves the overlay unchanged. Each application
//! records the prior state of every touched address for exact rollback.

use crate::error::ChainError;
use crate::overlay::StateOverlay;
use borsh::{BorshDeserialize, BorshSerialize};
use quanta_consensus::StakeValidatorsTracker;
use quanta_crypto::{pubkey_hash, verify_transaction};
use quanta_types::{Address, AddressState, Block, GenesisConfig, Hash, Transaction, TransactionKind};

/// Block-level facts a transaction is applied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub height: u64,
    pub producer: Address,
    pub block_reward: u64,
}

impl BlockContext {
    pub fn of(block: &Block) -> Self {
        Self {
            height: block.height(),
            producer: block.producer(),
            block_reward: block.header.block_reward,
        }
    }
}

/// Result of applying one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already in the sender's history; nothing changed.
    AlreadyApplied,
}

/// Prior states touched by one step of a block, in first-touch order.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UndoEntry {
    /// Transaction hash, or `Hash::ZERO` for the epoch transition
    pub txhash: Hash,
    pub prior: Vec<(Address, Option<AddressState>)>,
}

/// Everything needed to roll one finalized block back.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UndoRecord {
    /// Tracker as it was before the block
    pub tracker: StakeValidatorsTracker,
    /// Stake priority of the producer at the parent state
    pub weight: u64,
    pub entries: Vec<UndoEntry>,
}

/// Structural checks that need no state.
///
/// `position` is the index inside a block, `None` for pool submissions.
pub fn check_structure(tx: &Transaction, position: Option<usize>) -> Result<(), ChainError> {
    if tx.public_key.to_address() != tx.addr_from {
        return Err(ChainError::MalformedTransaction(
            "addr_from does not derive from public_key".into(),
        ));
    }
    if !tx.is_signed() {
        return Err(ChainError::MalformedTransaction("missing signature".into()));
    }
    match &tx.kind {
        TransactionKind::Transfer { addr_to, amount } => {
            if *amount == 0 {
                return Err(ChainError::MalformedTransaction("zero transfer amount".into()));
            }
            if *addr_to == tx.addr_from {
                return Err(ChainError::MalformedTransaction("transfer to self".into()));
            }
        }
        TransactionKind::Stake { amount, .. } => {
            if *amount == 0 {
                return Err(ChainError::MalformedTransaction("zero stake amount".into()));
            }
        }
        TransactionKind::Destake => {}
        TransactionKind::CoinBase => {
            if tx.fee != 0 {
                return Err(ChainError::MalformedTransaction("coinbase carries a fee".into()));
            }
            if position != Some(0) {
                return Err(ChainError::MalformedTransaction(
                    "coinbase outside the first block position".into(),
                ));
            }
        }
    }
    if tx.total_debit().is_none() {
        return Err(ChainError::MalformedTransaction("amount + fee overflows".into()));
    }
    Ok(())
}

pub fn check_signature(tx: &Transaction) -> Result<(), ChainError> {
    verify_transaction(tx).map_err(|e| ChainError::SignatureInvalid(e.to_string()))
}

/// The (key, index) pair must be unused and the index above the key's watermark.
pub fn check_one_time_key(sender: &AddressState, tx: &Transaction) -> Result<(), ChainError> {
    let replayed = || ChainError::ReplayedOneTimeKey {
        address: tx.addr_from.to_string(),
        ots_key_index: tx.ots_key_index,
    };
    if sender.has_used_pubkey(&pubkey_hash(&tx.public_key, tx.ots_key_index)) {
        return Err(replayed());
    }
    match sender.ots_watermark(&tx.public_key.digest()) {
        Some(watermark) if tx.ots_key_index <= watermark => Err(replayed()),
        _ => Ok(()),
    }
}

pub fn check_balance(sender: &AddressState, required: u64) -> Result<(), ChainError> {
    if sender.balance < required {
        return Err(ChainError::InsufficientBalance {
            required,
            available: sender.balance,
        });
    }
    Ok(())
}

/// Pool-path validation against committed sender state. Fees are checked,
/// not credited; coinbase claims are never accepted here.
pub fn validate_transaction(tx: &Transaction, sender: &AddressState) -> Result<(), ChainError> {
    check_structure(tx, None)?;
    check_signature(tx)?;
    let txhash = tx.txhash();
    if sender.has_tx(&txhash) {
        return Err(ChainError::DuplicateTransaction(txhash));
    }
    check_one_time_key(sender, tx)?;
    check_balance(sender, tx.total_debit().unwrap_or(u64::MAX))
}

/// Addresses loaded once per transaction, written back together.
struct WorkingSet {
    entries: Vec<(Address, Option<AddressState>, AddressState)>,
}

impl WorkingSet {
    fn new() -> Self {
        Self { entries: Vec::with_capacity(3) }
    }

    fn state(&mut self, overlay: &StateOverlay<'_>, address: Address) -> Result<&mut AddressState, ChainError> {
        let index = match self.entries.iter().position(|(a, _, _)| *a == address) {
            Some(index) => index,
            None => {
                let prior = overlay.find(&address)?;
                let current = prior.clone().unwrap_or_default();
                self.entries.push((address, prior, current));
                self.entries.len() - 1
            }
        };
        Ok(&mut self.entries[index].2)
    }

    fn commit(self, overlay: &mut StateOverlay<'_>, txhash: Hash) -> UndoEntry {
        let mut prior = Vec::with_capacity(self.entries.len());
        for (address, before, after) in self.entries {
            overlay.put(address, after);
            prior.push((address, before));
        }
        UndoEntry { txhash, prior }
    }
}

/// Apply one block transaction to the overlay.
///
/// On error the overlay is unchanged. `Ok((AlreadyApplied, None))` is the
/// idempotent no-op.
pub fn apply_transaction(
    overlay: &mut StateOverlay<'_>,
    tx: &Transaction,
    position: usize,
    ctx: &BlockContext,
) -> Result<(ApplyOutcome, Option<UndoEntry>), ChainError> {
    check_structure(tx, Some(position))?;
    if tx.is_coinbase() && tx.addr_from != ctx.producer {
        return Err(ChainError::MalformedTransaction(
            "coinbase not claimed by the block producer".into(),
        ));
    }
    check_signature(tx)?;

    let txhash = tx.txhash();
    let mut working = WorkingSet::new();
    let sender = working.state(overlay, tx.addr_from)?;
    if sender.has_tx(&txhash) {
        return Ok((ApplyOutcome::AlreadyApplied, None));
    }
    check_one_time_key(sender, tx)?;
    let debit = tx.total_debit().unwrap_or(u64::MAX);
    check_balance(sender, debit)?;

    sender.debit(debit)?;
    sender.increment_nonce();
    sender.record_pubkey(pubkey_hash(&tx.public_key, tx.ots_key_index));
    sender.raise_ots_watermark(tx.public_key.digest(), tx.ots_key_index);
    sender.push_tx(txhash);

    match &tx.kind {
        TransactionKind::Transfer { addr_to, amount } => {
            let receiver = working.state(overlay, *addr_to)?;
            receiver.credit(*amount)?;
            receiver.push_tx(txhash);
        }
        TransactionKind::CoinBase => {
            working.state(overlay, ctx.producer)?.credit(ctx.block_reward)?;
        }
        TransactionKind::Stake { .. } | TransactionKind::Destake => {}
    }
    if tx.fee > 0 {
        working.state(overlay, ctx.producer)?.credit(tx.fee)?;
    }

    // Tracker changes last: every fallible balance step is behind us.
    apply_stake(tx, overlay.tracker_mut())?;

    Ok((ApplyOutcome::Applied, Some(working.commit(overlay, txhash))))
}

/// Register or deactivate the sender for a staking transaction. Other kinds
/// leave the tracker alone.
///
/// Pool admission runs this on a scratch copy of the committed tracker.
pub fn apply_stake(tx: &Transaction, tracker: &mut StakeValidatorsTracker) -> Result<(), ChainError> {
    match &tx.kind {
        TransactionKind::Stake { activation_epoch, amount } => {
            tracker.register(tx.addr_from, *amount, *activation_epoch)?;
        }
        TransactionKind::Destake => {
            tracker.deactivate(&tx.addr_from)?;
        }
        _ => {}
    }
    Ok(())
}

/// Credit stake refunds released by an epoch transition.
fn credit_refunds(
    overlay: &mut StateOverlay<'_>,
    refunds: &[(Address, u64)],
) -> Result<UndoEntry, ChainError> {
    let mut working = WorkingSet::new();
    for (address, amount) in refunds {
        working.state(overlay, *address)?.credit(*amount)?;
    }
    Ok(working.commit(overlay, Hash::ZERO))
}

/// Enter the epoch of `height` if it is a new one, crediting released stake.
pub fn begin_block(
    overlay: &mut StateOverlay<'_>,
    height: u64,
    blocks_per_epoch: u64,
) -> Result<Option<UndoEntry>, ChainError> {
    let epoch = height / blocks_per_epoch.max(1);
    if epoch <= overlay.tracker().current_epoch() {
        return Ok(None);
    }
    let refunds = overlay.tracker_mut().advance_epoch(epoch)?;
    credit_refunds(overlay, &refunds).map(Some)
}

/// Apply a whole block: epoch transition, then every transaction in order.
///
/// The caller checks structure and producer eligibility first and discards
/// the overlay on error.
pub fn apply_block(
    overlay: &mut StateOverlay<'_>,
    block: &Block,
    blocks_per_epoch: u64,
) -> Result<UndoRecord, ChainError> {
    let ctx = BlockContext::of(block);
    let tracker = overlay.tracker().clone();
    let weight = tracker.stake_priority(&ctx.producer, ctx.height);
    let mut entries = Vec::with_capacity(block.tx_count() + 1);
    entries.extend(begin_block(overlay, ctx.height, blocks_per_epoch)?);

    for (position, tx) in block.transactions.iter().enumerate() {
        match apply_transaction(overlay, tx, position, &ctx)? {
            (ApplyOutcome::Applied, Some(entry)) => entries.push(entry),
            _ => return Err(ChainError::DuplicateTransaction(tx.txhash())),
        }
    }

    Ok(UndoRecord {
        tracker,
        weight,
        entries,
    })
}

/// Roll a block back: restore priors in reverse order, then the tracker.
pub fn rollback_block(overlay: &mut StateOverlay<'_>, undo: &UndoRecord) {
    for entry in undo.entries.iter().rev() {
        for (address, prior) in entry.prior.iter().rev() {
            overlay.restore(*address, prior.clone());
        }
    }
    overlay.set_tracker(undo.tracker.clone());
}

/// Establish the genesis state: allocations and genesis stakers.
pub fn apply_genesis(overlay: &mut StateOverlay<'_>, genesis: &GenesisConfig) -> Result<(), ChainError> {
    for alloc in &genesis.balances {
        let mut state = overlay.get(&alloc.address)?;
        state.credit(alloc.balance)?;
        overlay.put(alloc.address, state);
    }
    for staker in &genesis.stakers {
        overlay
            .tracker_mut()
            .register_genesis(staker.address, staker.amount)?;
    }
    Ok(())
}
