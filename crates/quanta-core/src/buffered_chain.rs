//! Finalized chain plus buffered forks.
//!
//! The finalized chain lives in the store: block log, height index, undo
//! journal and the tracker as of the tip. Blocks that extend the tip are
//! committed at once. Blocks on a competing branch are validated against a
//! speculative overlay rewound to their fork point and kept in memory until
//! fork choice promotes them or pruning drops them. Blocks whose parent is
//! unknown wait in the pending pool.

use crate::block_builder::BlockBuilder;
use crate::emission::EmissionSchedule;
use crate::error::ChainError;
use crate::executor::{apply_block, apply_genesis, rollback_block, UndoRecord};
use crate::overlay::StateOverlay;
use parking_lot::RwLock;
use quanta_consensus::StakeValidatorsTracker;
use quanta_crypto::{verify_header, Keypair};
use quanta_storage::{AddressStateStore, BlockStore, ChainTip, PersistentStore, WriteBatch};
use quanta_types::{Address, Block, BlockHeader, ChainParams, GenesisConfig, Hash, Transaction};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Orphans held at most; the oldest is evicted first.
const MAX_PENDING: usize = 1024;
/// Rejected hashes remembered at most.
const MAX_REJECTED: usize = 4096;
/// Metadata key of the tracker as of the tip.
const TRACKER_KEY: &str = "tracker";

/// Result of offering a block to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Now part of the finalized chain (directly or through a reorg).
    Finalized,
    /// Valid on a competing branch that does not win yet.
    Buffered,
    /// Parent unknown; held until it arrives or times out.
    Pending,
    Rejected(ChainError),
}

/// Finalized-chain changes, drained by the owner to keep the pool in step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Finalized(Block),
    /// Rolled back by a reorg.
    Displaced(Block),
}

/// Snapshot of the finalized chain published after every commit.
#[derive(Debug, Clone)]
pub struct ChainView {
    pub tip: ChainTip,
    pub tip_timestamp: u64,
    pub epoch: u64,
    pub tracker: StakeValidatorsTracker,
    pub halted: bool,
}

struct BufferedBlock {
    block: Block,
    /// Stake priority of the producer at the parent state
    weight: u64,
}

struct PendingBlock {
    block: Block,
    received: Instant,
}

pub struct BufferedChain {
    db: Arc<dyn PersistentStore>,
    addresses: AddressStateStore,
    blocks: BlockStore,
    params: ChainParams,
    schedule: EmissionSchedule,
    tip: ChainTip,
    tip_timestamp: u64,
    /// Tracker as of the tip
    tracker: StakeValidatorsTracker,
    buffered: HashMap<Hash, BufferedBlock>,
    pending: HashMap<Hash, PendingBlock>,
    rejected: HashMap<Hash, ChainError>,
    rejected_order: VecDeque<Hash>,
    events: Vec<ChainEvent>,
    view: Arc<RwLock<ChainView>>,
    halted: Option<ChainError>,
}

impl BufferedChain {
    /// Open the chain on `db`, writing the genesis state on first use.
    ///
    /// A store initialized with a different genesis block is refused.
    pub fn open(
        db: Arc<dyn PersistentStore>,
        params: ChainParams,
        genesis: &GenesisConfig,
    ) -> Result<Self, ChainError> {
        params
            .validate()
            .map_err(|e| ChainError::MalformedBlock(format!("chain parameters: {}", e)))?;
        genesis
            .validate(&params)
            .map_err(|e| ChainError::MalformedBlock(format!("genesis: {}", e)))?;

        let genesis_supply = genesis.total_allocated().unwrap_or(params.total_supply);
        let schedule = EmissionSchedule::new(&params, genesis_supply);
        let addresses = AddressStateStore::new(db.clone());
        let blocks = BlockStore::new(db.clone());
        let genesis_block = genesis.block();
        let genesis_hash = genesis_block.hash();

        let (tip, tracker) = match blocks.genesis_hash()? {
            Some(stored) if stored != genesis_hash => {
                return Err(ChainError::ChainInconsistency(format!(
                    "store holds genesis {}, configured genesis is {}",
                    stored, genesis_hash
                )));
            }
            Some(_) => {
                let tip = blocks
                    .tip()?
                    .ok_or_else(|| ChainError::ChainInconsistency("missing chain tip".into()))?;
                let tracker = blocks
                    .get_meta::<StakeValidatorsTracker>(TRACKER_KEY)?
                    .ok_or_else(|| ChainError::ChainInconsistency("missing tracker".into()))?;
                info!(height = tip.height, tip = %tip.hash.short(), "Loaded chain");
                (tip, tracker)
            }
            None => {
                let mut overlay = StateOverlay::new(&addresses, StakeValidatorsTracker::new(&params));
                apply_genesis(&mut overlay, genesis)?;

                let mut batch = WriteBatch::new();
                let tracker = overlay.stage(&mut batch)?;
                let tip = ChainTip {
                    hash: genesis_hash,
                    height: 0,
                };
                blocks.stage_block(&mut batch, &genesis_block)?;
                blocks.stage_genesis(&mut batch, &genesis_hash);
                blocks.stage_tip(&mut batch, &tip)?;
                blocks.stage_meta(&mut batch, TRACKER_KEY, &tracker)?;
                db.write(batch)?;

                info!(
                    genesis = %genesis_hash.short(),
                    balances = genesis.balances.len(),
                    stakers = genesis.stakers.len(),
                    "Initialized genesis"
                );
                (tip, tracker)
            }
        };

        let tip_timestamp = blocks
            .get_block(&tip.hash)?
            .map(|b| b.header.timestamp)
            .ok_or_else(|| ChainError::ChainInconsistency("tip block missing".into()))?;
        let view = ChainView {
            tip,
            tip_timestamp,
            epoch: tracker.current_epoch(),
            tracker: tracker.clone(),
            halted: false,
        };

        Ok(Self {
            db,
            addresses,
            blocks,
            params,
            schedule,
            tip,
            tip_timestamp,
            tracker,
            buffered: HashMap::new(),
            pending: HashMap::new(),
            rejected: HashMap::new(),
            rejected_order: VecDeque::new(),
            events: Vec::new(),
            view: Arc::new(RwLock::new(view)),
            halted: None,
        })
    }

    /// Offer a block, then connect any pending children it unlocks.
    ///
    /// `Err` is reserved for storage failures and for a halted chain; every
    /// block-level problem is reported as `Rejected`.
    pub fn accept(&mut self, block: Block) -> Result<AcceptOutcome, ChainError> {
        self.ensure_live()?;
        self.expire_pending();

        let hash = block.hash();
        let outcome = self.accept_one(block)?;
        if matches!(outcome, AcceptOutcome::Finalized | AcceptOutcome::Buffered) {
            self.connect_pending(hash)?;
        }
        Ok(outcome)
    }

    fn accept_one(&mut self, block: Block) -> Result<AcceptOutcome, ChainError> {
        let hash = block.hash();
        if let Some(reason) = self.rejected.get(&hash) {
            return Ok(AcceptOutcome::Rejected(reason.clone()));
        }
        if self.pending.contains_key(&hash) {
            return Ok(AcceptOutcome::Pending);
        }
        if self.is_connected(&hash)? {
            return Ok(AcceptOutcome::Rejected(ChainError::DuplicateBlock(hash)));
        }
        if block.is_genesis() {
            let reason = ChainError::MalformedBlock("second genesis block".into());
            self.remember_rejection(hash, reason.clone());
            return Ok(AcceptOutcome::Rejected(reason));
        }
        if !self.is_connected(&block.parent_hash())? {
            self.hold_pending(hash, block);
            return Ok(AcceptOutcome::Pending);
        }

        let height = block.height();
        match self.connect(block) {
            Ok(outcome) => {
                self.prune()?;
                Ok(outcome)
            }
            Err(e) if e.is_fatal() => Err(self.halt(e)),
            Err(ChainError::Storage(msg)) => Err(ChainError::Storage(msg)),
            Err(e) => {
                warn!(block = %hash.short(), height, reason = %e, "Block rejected");
                self.remember_rejection(hash, e.clone());
                Ok(AcceptOutcome::Rejected(e))
            }
        }
    }

    /// Connect pending blocks breadth-first starting below `parent`.
    fn connect_pending(&mut self, parent: Hash) -> Result<(), ChainError> {
        let mut queue = VecDeque::from([parent]);
        while let Some(parent) = queue.pop_front() {
            let children: Vec<Hash> = self
                .pending
                .iter()
                .filter(|(_, p)| p.block.parent_hash() == parent)
                .map(|(hash, _)| *hash)
                .collect();
            for child in children {
                if let Some(pending) = self.pending.remove(&child) {
                    debug!(block = %child.short(), "Connecting pending block");
                    let outcome = self.accept_one(pending.block)?;
                    if matches!(outcome, AcceptOutcome::Finalized | AcceptOutcome::Buffered) {
                        queue.push_back(child);
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate a block whose parent is connected and place it.
    fn connect(&mut self, block: Block) -> Result<AcceptOutcome, ChainError> {
        let hash = block.hash();
        let parent = self
            .find_block(&block.parent_hash())?
            .ok_or(ChainError::UnknownParentBlock(block.parent_hash()))?;
        self.check_block(&block, &parent.header)?;

        let (root, path) = self.branch_of(block.parent_hash())?;
        if root.height + self.params.retention_depth < self.tip.height {
            return Err(ChainError::MalformedBlock("fork below retention window".into()));
        }

        let addresses = self.addresses.clone();
        let mut overlay = self.overlay_at(&addresses, root, &path)?;
        let producer = block.producer();
        if !overlay.tracker().is_eligible(&producer, block.height()) {
            return Err(ChainError::StakeIneligible(format!(
                "{} may not produce height {}",
                producer,
                block.height()
            )));
        }
        let undo = apply_block(&mut overlay, &block, self.params.blocks_per_epoch)?;

        if block.parent_hash() == self.tip.hash {
            self.commit(block, overlay, &undo)?;
            return Ok(AcceptOutcome::Finalized);
        }
        drop(overlay);

        debug!(
            block = %hash.short(),
            height = block.height(),
            weight = undo.weight,
            "Buffered block on competing branch"
        );
        self.buffered.insert(
            hash,
            BufferedBlock {
                block,
                weight: undo.weight,
            },
        );
        self.fork_choice(hash)
    }

    /// Header-level checks against the parent.
    fn check_block(&self, block: &Block, parent: &BlockHeader) -> Result<(), ChainError> {
        let height = block.height();
        if height != parent.height + 1 {
            return Err(ChainError::MalformedBlock(format!(
                "height {} does not follow parent height {}",
                height, parent.height
            )));
        }
        if block.header.timestamp < parent.timestamp {
            return Err(ChainError::MalformedBlock("timestamp before parent".into()));
        }
        if block.tx_count() > self.params.max_block_transactions {
            return Err(ChainError::MalformedBlock(format!(
                "{} transactions exceed the limit of {}",
                block.tx_count(),
                self.params.max_block_transactions
            )));
        }
        if !block.tx_root_matches() {
            return Err(ChainError::MalformedBlock("transaction root mismatch".into()));
        }
        let expected = self.schedule.block_reward(height);
        if block.header.block_reward != expected {
            return Err(ChainError::MalformedBlock(format!(
                "block reward {} where the schedule pays {}",
                block.header.block_reward, expected
            )));
        }
        match block.coinbase() {
            Some(coinbase) if coinbase.addr_from == block.producer() => {}
            Some(_) => {
                return Err(ChainError::MalformedBlock(
                    "coinbase not claimed by the producer".into(),
                ))
            }
            None => return Err(ChainError::MalformedBlock("missing coinbase".into())),
        }
        if let Some(duplicate) = block.duplicate_transaction() {
            return Err(ChainError::MalformedBlock(format!(
                "duplicate transaction {}",
                duplicate
            )));
        }
        verify_header(&block.header).map_err(|e| ChainError::SignatureInvalid(e.to_string()))
    }

    /// Walk buffered ancestors of `hash` down to the finalized chain.
    ///
    /// Returns the finalized fork point and the buffered path above it,
    /// oldest first.
    fn branch_of(&self, hash: Hash) -> Result<(ChainTip, Vec<Hash>), ChainError> {
        let mut path = Vec::new();
        let mut cursor = hash;
        while let Some(buffered) = self.buffered.get(&cursor) {
            path.push(cursor);
            cursor = buffered.block.parent_hash();
        }
        let root = self
            .blocks
            .get_block(&cursor)?
            .ok_or(ChainError::UnknownParentBlock(cursor))?;
        path.reverse();
        Ok((
            ChainTip {
                hash: cursor,
                height: root.height(),
            },
            path,
        ))
    }

    /// Committed state rewound to `root`, then advanced through `path`.
    fn overlay_at<'a>(
        &self,
        addresses: &'a AddressStateStore,
        root: ChainTip,
        path: &[Hash],
    ) -> Result<StateOverlay<'a>, ChainError> {
        let mut overlay = StateOverlay::new(addresses, self.tracker.clone());
        for height in (root.height + 1..=self.tip.height).rev() {
            let undo = self.canonical_undo(height)?.1;
            rollback_block(&mut overlay, &undo);
        }
        for hash in path {
            let buffered = self
                .buffered
                .get(hash)
                .ok_or_else(|| ChainError::ChainInconsistency(format!("buffered block {} vanished", hash)))?;
            apply_block(&mut overlay, &buffered.block, self.params.blocks_per_epoch).map_err(|e| {
                ChainError::ChainInconsistency(format!("replaying buffered block {}: {}", hash, e))
            })?;
        }
        Ok(overlay)
    }

    fn canonical_undo(&self, height: u64) -> Result<(Hash, UndoRecord), ChainError> {
        let hash = self
            .blocks
            .get_hash_at(height)?
            .ok_or_else(|| ChainError::ChainInconsistency(format!("no block at height {}", height)))?;
        let undo = self
            .blocks
            .get_undo::<UndoRecord>(&hash)?
            .ok_or_else(|| ChainError::ChainInconsistency(format!("no undo record for {}", hash)))?;
        Ok((hash, undo))
    }

    /// Promote the branch ending at `head` if it beats the canonical segment.
    fn fork_choice(&mut self, head: Hash) -> Result<AcceptOutcome, ChainError> {
        let (root, path) = self.branch_of(head)?;
        let branch_len = path.len() as u64;
        let canon_len = self.tip.height - root.height;
        if branch_len < canon_len + self.params.confirmation_depth {
            return Ok(AcceptOutcome::Buffered);
        }

        let mut branch_weight: u128 = 0;
        let mut branch_hash = Hash::ZERO;
        for hash in &path {
            if let Some(buffered) = self.buffered.get(hash) {
                branch_weight += buffered.weight as u128;
            }
            branch_hash = branch_hash.chain(hash);
        }
        let mut canon_weight: u128 = 0;
        let mut canon_hash = Hash::ZERO;
        for height in root.height + 1..=self.tip.height {
            let (hash, undo) = self.canonical_undo(height)?;
            canon_weight += undo.weight as u128;
            canon_hash = canon_hash.chain(&hash);
        }

        let wins = canon_len == 0
            || branch_weight > canon_weight
            || (branch_weight == canon_weight && branch_hash < canon_hash);
        if !wins {
            return Ok(AcceptOutcome::Buffered);
        }

        info!(
            from = %self.tip.hash.short(),
            to = %head.short(),
            fork_height = root.height,
            rolled_back = canon_len,
            applied = branch_len,
            "Reorganizing chain"
        );
        self.reorg(root, path)
            .map_err(|e| ChainError::ChainInconsistency(format!("reorg failed: {}", e)))?;
        Ok(AcceptOutcome::Finalized)
    }

    /// Roll the tip back to `root`, then commit `path` one block at a time.
    fn reorg(&mut self, root: ChainTip, path: Vec<Hash>) -> Result<(), ChainError> {
        while self.tip.height > root.height {
            self.rollback_tip()?;
        }
        if self.tip.hash != root.hash {
            return Err(ChainError::ChainInconsistency("rollback missed the fork point".into()));
        }
        for hash in path {
            let buffered = self
                .buffered
                .remove(&hash)
                .ok_or_else(|| ChainError::ChainInconsistency(format!("buffered block {} vanished", hash)))?;
            self.apply_committed(buffered.block)?;
        }
        Ok(())
    }

    fn rollback_tip(&mut self) -> Result<(), ChainError> {
        if self.tip.height == 0 {
            return Err(ChainError::ChainInconsistency("cannot roll back genesis".into()));
        }
        let (hash, undo) = self.canonical_undo(self.tip.height)?;
        let block = self
            .blocks
            .get_block(&hash)?
            .ok_or_else(|| ChainError::ChainInconsistency(format!("block {} missing", hash)))?;
        let parent = self
            .blocks
            .get_block(&block.parent_hash())?
            .ok_or_else(|| ChainError::ChainInconsistency(format!("parent of {} missing", hash)))?;

        let addresses = self.addresses.clone();
        let mut overlay = StateOverlay::new(&addresses, self.tracker.clone());
        rollback_block(&mut overlay, &undo);

        let mut batch = WriteBatch::new();
        let tracker = overlay.stage(&mut batch)?;
        let tip = ChainTip {
            hash: parent.hash(),
            height: parent.height(),
        };
        self.blocks.stage_remove_block(&mut batch, &block);
        self.blocks.stage_meta(&mut batch, TRACKER_KEY, &tracker)?;
        self.blocks.stage_tip(&mut batch, &tip)?;
        self.db.write(batch)?;

        self.tip = tip;
        self.tip_timestamp = parent.header.timestamp;
        self.tracker = tracker;
        self.publish();
        info!(block = %hash.short(), height = block.height(), "Rolled back block");
        self.events.push(ChainEvent::Displaced(block));
        Ok(())
    }

    /// Apply a pre-validated block on top of the tip and commit it.
    fn apply_committed(&mut self, block: Block) -> Result<(), ChainError> {
        let addresses = self.addresses.clone();
        let mut overlay = StateOverlay::new(&addresses, self.tracker.clone());
        let undo = apply_block(&mut overlay, &block, self.params.blocks_per_epoch)?;
        self.commit(block, overlay, &undo)
    }

    /// Write block, state, undo record, tracker and tip in one batch.
    fn commit(
        &mut self,
        block: Block,
        overlay: StateOverlay<'_>,
        undo: &UndoRecord,
    ) -> Result<(), ChainError> {
        let hash = block.hash();
        let mut batch = WriteBatch::new();
        let tracker = overlay.stage(&mut batch)?;
        let tip = ChainTip {
            hash,
            height: block.height(),
        };
        self.blocks.stage_block(&mut batch, &block)?;
        self.blocks.stage_undo(&mut batch, &hash, undo)?;
        self.blocks.stage_meta(&mut batch, TRACKER_KEY, &tracker)?;
        self.blocks.stage_tip(&mut batch, &tip)?;
        self.db.write(batch)?;

        self.tip = tip;
        self.tip_timestamp = block.header.timestamp;
        self.tracker = tracker;
        self.publish();
        info!(
            block = %hash.short(),
            height = block.height(),
            txs = block.tx_count(),
            producer = %block.producer(),
            "Finalized block"
        );
        self.events.push(ChainEvent::Finalized(block));
        Ok(())
    }

    /// Drop buffered blocks that fell out of the retention window or whose
    /// fork point is no longer canonical.
    fn prune(&mut self) -> Result<(), ChainError> {
        let floor = self.tip.height.saturating_sub(self.params.retention_depth);
        let mut stale = Vec::new();
        for (hash, buffered) in &self.buffered {
            if buffered.block.height() < floor {
                stale.push(*hash);
                continue;
            }
            let mut cursor = buffered.block.parent_hash();
            while let Some(ancestor) = self.buffered.get(&cursor) {
                cursor = ancestor.block.parent_hash();
            }
            let rooted = match self.blocks.get_block(&cursor)? {
                Some(root) => root.height() >= floor,
                None => false,
            };
            if !rooted {
                stale.push(*hash);
            }
        }
        for hash in &stale {
            self.buffered.remove(hash);
        }
        if !stale.is_empty() {
            debug!(dropped = stale.len(), floor, "Pruned buffered blocks");
        }
        Ok(())
    }

    fn hold_pending(&mut self, hash: Hash, block: Block) {
        if self.pending.len() >= MAX_PENDING {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, p)| p.received)
                .map(|(hash, _)| *hash);
            if let Some(oldest) = oldest {
                self.pending.remove(&oldest);
            }
        }
        debug!(
            block = %hash.short(),
            parent = %block.parent_hash().short(),
            "Holding block with unknown parent"
        );
        self.pending.insert(
            hash,
            PendingBlock {
                block,
                received: Instant::now(),
            },
        );
    }

    fn expire_pending(&mut self) {
        let timeout = Duration::from_secs(self.params.pending_timeout_secs);
        let before = self.pending.len();
        self.pending.retain(|_, p| p.received.elapsed() < timeout);
        let expired = before - self.pending.len();
        if expired > 0 {
            debug!(expired, "Expired pending blocks");
        }
    }

    fn remember_rejection(&mut self, hash: Hash, reason: ChainError) {
        if self.rejected.insert(hash, reason).is_none() {
            self.rejected_order.push_back(hash);
        }
        while self.rejected_order.len() > MAX_REJECTED {
            if let Some(old) = self.rejected_order.pop_front() {
                self.rejected.remove(&old);
            }
        }
    }

    fn halt(&mut self, reason: ChainError) -> ChainError {
        error!(reason = %reason, "Chain halted");
        self.halted = Some(reason.clone());
        self.view.write().halted = true;
        reason
    }

    fn ensure_live(&self) -> Result<(), ChainError> {
        match &self.halted {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn publish(&self) {
        *self.view.write() = ChainView {
            tip: self.tip,
            tip_timestamp: self.tip_timestamp,
            epoch: self.tracker.current_epoch(),
            tracker: self.tracker.clone(),
            halted: self.halted.is_some(),
        };
    }

    /// Finalized or buffered, i.e. usable as a parent.
    fn is_connected(&self, hash: &Hash) -> Result<bool, ChainError> {
        Ok(self.buffered.contains_key(hash) || self.blocks.contains_block(hash)?)
    }

    fn find_block(&self, hash: &Hash) -> Result<Option<Block>, ChainError> {
        match self.buffered.get(hash) {
            Some(buffered) => Ok(Some(buffered.block.clone())),
            None => Ok(self.blocks.get_block(hash)?),
        }
    }

    /// Build and sign the next block on the tip from `candidates`.
    ///
    /// Candidates that do not apply are skipped. The block still has to go
    /// through [`BufferedChain::accept`].
    pub fn build_block(
        &self,
        producer: &Keypair,
        timestamp: u64,
        candidates: &[Transaction],
    ) -> Result<Block, ChainError> {
        self.ensure_live()?;
        let height = self.tip.height + 1;
        let address = producer.address();
        if !self.tracker.is_eligible(&address, height) {
            return Err(ChainError::StakeIneligible(format!(
                "{} may not produce height {}",
                address, height
            )));
        }

        let addresses = self.addresses.clone();
        let overlay = StateOverlay::new(&addresses, self.tracker.clone());
        let mut builder = BlockBuilder::new(
            overlay,
            self.tip.hash,
            height,
            self.schedule.block_reward(height),
            self.params.blocks_per_epoch,
            self.params.max_block_transactions,
            producer,
        )?;
        for tx in candidates {
            if builder.is_full() {
                break;
            }
            if let Err(e) = builder.add_transaction(tx.clone()) {
                debug!(tx = %tx.txhash().short(), reason = %e, "Skipping candidate");
            }
        }
        Ok(builder.finalize(producer, timestamp.max(self.tip_timestamp)))
    }

    pub fn tip(&self) -> ChainTip {
        self.tip
    }

    pub fn height(&self) -> u64 {
        self.tip.height
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    /// Tracker as of the tip.
    pub fn tracker(&self) -> &StakeValidatorsTracker {
        &self.tracker
    }

    pub fn is_eligible(&self, producer: &Address) -> bool {
        self.tracker.is_eligible(producer, self.tip.height + 1)
    }

    pub fn is_buffered(&self, hash: &Hash) -> bool {
        self.buffered.contains_key(hash)
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Shared handle to the published view.
    pub fn view(&self) -> Arc<RwLock<ChainView>> {
        self.view.clone()
    }

    /// Drain finalized-chain events since the last call.
    pub fn take_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn address_store(&self) -> &AddressStateStore {
        &self.addresses
    }

    pub fn block_store(&self) -> &BlockStore {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_storage::MemoryStore;

    struct Net {
        chain: BufferedChain,
        db: Arc<MemoryStore>,
        genesis: GenesisConfig,
        heavy: Keypair,
        light: Keypair,
        alice: Keypair,
    }

    fn setup() -> Net {
        let heavy = Keypair::from_seed(&[10u8; 32]);
        let light = Keypair::from_seed(&[11u8; 32]);
        let alice = Keypair::from_seed(&[1u8; 32]);
        let mut genesis = GenesisConfig::new(1_000);
        genesis.add_balance(alice.address(), 1_000);
        genesis.add_staker(heavy.address(), 500);
        genesis.add_staker(light.address(), 200);

        let db = Arc::new(MemoryStore::new());
        let chain = BufferedChain::open(db.clone(), ChainParams::devnet(), &genesis).unwrap();
        Net {
            chain,
            db,
            genesis,
            heavy,
            light,
            alice,
        }
    }

    /// Block on any parent; `ots` must be fresh for the producer key.
    fn block_on(chain: &BufferedChain, parent: &Block, producer: &Keypair, ots: u64, txs: Vec<Transaction>) -> Block {
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

    fn tip_block(chain: &BufferedChain) -> Block {
        chain.block_store().get_block(&chain.tip().hash).unwrap().unwrap()
    }

    #[test]
    fn test_open_writes_genesis_once() {
        let net = setup();
        assert_eq!(net.chain.height(), 0);
        assert_eq!(net.chain.tracker().stakers_count(), 2);
        let alice = net.chain.address_store().get(&net.alice.address()).unwrap();
        assert_eq!(alice.balance, 1_000);

        let reopened = BufferedChain::open(net.db.clone(), ChainParams::devnet(), &net.genesis).unwrap();
        assert_eq!(reopened.tip(), net.chain.tip());
        assert_eq!(reopened.tracker(), net.chain.tracker());

        let other = GenesisConfig::new(2_000);
        assert!(matches!(
            BufferedChain::open(net.db.clone(), ChainParams::devnet(), &other),
            Err(ChainError::ChainInconsistency(_))
        ));
    }

    #[test]
    fn test_block_on_tip_is_finalized() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let block = block_on(&net.chain, &genesis, &net.heavy, 0, vec![]);

        assert_eq!(net.chain.accept(block.clone()).unwrap(), AcceptOutcome::Finalized);
        assert_eq!(net.chain.tip().hash, block.hash());
        assert_eq!(net.chain.view().read().tip.height, 1);
        let reward = net.chain.schedule().block_reward(1);
        assert_eq!(
            net.chain.address_store().get(&net.heavy.address()).unwrap().balance,
            reward
        );
        assert_eq!(net.chain.take_events(), vec![ChainEvent::Finalized(block.clone())]);

        assert_eq!(
            net.chain.accept(block.clone()).unwrap(),
            AcceptOutcome::Rejected(ChainError::DuplicateBlock(block.hash()))
        );
    }

    #[test]
    fn test_orphan_waits_for_parent() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let b1 = block_on(&net.chain, &genesis, &net.heavy, 0, vec![]);
        let b2 = block_on(&net.chain, &b1, &net.heavy, 1, vec![]);

        assert_eq!(net.chain.accept(b2.clone()).unwrap(), AcceptOutcome::Pending);
        assert_eq!(net.chain.pending_count(), 1);
        // Offered again while still waiting
        assert_eq!(net.chain.accept(b2.clone()).unwrap(), AcceptOutcome::Pending);
        assert_eq!(net.chain.pending_count(), 1);
        assert_eq!(net.chain.accept(b1).unwrap(), AcceptOutcome::Finalized);
        assert_eq!(net.chain.pending_count(), 0);
        assert_eq!(net.chain.tip().hash, b2.hash());
    }

    #[test]
    fn test_ineligible_producer_rejected_and_remembered() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let block = block_on(&net.chain, &genesis, &net.alice, 0, vec![]);

        let outcome = net.chain.accept(block.clone()).unwrap();
        assert!(matches!(outcome, AcceptOutcome::Rejected(ChainError::StakeIneligible(_))));
        assert_eq!(net.chain.accept(block).unwrap(), outcome);
        assert_eq!(net.chain.height(), 0);
    }

    #[test]
    fn test_wrong_reward_rejected() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let mut block = block_on(&net.chain, &genesis, &net.heavy, 0, vec![]);
        block.header.block_reward += 1;
        net.heavy.sign_header(&mut block.header);
        assert!(matches!(
            net.chain.accept(block).unwrap(),
            AcceptOutcome::Rejected(ChainError::MalformedBlock(_))
        ));
    }

    #[test]
    fn test_tampered_header_rejected() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let mut block = block_on(&net.chain, &genesis, &net.heavy, 0, vec![]);
        block.header.timestamp += 1;
        assert!(matches!(
            net.chain.accept(block).unwrap(),
            AcceptOutcome::Rejected(ChainError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_heavier_sibling_reorgs() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let light = block_on(&net.chain, &genesis, &net.light, 0, vec![]);
        let heavy = block_on(&net.chain, &genesis, &net.heavy, 0, vec![]);

        assert_eq!(net.chain.accept(light.clone()).unwrap(), AcceptOutcome::Finalized);
        net.chain.take_events();
        assert_eq!(net.chain.accept(heavy.clone()).unwrap(), AcceptOutcome::Finalized);
        assert_eq!(net.chain.tip().hash, heavy.hash());
        assert_eq!(
            net.chain.take_events(),
            vec![ChainEvent::Displaced(light.clone()), ChainEvent::Finalized(heavy)]
        );
        assert_eq!(
            net.chain.address_store().get(&net.light.address()).unwrap().balance,
            0
        );
        assert!(!net.chain.block_store().contains_block(&light.hash()).unwrap());
    }

    #[test]
    fn test_lighter_sibling_stays_buffered_then_pruned() {
        let mut net = setup();
        let genesis = tip_block(&net.chain);
        let heavy = block_on(&net.chain, &genesis, &net.heavy, 0, vec![]);
        let light = block_on(&net.chain, &genesis, &net.light, 0, vec![]);

        assert_eq!(net.chain.accept(heavy.clone()).unwrap(), AcceptOutcome::Finalized);
        assert_eq!(net.chain.accept(light.clone()).unwrap(), AcceptOutcome::Buffered);
        assert!(net.chain.is_buffered(&light.hash()));

        let mut parent = heavy;
        for ots in 1..=net.chain.params().retention_depth + 1 {
            let next = block_on(&net.chain, &parent, &net.heavy, ots, vec![]);
            assert_eq!(net.chain.accept(next.clone()).unwrap(), AcceptOutcome::Finalized);
            parent = next;
        }
        assert_eq!(net.chain.buffered_count(), 0);
    }

    #[test]
    fn test_build_block_includes_valid_candidates() {
        let mut net = setup();
        let bob = Keypair::from_seed(&[2u8; 32]);
        let mut tx = Transaction::transfer(net.alice.public_key(), bob.address(), 100, 5, 0);
        net.alice.sign_transaction(&mut tx);
        // More than bob receives from alice in the same block
        let mut broke = Transaction::transfer(bob.public_key(), net.alice.address(), 500, 0, 0);
        bob.sign_transaction(&mut broke);

        let block = net.chain.build_block(&net.heavy, 2_000, &[tx.clone(), broke]).unwrap();
        assert_eq!(block.tx_count(), 2);
        assert_eq!(net.chain.accept(block).unwrap(), AcceptOutcome::Finalized);

        let alice = net.chain.address_store().get(&net.alice.address()).unwrap();
        assert_eq!(alice.balance, 895);
        let location = net.chain.block_store().get_tx_location(&tx.txhash()).unwrap().unwrap();
        assert_eq!((location.height, location.index), (1, 1));

        assert!(matches!(
            net.chain.build_block(&net.alice, 2_000, &[]),
            Err(ChainError::StakeIneligible(_))
        ));
    }
}
