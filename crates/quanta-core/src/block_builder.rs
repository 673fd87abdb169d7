//! Block building for stake validators.

use crate::error::ChainError;
use crate::executor::{apply_transaction, begin_block, ApplyOutcome, BlockContext};
use crate::overlay::StateOverlay;
use quanta_crypto::Keypair;
use quanta_types::{Block, BlockHeader, Hash, Transaction};

/// Builds the next block on top of a parent, applying each candidate to a
/// private overlay so only transactions that apply make it in.
pub struct BlockBuilder<'a> {
    overlay: StateOverlay<'a>,
    parent_hash: Hash,
    ctx: BlockContext,
    transactions: Vec<Transaction>,
    max_transactions: usize,
}

impl<'a> BlockBuilder<'a> {
    /// Start a block at `height` with the producer's coinbase claim.
    pub fn new(
        mut overlay: StateOverlay<'a>,
        parent_hash: Hash,
        height: u64,
        block_reward: u64,
        blocks_per_epoch: u64,
        max_transactions: usize,
        producer: &Keypair,
    ) -> Result<Self, ChainError> {
        let ctx = BlockContext {
            height,
            producer: producer.address(),
            block_reward,
        };
        begin_block(&mut overlay, height, blocks_per_epoch)?;

        // Next unused one-time index of the producer key
        let state = overlay.get(&ctx.producer)?;
        let ots = state
            .ots_watermark(&producer.public_key().digest())
            .map_or(0, |w| w + 1);
        let mut coinbase = Transaction::coinbase(producer.public_key(), ots);
        producer.sign_transaction(&mut coinbase);
        apply_transaction(&mut overlay, &coinbase, 0, &ctx)?;

        Ok(Self {
            overlay,
            parent_hash,
            ctx,
            transactions: vec![coinbase],
            max_transactions,
        })
    }

    /// Try to add a transaction. Returns false once the block is full.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<bool, ChainError> {
        if self.is_full() {
            return Ok(false);
        }
        let position = self.transactions.len();
        match apply_transaction(&mut self.overlay, &tx, position, &self.ctx)? {
            (ApplyOutcome::Applied, _) => {
                self.transactions.push(tx);
                Ok(true)
            }
            (ApplyOutcome::AlreadyApplied, _) => Err(ChainError::DuplicateTransaction(tx.txhash())),
        }
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() >= self.max_transactions
    }

    /// Get the number of transactions, coinbase included.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Seal and sign the block.
    pub fn finalize(self, producer: &Keypair, timestamp: u64) -> Block {
        let header = BlockHeader::new(
            self.parent_hash,
            self.ctx.height,
            timestamp,
            producer.public_key(),
            self.ctx.block_reward,
        );
        let mut block = Block::new(header, self.transactions);
        producer.sign_header(&mut block.header);
        block
    }
}
