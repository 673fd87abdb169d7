use crate::address::Address;
use crate::hash::Hash;
use crate::signature::{PublicKey, Signature};
use crate::transaction::Transaction;
use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::HashSet;
use std::fmt;

/// Block header: parent linkage plus the producer's stake proof.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    /// Hash of the parent block header
    pub parent_hash: Hash,
    /// Block height (parent height + 1)
    pub height: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Stake validator that produced the block
    pub producer: Address,
    /// Key the producer signed the header with
    pub producer_public_key: PublicKey,
    /// Coins emitted by this block
    pub block_reward: u64,
    /// Digest over the ordered transaction hashes
    pub tx_root: Hash,
    /// Producer signature over `compute_hash()`
    pub signature: Signature,
}

impl BlockHeader {
    /// Create a new unsigned header
    pub fn new(
        parent_hash: Hash,
        height: u64,
        timestamp: u64,
        producer_public_key: PublicKey,
        block_reward: u64,
    ) -> Self {
        Self {
            parent_hash,
            height,
            timestamp,
            producer: producer_public_key.to_address(),
            producer_public_key,
            block_reward,
            tx_root: Hash::ZERO,
            signature: Signature::default(),
        }
    }

    /// Compute the hash of this header (signature excluded)
    pub fn compute_hash(&self) -> Hash {
        let mut data = Vec::with_capacity(184);
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(self.producer.as_bytes());
        data.extend_from_slice(self.producer_public_key.as_bytes());
        data.extend_from_slice(&self.block_reward.to_le_bytes());
        data.extend_from_slice(self.tx_root.as_bytes());
        Hash::compute(&data)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

/// Complete block with header and transactions.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block and seal its transaction root.
    pub fn new(mut header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        header.tx_root = Self::compute_tx_root(&transactions);
        Self { header, transactions }
    }

    /// Genesis block: no parent, no producer, no transactions.
    pub fn genesis(timestamp: u64) -> Self {
        let header = BlockHeader {
            timestamp,
            ..BlockHeader::default()
        };
        Self::new(header, Vec::new())
    }

    /// Digest over the ordered transaction hashes.
    pub fn compute_tx_root(transactions: &[Transaction]) -> Hash {
        transactions
            .iter()
            .fold(Hash::ZERO, |acc, tx| acc.chain(&tx.txhash()))
    }

    pub fn hash(&self) -> Hash {
        self.header.compute_hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    pub fn producer(&self) -> Address {
        self.header.producer
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.is_genesis()
    }

    /// The coinbase claim, which must lead the transaction list.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Sum of all fees, `None` on overflow.
    pub fn total_fees(&self) -> Option<u64> {
        self.transactions
            .iter()
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.fee))
    }

    /// Whether the stored root matches the transaction list.
    pub fn tx_root_matches(&self) -> bool {
        self.header.tx_root == Self::compute_tx_root(&self.transactions)
    }

    /// First transaction hash that occurs more than once, if any.
    pub fn duplicate_transaction(&self) -> Option<Hash> {
        let mut seen = HashSet::with_capacity(self.transactions.len());
        self.transactions
            .iter()
            .map(Transaction::txhash)
            .find(|hash| !seen.insert(*hash))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {{ height: {}, hash: {}, parent: {}, txs: {} }}",
            self.height(),
            self.hash().short(),
            self.parent_hash().short(),
            self.tx_count()
        )
    }
}
