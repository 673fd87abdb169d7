//! Block store - finalized blocks, canonical index and undo journal

use crate::db::{Column, PersistentStore, WriteBatch};
use crate::error::StorageError;
use crate::{decode, encode};
use borsh::{BorshDeserialize, BorshSerialize};
use quanta_types::{Block, Hash};
use std::sync::Arc;

const TIP_KEY: &[u8] = b"tip";
const GENESIS_KEY: &[u8] = b"genesis";

/// Where a finalized transaction lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxLocation {
    pub block_hash: Hash,
    pub height: u64,
    pub index: u32,
}

/// Head of the finalized chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChainTip {
    pub hash: Hash,
    pub height: u64,
}

/// Typed view over the block, index, undo and metadata columns.
#[derive(Clone)]
pub struct BlockStore {
    db: Arc<dyn PersistentStore>,
}

impl BlockStore {
    pub fn new(db: Arc<dyn PersistentStore>) -> Self {
        Self { db }
    }

    /// Get a finalized block by hash.
    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        self.db
            .get(Column::Blocks, hash.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn contains_block(&self, hash: &Hash) -> Result<bool, StorageError> {
        self.db.contains(Column::Blocks, hash.as_bytes())
    }

    /// Canonical block hash at a height.
    pub fn get_hash_at(&self, height: u64) -> Result<Option<Hash>, StorageError> {
        self.db
            .get(Column::BlockIndex, &height.to_be_bytes())?
            .map(|bytes| Hash::from_slice(&bytes).map_err(StorageError::from))
            .transpose()
    }

    /// Canonical block at a height.
    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.get_hash_at(height)? {
            Some(hash) => self.get_block(&hash),
            None => Ok(None),
        }
    }

    pub fn get_tx_location(&self, txhash: &Hash) -> Result<Option<TxLocation>, StorageError> {
        self.db
            .get(Column::TxIndex, txhash.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Undo record of a finalized block.
    pub fn get_undo<T: BorshDeserialize>(&self, hash: &Hash) -> Result<Option<T>, StorageError> {
        self.db
            .get(Column::Undo, hash.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn tip(&self) -> Result<Option<ChainTip>, StorageError> {
        self.db
            .get(Column::Metadata, TIP_KEY)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn genesis_hash(&self) -> Result<Option<Hash>, StorageError> {
        self.db
            .get(Column::Metadata, GENESIS_KEY)?
            .map(|bytes| Hash::from_slice(&bytes).map_err(StorageError::from))
            .transpose()
    }

    /// Stage a block as canonical: body, height index and tx index.
    pub fn stage_block(&self, batch: &mut WriteBatch, block: &Block) -> Result<(), StorageError> {
        let hash = block.hash();
        let height = block.height();
        batch.put(Column::Blocks, hash.as_bytes(), encode(block)?);
        batch.put(Column::BlockIndex, &height.to_be_bytes(), hash.as_bytes().to_vec());
        for (index, tx) in block.transactions.iter().enumerate() {
            let location = TxLocation {
                block_hash: hash,
                height,
                index: index as u32,
            };
            batch.put(Column::TxIndex, tx.txhash().as_bytes(), encode(&location)?);
        }
        Ok(())
    }

    /// Stage removal of a canonical block with its indexes and undo record.
    pub fn stage_remove_block(&self, batch: &mut WriteBatch, block: &Block) {
        let hash = block.hash();
        batch.delete(Column::Blocks, hash.as_bytes());
        batch.delete(Column::BlockIndex, &block.height().to_be_bytes());
        batch.delete(Column::Undo, hash.as_bytes());
        for tx in &block.transactions {
            batch.delete(Column::TxIndex, tx.txhash().as_bytes());
        }
    }

    pub fn stage_undo<T: BorshSerialize>(
        &self,
        batch: &mut WriteBatch,
        hash: &Hash,
        undo: &T,
    ) -> Result<(), StorageError> {
        batch.put(Column::Undo, hash.as_bytes(), encode(undo)?);
        Ok(())
    }

    pub fn stage_tip(&self, batch: &mut WriteBatch, tip: &ChainTip) -> Result<(), StorageError> {
        batch.put(Column::Metadata, TIP_KEY, encode(tip)?);
        Ok(())
    }

    /// Read a named metadata value.
    pub fn get_meta<T: BorshDeserialize>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.db
            .get(Column::Metadata, key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn stage_meta<T: BorshSerialize>(
        &self,
        batch: &mut WriteBatch,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        batch.put(Column::Metadata, key.as_bytes(), encode(value)?);
        Ok(())
    }

    pub fn stage_genesis(&self, batch: &mut WriteBatch, hash: &Hash) {
        batch.put(Column::Metadata, GENESIS_KEY, hash.as_bytes().to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use quanta_types::{BlockHeader, PublicKey, Transaction};

    fn block(height: u64, parent: Hash) -> Block {
        let producer = PublicKey::from_bytes([1u8; 32]);
        let header = BlockHeader::new(parent, height, 1_000 + height, producer, 50);
        Block::new(header, vec![Transaction::coinbase(producer, height)])
    }

    #[test]
    fn test_stage_and_read_block() {
        let db = Arc::new(MemoryStore::new());
        let store = BlockStore::new(db.clone());
        let b1 = block(1, Hash::compute(b"genesis"));

        let mut batch = WriteBatch::new();
        store.stage_block(&mut batch, &b1).unwrap();
        store
            .stage_tip(&mut batch, &ChainTip { hash: b1.hash(), height: 1 })
            .unwrap();
        db.write(batch).unwrap();

        assert_eq!(store.get_block(&b1.hash()).unwrap(), Some(b1.clone()));
        assert_eq!(store.get_hash_at(1).unwrap(), Some(b1.hash()));
        assert_eq!(store.get_block_by_height(1).unwrap(), Some(b1.clone()));
        assert_eq!(store.get_block_by_height(2).unwrap(), None);
        assert_eq!(store.tip().unwrap(), Some(ChainTip { hash: b1.hash(), height: 1 }));

        let loc = store
            .get_tx_location(&b1.transactions[0].txhash())
            .unwrap()
            .unwrap();
        assert_eq!(loc, TxLocation { block_hash: b1.hash(), height: 1, index: 0 });
    }

    #[test]
    fn test_remove_block_clears_indexes() {
        let db = Arc::new(MemoryStore::new());
        let store = BlockStore::new(db.clone());
        let b1 = block(1, Hash::ZERO);

        let mut batch = WriteBatch::new();
        store.stage_block(&mut batch, &b1).unwrap();
        store.stage_undo(&mut batch, &b1.hash(), &vec![7u64]).unwrap();
        db.write(batch).unwrap();
        assert_eq!(store.get_undo::<Vec<u64>>(&b1.hash()).unwrap(), Some(vec![7]));

        let mut batch = WriteBatch::new();
        store.stage_remove_block(&mut batch, &b1);
        db.write(batch).unwrap();

        assert!(!store.contains_block(&b1.hash()).unwrap());
        assert_eq!(store.get_hash_at(1).unwrap(), None);
        assert_eq!(store.get_undo::<Vec<u64>>(&b1.hash()).unwrap(), None);
        assert_eq!(store.get_tx_location(&b1.transactions[0].txhash()).unwrap(), None);
    }

    #[test]
    fn test_genesis_hash_metadata() {
        let db = Arc::new(MemoryStore::new());
        let store = BlockStore::new(db.clone());
        assert_eq!(store.genesis_hash().unwrap(), None);

        let mut batch = WriteBatch::new();
        store.stage_genesis(&mut batch, &Hash::compute(b"g"));
        db.write(batch).unwrap();
        assert_eq!(store.genesis_hash().unwrap(), Some(Hash::compute(b"g")));
    }

    #[test]
    fn test_named_metadata() {
        let db = Arc::new(MemoryStore::new());
        let store = BlockStore::new(db.clone());
        assert_eq!(store.get_meta::<u64>("epoch").unwrap(), None);

        let mut batch = WriteBatch::new();
        store.stage_meta(&mut batch, "epoch", &3u64).unwrap();
        db.write(batch).unwrap();
        assert_eq!(store.get_meta::<u64>("epoch").unwrap(), Some(3));
    }
}
