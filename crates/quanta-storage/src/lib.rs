//! Quanta Storage - Column-oriented key-value storage for the ledger.
//!
//! Two engines implement [`PersistentStore`]: [`MemoryStore`] for tests and
//! ephemeral nodes, and [`RocksStore`], RocksDB with one column family per
//! [`Column`]. Typed views on top of them ([`AddressStateStore`],
//! [`BlockStore`]) stage their writes into a [`WriteBatch`] so a block
//! commits in one atomic write.

pub mod address_store;
pub mod block_store;
pub mod db;
pub mod error;
pub mod rocks_store;

pub use address_store::AddressStateStore;
pub use block_store::{BlockStore, ChainTip, TxLocation};
pub use db::{Column, MemoryStore, PersistentStore, WriteBatch};
pub use error::StorageError;
pub use rocks_store::{RocksConfig, RocksStore};

use borsh::{BorshDeserialize, BorshSerialize};

/// Encode a value for storage.
pub(crate) fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    borsh::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decode a stored value.
pub(crate) fn decode<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, StorageError> {
    borsh::from_slice(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
}
