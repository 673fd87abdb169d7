//! Address state store - committed per-address ledger state

use crate::db::{Column, PersistentStore, WriteBatch};
use crate::error::StorageError;
use crate::{decode, encode};
use quanta_types::{Address, AddressState, Hash};
use std::sync::Arc;

/// Typed view over the address column.
#[derive(Clone)]
pub struct AddressStateStore {
    db: Arc<dyn PersistentStore>,
}

impl AddressStateStore {
    pub fn new(db: Arc<dyn PersistentStore>) -> Self {
        Self { db }
    }

    /// State of an address; the zero state if it has never been written.
    pub fn get(&self, address: &Address) -> Result<AddressState, StorageError> {
        Ok(self.find(address)?.unwrap_or_default())
    }

    /// State of an address that must already exist.
    pub fn get_existing(&self, address: &Address) -> Result<AddressState, StorageError> {
        self.find(address)?
            .ok_or_else(|| StorageError::NotFound(format!("address {}", address)))
    }

    pub fn contains(&self, address: &Address) -> Result<bool, StorageError> {
        self.db.contains(Column::AddressState, address.as_bytes())
    }

    /// Overwrite an address state on its own.
    pub fn put(&self, address: &Address, state: &AddressState) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        self.stage(&mut batch, address, state)?;
        self.db.write(batch)
    }

    /// Stage an overwrite into a batch committed by the caller.
    pub fn stage(
        &self,
        batch: &mut WriteBatch,
        address: &Address,
        state: &AddressState,
    ) -> Result<(), StorageError> {
        batch.put(Column::AddressState, address.as_bytes(), encode(state)?);
        Ok(())
    }

    /// Stage removal of an address (rollback of its first appearance).
    pub fn stage_delete(&self, batch: &mut WriteBatch, address: &Address) {
        batch.delete(Column::AddressState, address.as_bytes());
    }

    /// Most recent `window` transaction hashes, most recent first.
    pub fn get_tx_hashes(&self, address: &Address, window: usize) -> Result<Vec<Hash>, StorageError> {
        Ok(self.get(address)?.latest_tx_hashes(window))
    }

    /// Stored state, `None` if the address has never been written.
    pub fn find(&self, address: &Address) -> Result<Option<AddressState>, StorageError> {
        self.db
            .get(Column::AddressState, address.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}
