use crate::error::StorageError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Columns for organized data storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    /// Ledger state: address → AddressState
    AddressState,
    /// Finalized blocks: block_hash → Block
    Blocks,
    /// Canonical height index: height (big-endian) → block_hash
    BlockIndex,
    /// Transaction index: tx_hash → TxLocation
    TxIndex,
    /// Undo journal: block_hash → undo record
    Undo,
    /// Metadata: key → value (chain tip, genesis hash)
    Metadata,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::AddressState => "address_state",
            Column::Blocks => "blocks",
            Column::BlockIndex => "block_index",
            Column::TxIndex => "tx_index",
            Column::Undo => "undo",
            Column::Metadata => "metadata",
        }
    }

    pub fn all() -> [Column; 6] {
        [
            Column::AddressState,
            Column::Blocks,
            Column::BlockIndex,
            Column::TxIndex,
            Column::Undo,
            Column::Metadata,
        ]
    }

    pub fn from_name(name: &str) -> Option<Column> {
        Self::all().into_iter().find(|c| c.name() == name)
    }
}

/// One staged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { column: Column, key: Vec<u8>, value: Vec<u8> },
    Delete { column: Column, key: Vec<u8> },
}

/// Write batch for atomic operations.
///
/// Operations apply in insertion order: a later put or delete on the same
/// key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a value into the batch.
    pub fn put(&mut self, column: Column, key: &[u8], value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            column,
            key: key.to_vec(),
            value,
        });
    }

    /// Delete a value in the batch.
    pub fn delete(&mut self, column: Column, key: &[u8]) {
        self.ops.push(BatchOp::Delete {
            column,
            key: key.to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Ordered column store with atomic batch commit.
///
/// Implementations must make a whole `write` visible at once: a reader
/// never observes half of a batch.
pub trait PersistentStore: Send + Sync {
    /// Get a value.
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Apply every operation of the batch atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Put a single value.
    fn put(&self, column: Column, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.put(column, key, value);
        self.write(batch)
    }

    /// Delete a single value.
    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.delete(column, key);
        self.write(batch)
    }

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(column, key)?.is_some())
    }
}

pub(crate) type ColumnMap = BTreeMap<Column, BTreeMap<Vec<u8>, Vec<u8>>>;

/// Apply batch operations to an in-memory column map.
pub(crate) fn apply_ops(data: &mut ColumnMap, batch: WriteBatch) {
    for op in batch.ops {
        match op {
            BatchOp::Put { column, key, value } => {
                data.entry(column).or_default().insert(key, value);
            }
            BatchOp::Delete { column, key } => {
                if let Some(entries) = data.get_mut(&column) {
                    entries.remove(&key);
                }
            }
        }
    }
}

/// In-memory store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<ColumnMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a column.
    pub fn len(&self, column: Column) -> usize {
        self.data.read().get(&column).map_or(0, |c| c.len())
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .data
            .read()
            .get(&column)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        apply_ops(&mut self.data.write(), batch);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Small key space so puts and deletes collide.
    pub(crate) fn arb_batch() -> impl Strategy<Value = WriteBatch> {
        let value = proptest::option::of(proptest::collection::vec(any::<u8>(), 0..8));
        let op = (0usize..6, 0u8..4, value);
        proptest::collection::vec(op, 0..24).prop_map(|ops| {
            let mut batch = WriteBatch::new();
            for (column, key, value) in ops {
                let column = Column::all()[column];
                match value {
                    Some(value) => batch.put(column, &[key], value),
                    None => batch.delete(column, &[key]),
                }
            }
            batch
        })
    }

    /// Every key the batches above can touch.
    pub(crate) fn snapshot(store: &dyn PersistentStore) -> Vec<Option<Vec<u8>>> {
        let mut out = Vec::new();
        for column in Column::all() {
            for key in 0u8..4 {
                out.push(store.get(column, &[key]).unwrap());
            }
        }
        out
    }

    #[test]
    fn test_put_and_get() {
        let db = MemoryStore::new();
        db.put(Column::Metadata, b"key", b"value".to_vec()).unwrap();
        assert_eq!(db.get(Column::Metadata, b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(db.get(Column::Metadata, b"missing").unwrap(), None);
    }

    #[test]
    fn test_columns_are_separate() {
        let db = MemoryStore::new();
        db.put(Column::Blocks, b"k", b"1".to_vec()).unwrap();
        assert_eq!(db.get(Column::Undo, b"k").unwrap(), None);
        assert_eq!(db.len(Column::Blocks), 1);
    }

    #[test]
    fn test_batch_write_applies_in_order() {
        let db = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Metadata, b"key1", b"value1".to_vec());
        batch.put(Column::Metadata, b"key2", b"value2".to_vec());
        batch.delete(Column::Metadata, b"key1");
        assert_eq!(batch.len(), 3);

        db.write(batch).unwrap();
        assert_eq!(db.get(Column::Metadata, b"key1").unwrap(), None);
        assert_eq!(db.get(Column::Metadata, b"key2").unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_delete() {
        let db = MemoryStore::new();
        db.put(Column::TxIndex, b"k", b"v".to_vec()).unwrap();
        db.delete(Column::TxIndex, b"k").unwrap();
        assert!(!db.contains(Column::TxIndex, b"k").unwrap());
    }

    #[test]
    fn test_column_names_roundtrip() {
        for column in Column::all() {
            assert_eq!(Column::from_name(column.name()), Some(column));
        }
        assert_eq!(Column::from_name("governance"), None);
    }

    proptest! {
        #[test]
        fn test_batch_equals_ops_one_by_one(batch in arb_batch()) {
            let batched = MemoryStore::new();
            batched.write(batch.clone()).unwrap();

            let stepwise = MemoryStore::new();
            for op in batch.ops() {
                match op {
                    BatchOp::Put { column, key, value } => {
                        stepwise.put(*column, key, value.clone()).unwrap()
                    }
                    BatchOp::Delete { column, key } => stepwise.delete(*column, key).unwrap(),
                }
            }
            prop_assert_eq!(snapshot(&batched), snapshot(&stepwise));
        }
    }
}
