//! RocksDB-backed store, one column family per [`Column`].

use crate::db::{BatchOp, Column, PersistentStore, WriteBatch};
use crate::error::StorageError;
use rocksdb::{ColumnFamilyDescriptor, Options, WriteOptions, DB};
use std::path::Path;

/// Tuning knobs for the on-disk store.
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Block cache size in MB
    pub cache_size_mb: usize,
    pub max_open_files: i32,
    /// Write buffer size in MB
    pub write_buffer_size_mb: usize,
    /// LZ4 compression of table files
    pub compress: bool,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 256,
            max_open_files: 1024,
            write_buffer_size_mb: 64,
            compress: true,
        }
    }
}

impl RocksConfig {
    fn compression(&self) -> rocksdb::DBCompressionType {
        if self.compress {
            rocksdb::DBCompressionType::Lz4
        } else {
            rocksdb::DBCompressionType::None
        }
    }
}

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open (or create) a store at the given path with default tuning.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with(path, &RocksConfig::default())
    }

    pub fn open_with(path: &Path, config: &RocksConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);

        let cache = rocksdb::Cache::new_lru_cache(config.cache_size_mb * 1024 * 1024);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_block_cache(&cache);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(config.compression());
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Column::all()
            .into_iter()
            .map(|column| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(config.compression());
                ColumnFamilyDescriptor::new(column.name(), cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        tracing::info!(path = %path.display(), "Opened RocksDB store");
        Ok(Self { db })
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    fn cf(&self, column: Column) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(column.name())
            .ok_or_else(|| StorageError::InvalidColumnFamily(column.name().to_string()))
    }
}

impl PersistentStore for RocksStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(column)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.ops() {
            match op {
                BatchOp::Put { column, key, value } => {
                    rocks_batch.put_cf(self.cf(*column)?, key, value)
                }
                BatchOp::Delete { column, key } => rocks_batch.delete_cf(self.cf(*column)?, key),
            }
        }

        // Synced: the WAL is fsynced before the write returns
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(rocks_batch, &write_opts)?;
        tracing::trace!(ops, "Batch persisted");
        Ok(())
    }
}
