//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `transactions` - Transaction records (key: transaction_id)
//! - `payloads` - Raw document bytes (key: payload ref)
//! - `distributions` - Distribution records (key: transaction_id || seq)
//! - `indices` - Status index (key: status || transaction_id || seq)
//!
//! The status index is maintained in the same write batch as every
//! distribution write, so a status scan never observes a record the
//! index disagrees with.

use crate::{
    error::{Error, Result},
    types::{Distribution, DistributionStatus, PayloadRef, TransactionRecord},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_TRANSACTIONS: &str = "transactions";
const CF_PAYLOADS: &str = "payloads";
const CF_DISTRIBUTIONS: &str = "distributions";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_PAYLOADS, Self::cf_options_payloads()),
            ColumnFamilyDescriptor::new(CF_DISTRIBUTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Records are small and frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_payloads() -> Options {
        let mut opts = Options::default();
        // Document bodies are write-once, read-rarely
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Index key helpers

    fn index_key(status: DistributionStatus, transaction_id: Uuid, seq: u32) -> [u8; 21] {
        let mut key = [0u8; 21];
        key[0] = status as u8;
        key[1..17].copy_from_slice(transaction_id.as_bytes());
        key[17..].copy_from_slice(&seq.to_be_bytes());
        key
    }

    fn parse_index_key(key: &[u8]) -> Option<(Uuid, u32)> {
        if key.len() != 21 {
            return None;
        }
        let id_bytes: [u8; 16] = key[1..17].try_into().ok()?;
        let seq_bytes: [u8; 4] = key[17..].try_into().ok()?;
        Some((Uuid::from_bytes(id_bytes), u32::from_be_bytes(seq_bytes)))
    }

    // Intake

    /// Persist a transaction record, its payload, and its distribution
    /// set in one atomic, synced write batch
    ///
    /// Nothing is visible to readers until the batch commits, and the
    /// payload is durable before this returns.
    pub fn create_transaction(
        &self,
        record: &TransactionRecord,
        payload: &[u8],
        distributions: &[Distribution],
    ) -> Result<()> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_payloads = self.cf_handle(CF_PAYLOADS)?;
        let cf_distributions = self.cf_handle(CF_DISTRIBUTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        batch.put_cf(&cf_payloads, record.payload_ref.as_key(), payload);

        let record_value = bincode::serialize(record)?;
        batch.put_cf(&cf_transactions, record.transaction_id.as_bytes(), &record_value);

        for dist in distributions {
            let key = Distribution::key(dist.transaction_id, dist.seq);
            let value = bincode::serialize(dist)?;
            batch.put_cf(&cf_distributions, key, &value);

            let idx = Self::index_key(dist.status, dist.transaction_id, dist.seq);
            batch.put_cf(&cf_indices, idx, b"");
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            transaction_id = %record.transaction_id,
            distributions = distributions.len(),
            payload_bytes = payload.len(),
            "Transaction persisted"
        );

        Ok(())
    }

    // Transaction operations

    /// Get transaction record by id
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<TransactionRecord> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let value = self
            .db
            .get_cf(&cf, transaction_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;

        let record: TransactionRecord = bincode::deserialize(&value)?;
        Ok(record)
    }

    /// Get payload bytes by reference
    pub fn get_payload(&self, payload_ref: &PayloadRef) -> Result<Vec<u8>> {
        let cf = self.cf_handle(CF_PAYLOADS)?;

        self.db
            .get_cf(&cf, payload_ref.as_key())?
            .ok_or_else(|| Error::Storage("Payload missing for stored transaction".to_string()))
    }

    /// List transaction records in key order (UUIDv7 keys give
    /// submission order)
    pub fn list_transactions(&self, offset: usize, limit: usize) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start).skip(offset) {
            if records.len() >= limit {
                break;
            }
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }

        Ok(records)
    }

    // Distribution operations

    /// Get one distribution by (transaction, seq)
    pub fn get_distribution(&self, transaction_id: Uuid, seq: u32) -> Result<Distribution> {
        let cf = self.cf_handle(CF_DISTRIBUTIONS)?;
        let key = Distribution::key(transaction_id, seq);

        let value = self.db.get_cf(&cf, key)?.ok_or_else(|| {
            Error::DistributionNotFound(format!("{}/{}", transaction_id, seq))
        })?;

        let dist: Distribution = bincode::deserialize(&value)?;
        Ok(dist)
    }

    /// List a transaction's distributions in creation (seq) order
    pub fn list_distributions(&self, transaction_id: Uuid) -> Result<Vec<Distribution>> {
        let cf = self.cf_handle(CF_DISTRIBUTIONS)?;
        let prefix = transaction_id.as_bytes();

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut distributions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            distributions.push(bincode::deserialize::<Distribution>(&value)?);
        }

        Ok(distributions)
    }

    /// Write updated distributions with their index moves, atomically
    ///
    /// `updates` pairs each record with the status its index entry
    /// currently carries. Callers serialize conflicting updates; this
    /// only guarantees batch atomicity.
    pub fn write_distributions(
        &self,
        updates: &[(DistributionStatus, Distribution)],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let cf_distributions = self.cf_handle(CF_DISTRIBUTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        for (old_status, dist) in updates {
            let key = Distribution::key(dist.transaction_id, dist.seq);
            let value = bincode::serialize(dist)?;
            batch.put_cf(&cf_distributions, key, &value);

            if *old_status != dist.status {
                let old_idx = Self::index_key(*old_status, dist.transaction_id, dist.seq);
                batch.delete_cf(&cf_indices, old_idx);
            }
            let new_idx = Self::index_key(dist.status, dist.transaction_id, dist.seq);
            batch.put_cf(&cf_indices, new_idx, b"");
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Fetch all distributions currently indexed under a status, in
    /// index (transaction, seq) order
    pub fn distributions_with_status(
        &self,
        status: DistributionStatus,
    ) -> Result<Vec<Distribution>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = [status as u8];

        let iter = self
            .db
            .iterator_cf(&cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut distributions = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if key.first() != Some(&(status as u8)) {
                break;
            }

            if let Some((transaction_id, seq)) = Self::parse_index_key(&key) {
                distributions.push(self.get_distribution(transaction_id, seq)?);
            }
        }

        Ok(distributions)
    }
}
