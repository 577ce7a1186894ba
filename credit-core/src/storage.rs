//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balance` - Current balance snapshot (key: vendor_id)
//! - `transactions` - Append-only transaction log, JSON array (key: vendor_id)
//! - `offline_queue` - Pending remote-sync operations, JSON array (key: vendor_id)
//! - `meta` - Sync/integrity timestamps (key: vendor_id || marker)
//!
//! Values are JSON: the wire contract requires JSON-serializable payloads
//! with ISO-8601 timestamps, so the durable form matches the sync form.

use crate::{
    error::{Error, Result},
    types::{CreditBalance, CreditTransaction, OfflineOperation, VendorId},
    Config,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column family names
const CF_BALANCE: &str = "balance";
const CF_TRANSACTIONS: &str = "transactions";
const CF_QUEUE: &str = "offline_queue";
const CF_META: &str = "meta";

/// Meta key markers
const META_LAST_SYNC: &str = "last_sync_timestamp";
const META_INTEGRITY_CHECK: &str = "data_integrity_last_check";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    // One mutation lock per vendor, shared by every writer
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCE, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_QUEUE, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_META, Self::cf_options_state()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self {
            db: Arc::new(db),
            locks: DashMap::new(),
        })
    }

    /// Per-vendor mutation lock
    ///
    /// Logs and queues are stored as whole arrays, so every writer does a
    /// load-modify-store. Any such writer (ledger mutations, queue state
    /// transitions, sync merges, recovery) must hold this lock for the
    /// entire read-modify-write or it can clobber a concurrent commit.
    pub fn mutation_lock(&self, vendor: &VendorId) -> Arc<Mutex<()>> {
        self.locks
            .entry(vendor.as_str().to_string())
            .or_default()
            .clone()
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn meta_key(vendor: &VendorId, marker: &str) -> Vec<u8> {
        let mut key = vendor.as_str().as_bytes().to_vec();
        key.push(b'|');
        key.extend_from_slice(marker.as_bytes());
        key
    }

    // Balance operations

    /// Get balance snapshot for a vendor, if one exists
    pub fn get_balance(&self, vendor: &VendorId) -> Result<Option<CreditBalance>> {
        let cf = self.cf_handle(CF_BALANCE)?;

        match self.db.get_cf(cf, vendor.as_str().as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Write balance snapshot
    pub fn put_balance(&self, balance: &CreditBalance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCE)?;
        let value = serde_json::to_vec(balance)?;

        self.db
            .put_cf(cf, balance.vendor_id.as_str().as_bytes(), &value)?;

        tracing::debug!(
            vendor_id = %balance.vendor_id,
            balance = balance.current_balance,
            "Balance written"
        );

        Ok(())
    }

    // Transaction log operations

    /// Load the full transaction log for a vendor (empty if none)
    pub fn load_transactions(&self, vendor: &VendorId) -> Result<Vec<CreditTransaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        match self.db.get_cf(cf, vendor.as_str().as_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the transaction log for a vendor
    ///
    /// Used by sync merges and recovery; normal mutations go through
    /// [`Storage::commit_mutation`].
    pub fn replace_transactions(
        &self,
        vendor: &VendorId,
        transactions: &[CreditTransaction],
    ) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = serde_json::to_vec(transactions)?;
        self.db.put_cf(cf, vendor.as_str().as_bytes(), &value)?;
        Ok(())
    }

    // Offline queue operations

    /// Load queued operations for a vendor in FIFO order
    pub fn load_operations(&self, vendor: &VendorId) -> Result<Vec<OfflineOperation>> {
        let cf = self.cf_handle(CF_QUEUE)?;

        match self.db.get_cf(cf, vendor.as_str().as_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the operation queue for a vendor
    pub fn replace_operations(
        &self,
        vendor: &VendorId,
        operations: &[OfflineOperation],
    ) -> Result<()> {
        let cf = self.cf_handle(CF_QUEUE)?;
        let value = serde_json::to_vec(operations)?;
        self.db.put_cf(cf, vendor.as_str().as_bytes(), &value)?;
        Ok(())
    }

    // Atomic mutation commit

    /// Commit a ledger mutation atomically
    ///
    /// New balance snapshot, the full transaction log (with the new entry
    /// appended by the caller), and the full operation queue land in a
    /// single WriteBatch: either the mutation and its queued replay both
    /// persist, or neither does.
    pub fn commit_mutation(
        &self,
        balance: &CreditBalance,
        transactions: &[CreditTransaction],
        operations: &[OfflineOperation],
    ) -> Result<()> {
        let vendor = &balance.vendor_id;
        let mut batch = WriteBatch::default();

        let cf_balance = self.cf_handle(CF_BALANCE)?;
        batch.put_cf(
            cf_balance,
            vendor.as_str().as_bytes(),
            serde_json::to_vec(balance)?,
        );

        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(
            cf_tx,
            vendor.as_str().as_bytes(),
            serde_json::to_vec(transactions)?,
        );

        let cf_queue = self.cf_handle(CF_QUEUE)?;
        batch.put_cf(
            cf_queue,
            vendor.as_str().as_bytes(),
            serde_json::to_vec(operations)?,
        );

        self.db.write(batch)?;

        tracing::debug!(
            vendor_id = %vendor,
            balance = balance.current_balance,
            transactions = transactions.len(),
            queued = operations.len(),
            "Mutation committed"
        );

        Ok(())
    }

    // Meta operations

    /// Record the last successful sync time
    pub fn set_last_sync(&self, vendor: &VendorId, at: DateTime<Utc>) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        let key = Self::meta_key(vendor, META_LAST_SYNC);
        self.db.put_cf(cf, key, serde_json::to_vec(&at)?)?;
        Ok(())
    }

    /// Last successful sync time, if any
    pub fn last_sync(&self, vendor: &VendorId) -> Result<Option<DateTime<Utc>>> {
        let cf = self.cf_handle(CF_META)?;
        let key = Self::meta_key(vendor, META_LAST_SYNC);

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Record the last integrity check time
    pub fn set_integrity_checked(&self, vendor: &VendorId, at: DateTime<Utc>) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        let key = Self::meta_key(vendor, META_INTEGRITY_CHECK);
        self.db.put_cf(cf, key, serde_json::to_vec(&at)?)?;
        Ok(())
    }

    /// Last integrity check time, if any
    pub fn integrity_checked(&self, vendor: &VendorId) -> Result<Option<DateTime<Utc>>> {
        let cf = self.cf_handle(CF_META)?;
        let key = Self::meta_key(vendor, META_INTEGRITY_CHECK);

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Wipe all durable state for a vendor
    ///
    /// Recovery-only. Balance, transaction log, operation queue and meta
    /// markers are deleted in one batch.
    pub fn clear_vendor_state(&self, vendor: &VendorId) -> Result<()> {
        let mut batch = WriteBatch::default();
        let key = vendor.as_str().as_bytes();

        batch.delete_cf(self.cf_handle(CF_BALANCE)?, key);
        batch.delete_cf(self.cf_handle(CF_TRANSACTIONS)?, key);
        batch.delete_cf(self.cf_handle(CF_QUEUE)?, key);
        batch.delete_cf(
            self.cf_handle(CF_META)?,
            Self::meta_key(vendor, META_LAST_SYNC),
        );
        batch.delete_cf(
            self.cf_handle(CF_META)?,
            Self::meta_key(vendor, META_INTEGRITY_CHECK),
        );

        self.db.write(batch)?;

        tracing::warn!(vendor_id = %vendor, "Vendor state cleared");

        Ok(())
    }
}
