//! Shared fixtures for this crate's tests

use crate::remote::{RemoteLedgerClient, SubmitReceipt, SyncRequest, SyncSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credit_core::{
    Config, CreditBalance, CreditTransaction, Error, Result, Storage, SyncStatus, VendorId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub fn open_storage() -> (Arc<Storage>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (Arc::new(Storage::open(&config).unwrap()), temp_dir)
}

/// In-memory stand-in for the server-side ledger
///
/// Scriptable failures: the next N fetches or submits fail with a network
/// error, then behavior returns to normal.
pub struct MockRemoteLedger {
    balance: Mutex<CreditBalance>,
    transactions: Mutex<Vec<CreditTransaction>>,
    pub submitted: Mutex<Vec<CreditTransaction>>,
    submit_failures: AtomicU32,
    fetch_failures: AtomicU32,
}

impl MockRemoteLedger {
    pub fn new(vendor: &VendorId) -> Self {
        let mut balance = CreditBalance::zero(vendor.clone());
        balance.sync_status = SyncStatus::Synced;
        Self {
            balance: Mutex::new(balance),
            transactions: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            submit_failures: AtomicU32::new(0),
            fetch_failures: AtomicU32::new(0),
        }
    }

    pub fn set_balance(&self, amount: u64) {
        self.set_balance_at(amount, Utc::now());
    }

    pub fn set_balance_at(&self, amount: u64, at: DateTime<Utc>) {
        let mut balance = self.balance.lock();
        balance.current_balance = amount;
        balance.last_updated = at;
    }

    pub fn set_transactions(&self, transactions: Vec<CreditTransaction>) {
        *self.transactions.lock() = transactions;
    }

    pub fn fail_next_submits(&self, n: u32) {
        self.submit_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    pub fn balance(&self) -> u64 {
        self.balance.lock().current_balance
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.submitted
            .lock()
            .iter()
            .map(|t| t.id.as_str().to_string())
            .collect()
    }

    fn consume_failure(counter: &AtomicU32) -> bool {
        if counter.load(Ordering::SeqCst) > 0 {
            counter.fetch_sub(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl RemoteLedgerClient for MockRemoteLedger {
    async fn fetch_balance(&self, _vendor: &VendorId) -> Result<CreditBalance> {
        if Self::consume_failure(&self.fetch_failures) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(self.balance.lock().clone())
    }

    async fn fetch_transactions_since(
        &self,
        _vendor: &VendorId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CreditTransaction>> {
        if Self::consume_failure(&self.fetch_failures) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(self
            .transactions
            .lock()
            .iter()
            .filter(|t| since.map_or(true, |s| t.timestamp >= s))
            .cloned()
            .collect())
    }

    async fn submit_transaction(
        &self,
        _vendor: &VendorId,
        transaction: &CreditTransaction,
    ) -> Result<SubmitReceipt> {
        if Self::consume_failure(&self.submit_failures) {
            return Err(Error::Network("connection refused".to_string()));
        }

        self.submitted.lock().push(transaction.clone());

        // Idempotent: a replayed ID records once
        let mut log = self.transactions.lock();
        if !log.iter().any(|t| t.id == transaction.id) {
            log.push(transaction.clone());
            let mut balance = self.balance.lock();
            let updated = balance.current_balance as i64 + transaction.signed_delta();
            balance.current_balance = updated.max(0) as u64;
            balance.last_updated = Utc::now();
        }

        Ok(SubmitReceipt {
            transaction_id: transaction.id.clone(),
            server_id: Some(format!("srv-{}", transaction.id)),
            accepted_at: Utc::now(),
        })
    }

    async fn comprehensive_sync(&self, request: SyncRequest) -> Result<SyncSnapshot> {
        if Self::consume_failure(&self.fetch_failures) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(SyncSnapshot {
            balance: self.balance.lock().clone(),
            transactions: self
                .transactions
                .lock()
                .iter()
                .filter(|t| request.since.map_or(true, |s| t.timestamp >= s))
                .cloned()
                .collect(),
        })
    }
}
