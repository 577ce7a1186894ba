//! Remote ledger collaborators
//!
//! The engine talks to the outside world through two seams the host
//! injects: a client for the server-side ledger and an oracle for
//! connectivity. Transport is the host's concern; the engine only sees
//! these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credit_core::{CreditBalance, CreditTransaction, Result, TransactionId, VendorId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Parameters for a comprehensive sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Vendor to sync
    pub vendor_id: VendorId,
    /// Lower bound for transaction history, None for everything
    pub since: Option<DateTime<Utc>>,
}

/// Server-side view of one vendor's ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Balance as the server knows it
    pub balance: CreditBalance,
    /// Transaction log as the server knows it
    pub transactions: Vec<CreditTransaction>,
}

/// Acknowledgement for a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// ID the server filed the transaction under
    pub transaction_id: TransactionId,
    /// Server-assigned record ID, when the server mints one
    pub server_id: Option<String>,
    /// When the server accepted it
    pub accepted_at: DateTime<Utc>,
}

/// Client for the server-side ledger
#[async_trait]
pub trait RemoteLedgerClient: Send + Sync {
    /// Fetch the server's balance for a vendor
    async fn fetch_balance(&self, vendor: &VendorId) -> Result<CreditBalance>;

    /// Fetch transactions recorded since the given time, or all of them
    async fn fetch_transactions_since(
        &self,
        vendor: &VendorId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CreditTransaction>>;

    /// Submit one locally recorded transaction
    ///
    /// Must be idempotent on the server side: replaying the same
    /// transaction ID twice records it once.
    async fn submit_transaction(
        &self,
        vendor: &VendorId,
        transaction: &CreditTransaction,
    ) -> Result<SubmitReceipt>;

    /// Fetch balance and transaction history in one round trip
    async fn comprehensive_sync(&self, request: SyncRequest) -> Result<SyncSnapshot>;
}

/// Connectivity signal
pub trait NetworkOracle: Send + Sync {
    /// Current connectivity
    fn is_online(&self) -> bool;

    /// Subscribe to connectivity changes
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Oracle backed by a watch channel the host flips
pub struct WatchOracle {
    state: watch::Sender<bool>,
}

impl WatchOracle {
    /// Create an oracle with the given initial state
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Flip connectivity
    pub fn set_online(&self, online: bool) {
        self.state.send_replace(online);
    }
}

impl NetworkOracle for WatchOracle {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
