//! Core types for the credit ledger
//!
//! All types serialize to JSON with ISO-8601 timestamps. Credits are integer
//! units; monetary side-values (order value, payment amount) use exact
//! decimal arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Vendor identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorId(String);

impl VendorId {
    /// Create new vendor ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque transaction identifier
///
/// Constrained to `[A-Za-z0-9_-]`, 5 to 100 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Validate and wrap an externally supplied ID
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let valid_len = (5..=100).contains(&id.len());
        let valid_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid_len && valid_chars {
            Ok(Self(id))
        } else {
            Err(crate::Error::Validation(format!(
                "Invalid transaction ID '{}': expected 5-100 characters from [A-Za-z0-9_-]",
                id
            )))
        }
    }

    /// Generate a fresh ID (UUID v4, simple form)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synchronization state of the local balance snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote agree
    Synced,
    /// Local mutation awaiting remote confirmation
    Pending,
    /// Last reconciliation attempt failed
    Error,
}

/// Current balance snapshot for one vendor
///
/// Exactly one record exists per vendor; history lives in the transaction
/// log. Non-negative by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Owning vendor
    pub vendor_id: VendorId,

    /// Current balance in credits
    pub current_balance: u64,

    /// When this snapshot was last written
    pub last_updated: DateTime<Utc>,

    /// Reconciliation state
    pub sync_status: SyncStatus,
}

impl CreditBalance {
    /// Fresh zero balance for a vendor with no history
    pub fn zero(vendor_id: VendorId) -> Self {
        Self {
            vendor_id,
            current_balance: 0,
            last_updated: Utc::now(),
            sync_status: SyncStatus::Pending,
        }
    }
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits purchased via recharge
    Addition,
    /// Credits spent accepting a booking
    Deduction,
    /// Credits withdrawn as a penalty
    Penalty,
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Applied locally and confirmed
    Completed,
    /// Applied locally, awaiting remote confirmation
    Pending,
    /// Rejected
    Failed,
}

/// A single ledger transaction
///
/// Append-only and immutable once created, except for status transitions
/// and server-assigned metadata merged in during sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique, immutable ID
    pub id: TransactionId,

    /// Kind of movement
    pub kind: TransactionKind,

    /// Positive credit amount
    pub amount: u64,

    /// Human-readable description
    pub description: String,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,

    /// Lifecycle status
    pub status: TransactionStatus,

    /// Booking that triggered a deduction or penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,

    /// Order value the deduction was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_value: Option<Decimal>,

    /// Money paid for an addition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<Decimal>,

    /// Payment gateway reference for an addition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_transaction_id: Option<TransactionId>,
}

impl CreditTransaction {
    /// Signed effect of this transaction on the balance
    pub fn signed_delta(&self) -> i64 {
        match self.kind {
            TransactionKind::Addition => self.amount as i64,
            TransactionKind::Deduction | TransactionKind::Penalty => -(self.amount as i64),
        }
    }
}

/// Transaction history filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFilter {
    /// Everything
    All,
    /// Additions only
    Additions,
    /// Deductions only
    Deductions,
    /// Penalties only
    Penalties,
}

impl TransactionFilter {
    /// Whether a transaction of this kind passes the filter
    pub fn matches(&self, kind: TransactionKind) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Additions => kind == TransactionKind::Addition,
            TransactionFilter::Deductions => kind == TransactionKind::Deduction,
            TransactionFilter::Penalties => kind == TransactionKind::Penalty,
        }
    }

    /// Stable key for the per-filter query cache
    pub fn cache_key(&self) -> &'static str {
        match self {
            TransactionFilter::All => "all",
            TransactionFilter::Additions => "additions",
            TransactionFilter::Deductions => "deductions",
            TransactionFilter::Penalties => "penalties",
        }
    }
}

/// One page of filtered transaction history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    /// Transactions in this page, newest first
    pub data: Vec<CreditTransaction>,
    /// Whether more pages follow
    pub has_more: bool,
    /// Total matching transactions
    pub total: usize,
}

/// Kind of queued remote-sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Replay a local deduction
    CreditDeduction,
    /// Replay a local addition
    CreditAddition,
    /// Reconcile the balance snapshot
    BalanceUpdate,
    /// Submit a transaction record
    TransactionSubmit,
}

/// Offline operation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting in the queue
    Pending,
    /// Currently being replayed
    Processing,
    /// Replayed successfully
    Completed,
    /// Retries exhausted, retained for inspection
    Failed,
}

/// Payload carried by a queued operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationPayload {
    /// A transaction to submit to the remote ledger
    Transaction(CreditTransaction),
    /// A balance snapshot to reconcile
    Balance(CreditBalance),
}

/// A queued mutation awaiting remote confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineOperation {
    /// Unique operation ID
    pub id: String,

    /// Operation kind
    pub kind: OperationKind,

    /// Typed payload
    pub payload: OperationPayload,

    /// When the operation was enqueued
    pub created_at: DateTime<Utc>,

    /// Replay attempts so far
    pub retry_count: u32,

    /// Attempts before the operation is marked failed
    pub max_retries: u32,

    /// Lifecycle status
    pub status: OperationStatus,
}

impl OfflineOperation {
    /// Create a fresh pending operation
    pub fn new(kind: OperationKind, payload: OperationPayload, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            kind,
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries,
            status: OperationStatus::Pending,
        }
    }

    /// Whether the operation can still be replayed
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Whether the operation is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Completed | OperationStatus::Failed
        )
    }
}
