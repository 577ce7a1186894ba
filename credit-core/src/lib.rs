//! Credit Ledger Core
//!
//! Vendor-side prepaid credit ledger with offline-first durability.
//!
//! # Architecture
//!
//! - **Local First**: Every mutation commits to local storage before any
//!   remote call; the device is usable with no connectivity
//! - **Append-Only Log**: The balance snapshot is derived state; the
//!   transaction log is the source of truth
//! - **Queued Replay**: Each mutation enqueues an offline operation that
//!   the sync engine replays against the remote ledger
//! - **Typed Outcomes**: Insufficient balance is a business outcome, not
//!   an error
//!
//! # Invariants
//!
//! - Balance conservation: balance == Σ(signed transaction deltas)
//! - Non-negative: the balance never goes below zero
//! - Atomicity: balance, log and queue move together in one write batch

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod cache;
pub mod config;
pub mod error;
pub mod integrity;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod retry;
pub mod storage;
pub mod types;

// Re-exports
pub use cache::LedgerCache;
pub use config::{CacheConfig, Config, LimitConfig, SyncConfig};
pub use error::{Error, ErrorKind, RecoveryAction, RecoveryPlan, Result};
pub use integrity::{IntegrityChecker, IntegrityIssue, IntegrityReport};
pub use ledger::{CreditLedger, DeductOutcome};
pub use metrics::Metrics;
pub use notify::{MemorySink, NotificationKind, NotificationSink, TracingSink};
pub use retry::{RetryConfig, RetryExecutor};
pub use storage::Storage;
pub use types::{
    CreditBalance, CreditTransaction, OfflineOperation, OperationKind, OperationPayload,
    OperationStatus, SyncStatus, TransactionFilter, TransactionId, TransactionKind,
    TransactionPage, TransactionStatus, VendorId,
};
