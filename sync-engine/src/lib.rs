//! Credit Ledger Sync Engine
//!
//! Background synchronization between a vendor's local credit ledger and
//! the server-side ledger.
//!
//! # Architecture
//!
//! - **Queue Drain**: Queued offline operations replay against the remote
//!   ledger in FIFO order, one drain in flight at a time
//! - **Reconciliation**: Every drain closes by merging the server snapshot
//!   into local state, resolving balance and transaction conflicts
//! - **Recovery**: Corrupt local state is rebuilt from the server, which
//!   is the source of truth once local integrity is lost
//! - **Injected Seams**: Transport and connectivity arrive as trait
//!   objects; the engine never opens a socket itself

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod conflict;
pub mod engine;
pub mod queue;
pub mod remote;

#[cfg(test)]
mod test_support;

// Re-exports
pub use conflict::{
    resolve_balance, resolve_transactions, BalanceResolution, BalanceWinner, TransactionMerge,
};
pub use engine::{spawn_sync_engine, DrainReport, SyncEngine, SyncHandle};
pub use queue::OfflineQueue;
pub use remote::{
    NetworkOracle, RemoteLedgerClient, SubmitReceipt, SyncRequest, SyncSnapshot, WatchOracle,
};
