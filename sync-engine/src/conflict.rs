//! Conflict resolution for divergent local and remote state
//!
//! Balance: writes within the concurrency window are treated as
//! simultaneous and the higher balance wins, so a vendor never loses
//! purchased credits to a race. Outside the window the later write wins.
//!
//! Transactions: records are immutable, so a shared ID means both sides
//! hold the same logical transaction and the server's copy (with its
//! authoritative status and metadata) replaces the local one. Everything
//! else is unioned.

use chrono::Duration;
use credit_core::{CreditBalance, CreditTransaction, SyncStatus, TransactionId};
use std::collections::HashMap;

/// Which side won a balance conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceWinner {
    /// Local snapshot kept
    Local,
    /// Remote snapshot adopted
    Remote,
}

/// Outcome of balance resolution
#[derive(Debug, Clone)]
pub struct BalanceResolution {
    /// The balance to keep, marked synced
    pub balance: CreditBalance,
    /// Winning side
    pub winner: BalanceWinner,
    /// Whether the two sides actually disagreed
    pub was_conflict: bool,
}

/// Resolve divergent balance snapshots
pub fn resolve_balance(
    local: &CreditBalance,
    remote: &CreditBalance,
    window: Duration,
) -> BalanceResolution {
    if local.current_balance == remote.current_balance {
        let mut balance = remote.clone();
        balance.sync_status = SyncStatus::Synced;
        return BalanceResolution {
            balance,
            winner: BalanceWinner::Remote,
            was_conflict: false,
        };
    }

    let concurrent = (local.last_updated - remote.last_updated).abs() <= window;
    let winner = if concurrent {
        if local.current_balance > remote.current_balance {
            BalanceWinner::Local
        } else {
            BalanceWinner::Remote
        }
    } else if local.last_updated > remote.last_updated {
        BalanceWinner::Local
    } else {
        BalanceWinner::Remote
    };

    let mut balance = match winner {
        BalanceWinner::Local => local.clone(),
        BalanceWinner::Remote => remote.clone(),
    };
    balance.sync_status = SyncStatus::Synced;

    BalanceResolution {
        balance,
        winner,
        was_conflict: true,
    }
}

/// Outcome of transaction log resolution
#[derive(Debug, Clone)]
pub struct TransactionMerge {
    /// Merged log, newest first
    pub transactions: Vec<CreditTransaction>,
    /// Local records replaced by a differing server copy
    pub overridden: usize,
}

/// Merge local and remote transaction logs
pub fn resolve_transactions(
    local: &[CreditTransaction],
    remote: &[CreditTransaction],
) -> TransactionMerge {
    let by_id: HashMap<&TransactionId, &CreditTransaction> =
        remote.iter().map(|t| (&t.id, t)).collect();

    let mut overridden = 0;
    let mut merged: Vec<CreditTransaction> = remote.to_vec();

    for tx in local {
        match by_id.get(&tx.id) {
            Some(server_copy) => {
                if *server_copy != tx {
                    overridden += 1;
                }
            }
            None => merged.push(tx.clone()),
        }
    }

    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    TransactionMerge {
        transactions: merged,
        overridden,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use credit_core::{TransactionKind, TransactionStatus, VendorId};

    fn balance(amount: u64, updated_secs_ago: i64) -> CreditBalance {
        CreditBalance {
            vendor_id: VendorId::new("vendor-1"),
            current_balance: amount,
            last_updated: Utc::now() - Duration::seconds(updated_secs_ago),
            sync_status: SyncStatus::Pending,
        }
    }

    fn tx(id: &str, amount: u64, status: TransactionStatus) -> CreditTransaction {
        CreditTransaction {
            id: TransactionId::new(id).unwrap(),
            kind: TransactionKind::Deduction,
            amount,
            description: "booking".to_string(),
            timestamp: Utc::now(),
            status,
            booking_id: None,
            order_value: None,
            payment_amount: None,
            payment_transaction_id: None,
        }
    }

    #[test]
    fn test_equal_balances_are_not_a_conflict() {
        let result = resolve_balance(&balance(30, 10), &balance(30, 200), Duration::seconds(300));
        assert!(!result.was_conflict);
        assert_eq!(result.balance.current_balance, 30);
        assert_eq!(result.balance.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn test_concurrent_writes_higher_balance_wins() {
        // Both updated within the 5-minute window
        let local = balance(45, 10);
        let remote = balance(30, 20);

        let result = resolve_balance(&local, &remote, Duration::seconds(300));
        assert!(result.was_conflict);
        assert_eq!(result.winner, BalanceWinner::Local);
        assert_eq!(result.balance.current_balance, 45);

        let flipped = resolve_balance(&remote, &local, Duration::seconds(300));
        assert_eq!(flipped.winner, BalanceWinner::Remote);
        assert_eq!(flipped.balance.current_balance, 45);
    }

    #[test]
    fn test_outside_window_later_write_wins() {
        // Remote is newer by well over the window; its lower balance wins
        let local = balance(45, 600);
        let remote = balance(30, 10);

        let result = resolve_balance(&local, &remote, Duration::seconds(300));
        assert!(result.was_conflict);
        assert_eq!(result.winner, BalanceWinner::Remote);
        assert_eq!(result.balance.current_balance, 30);
    }

    #[test]
    fn test_shared_transaction_takes_server_copy() {
        // Same ID on both sides: local says pending, server says completed
        let local = vec![tx("TXN_SHARED_1", 10, TransactionStatus::Pending)];
        let remote = vec![tx("TXN_SHARED_1", 10, TransactionStatus::Completed)];

        let merge = resolve_transactions(&local, &remote);
        assert_eq!(merge.transactions.len(), 1);
        assert_eq!(merge.transactions[0].status, TransactionStatus::Completed);
        assert_eq!(merge.overridden, 1);
    }

    #[test]
    fn test_identical_shared_records_do_not_count_as_overrides() {
        let shared = tx("TXN_SHARED_1", 10, TransactionStatus::Completed);
        let merge = resolve_transactions(&[shared.clone()], &[shared]);
        assert_eq!(merge.transactions.len(), 1);
        assert_eq!(merge.overridden, 0);
    }

    #[test]
    fn test_merge_unions_and_sorts_newest_first() {
        let mut old_local = tx("TXN_LOCAL_1", 5, TransactionStatus::Completed);
        old_local.timestamp = Utc::now() - Duration::seconds(60);
        let new_remote = tx("TXN_REMOTE_1", 7, TransactionStatus::Completed);

        let merge = resolve_transactions(&[old_local], &[new_remote]);
        assert_eq!(merge.transactions.len(), 2);
        assert_eq!(merge.transactions[0].id.as_str(), "TXN_REMOTE_1");
        assert_eq!(merge.transactions[1].id.as_str(), "TXN_LOCAL_1");
        assert_eq!(merge.overridden, 0);
    }
}
