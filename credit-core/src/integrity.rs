//! Data integrity verification
//!
//! Cross-checks the durable state for one vendor: the balance snapshot must
//! equal the signed sum of the transaction log, transaction IDs must be
//! unique, amounts positive, and the running balance can never have dipped
//! below zero. The checker only reports; repair is the sync engine's
//! recovery path.

use crate::{
    error::{ErrorKind, Result},
    types::{TransactionId, VendorId},
    Storage,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// One detected inconsistency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// Balance record exists but cannot be decoded
    UnreadableBalance {
        /// Decode failure detail
        detail: String,
    },
    /// Transaction log cannot be decoded
    UnreadableTransactionLog {
        /// Decode failure detail
        detail: String,
    },
    /// Offline queue cannot be decoded
    UnreadableQueue {
        /// Decode failure detail
        detail: String,
    },
    /// Stored balance disagrees with the transaction log
    BalanceMismatch {
        /// Balance snapshot value
        stored: u64,
        /// Signed sum of the transaction log
        computed: i64,
    },
    /// Replaying the log in order drove the balance below zero
    NegativeRunningBalance {
        /// First transaction at which the running balance went negative
        at: TransactionId,
    },
    /// Two transactions share an ID
    DuplicateTransactionId {
        /// The shared ID
        id: TransactionId,
    },
    /// Transaction with a zero amount
    ZeroAmountTransaction {
        /// Offending transaction
        id: TransactionId,
    },
}

/// Result of an integrity check
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Vendor checked
    pub vendor_id: VendorId,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
    /// Everything found wrong, empty when healthy
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// Whether no issues were found
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Verifies durable state consistency for vendors
pub struct IntegrityChecker {
    storage: Arc<Storage>,
}

impl IntegrityChecker {
    /// Create a checker over the given storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Run all checks for one vendor
    ///
    /// Decode failures become issues rather than errors so a partially
    /// corrupt store still yields a full report. Only infrastructure
    /// failures (storage itself unreachable) propagate as errors.
    pub fn check(&self, vendor: &VendorId) -> Result<IntegrityReport> {
        let mut issues = Vec::new();

        let balance = match self.storage.get_balance(vendor) {
            Ok(balance) => balance,
            Err(e) if e.kind() == ErrorKind::Serialization => {
                issues.push(IntegrityIssue::UnreadableBalance {
                    detail: e.to_string(),
                });
                None
            }
            Err(e) => return Err(e),
        };

        let log = match self.storage.load_transactions(vendor) {
            Ok(log) => Some(log),
            Err(e) if e.kind() == ErrorKind::Serialization => {
                issues.push(IntegrityIssue::UnreadableTransactionLog {
                    detail: e.to_string(),
                });
                None
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.storage.load_operations(vendor) {
            if e.kind() == ErrorKind::Serialization {
                issues.push(IntegrityIssue::UnreadableQueue {
                    detail: e.to_string(),
                });
            } else {
                return Err(e);
            }
        }

        if let Some(log) = &log {
            let mut seen = HashSet::new();
            let mut running: i64 = 0;
            let mut went_negative = false;

            for tx in log {
                if tx.amount == 0 {
                    issues.push(IntegrityIssue::ZeroAmountTransaction { id: tx.id.clone() });
                }
                if !seen.insert(tx.id.clone()) {
                    issues.push(IntegrityIssue::DuplicateTransactionId { id: tx.id.clone() });
                }
                running += tx.signed_delta();
                if running < 0 && !went_negative {
                    went_negative = true;
                    issues.push(IntegrityIssue::NegativeRunningBalance { at: tx.id.clone() });
                }
            }

            let stored = balance.as_ref().map_or(0, |b| b.current_balance);
            if stored as i64 != running {
                issues.push(IntegrityIssue::BalanceMismatch {
                    stored,
                    computed: running,
                });
            }
        }

        let checked_at = Utc::now();
        if issues.is_empty() {
            self.storage.set_integrity_checked(vendor, checked_at)?;
            info!(vendor_id = %vendor, "Integrity check passed");
        } else {
            warn!(
                vendor_id = %vendor,
                issues = issues.len(),
                "Integrity check found inconsistencies"
            );
        }

        Ok(IntegrityReport {
            vendor_id: vendor.clone(),
            checked_at,
            issues,
        })
    }
}
