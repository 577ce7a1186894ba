//! Main ledger orchestration layer
//!
//! One `CreditLedger` exists per vendor session, constructed with explicit
//! dependencies and dropped at logout. Mutations are serialized by the
//! vendor's mutation lock (shared with the sync engine through the storage
//! layer) and complete as soon as local persistence succeeds; remote
//! reconciliation happens asynchronously through the offline queue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use credit_core::{Config, CreditLedger, Storage, TracingSink, VendorId};
//!
//! #[tokio::main]
//! async fn main() -> credit_core::Result<()> {
//!     let config = Config::default();
//!     let storage = Arc::new(Storage::open(&config)?);
//!     let ledger = CreditLedger::new(
//!         VendorId::new("vendor-1"),
//!         storage,
//!         &config,
//!         Arc::new(TracingSink),
//!     );
//!
//!     let balance = ledger.current_balance().await?;
//!     tracing::info!(balance, "session opened");
//!     Ok(())
//! }
//! ```

use crate::{
    cache::LedgerCache,
    config::LimitConfig,
    error::ErrorKind,
    metrics::Metrics,
    notify::{NotificationKind, NotificationSink},
    retry::{RetryConfig, RetryExecutor},
    types::{
        CreditBalance, CreditTransaction, OfflineOperation, OperationKind, OperationPayload,
        OperationStatus, SyncStatus, TransactionFilter, TransactionId, TransactionKind,
        TransactionPage, TransactionStatus, VendorId,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Outcome of a deduction attempt
///
/// Insufficient credits is an expected business outcome, not an error:
/// callers match on it and prompt a recharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    /// Deduction applied
    Applied {
        /// Balance after the deduction
        new_balance: u64,
    },
    /// Balance too low; nothing was mutated
    InsufficientCredits {
        /// Balance at the time of the attempt
        balance: u64,
        /// Credits the caller asked for
        requested: u64,
    },
}

impl DeductOutcome {
    /// Whether the deduction went through
    pub fn applied(&self) -> bool {
        matches!(self, DeductOutcome::Applied { .. })
    }
}

/// Per-vendor credit ledger
pub struct CreditLedger {
    vendor: VendorId,
    storage: Arc<Storage>,
    cache: Arc<LedgerCache>,
    retry: RetryExecutor,
    notifier: Arc<dyn NotificationSink>,
    limits: LimitConfig,
    op_max_retries: u32,
    metrics: Option<Metrics>,
    sync_kick: Option<mpsc::UnboundedSender<()>>,

    // Shared per-vendor mutation lock, from the storage registry
    mutation: Arc<Mutex<()>>,
}

impl CreditLedger {
    /// Create a ledger for one vendor session
    pub fn new(
        vendor: VendorId,
        storage: Arc<Storage>,
        config: &Config,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let mutation = storage.mutation_lock(&vendor);
        Self {
            vendor,
            storage,
            cache: Arc::new(LedgerCache::new(&config.cache)),
            retry: RetryExecutor::new(),
            notifier,
            limits: config.limits.clone(),
            op_max_retries: config.sync.max_operation_retries,
            metrics: None,
            sync_kick: None,
            mutation,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach the sync engine's kick channel
    ///
    /// After each mutation the ledger sends one kick so an online sync
    /// engine drains the queue immediately.
    pub fn with_sync_kick(mut self, kick: mpsc::UnboundedSender<()>) -> Self {
        self.sync_kick = Some(kick);
        self
    }

    /// Vendor this ledger belongs to
    pub fn vendor(&self) -> &VendorId {
        &self.vendor
    }

    /// Handle to the session cache
    ///
    /// Hand this to the sync engine so server-side merges and recovery
    /// invalidate the same cache the ledger reads from.
    pub fn cache_handle(&self) -> Arc<LedgerCache> {
        self.cache.clone()
    }

    /// Abandon an in-flight retried operation
    ///
    /// Stops further retries only; local state already applied stays.
    pub fn cancel_operation(&self, op_id: &str) -> bool {
        self.retry.cancel(op_id)
    }

    /// Credits required to accept an order: `ceil(order_value / 100)`
    ///
    /// Pure; no side effects.
    pub fn required_credits(&self, order_value: Decimal) -> Result<u64> {
        if order_value <= Decimal::ZERO {
            return Err(Error::Validation(
                "Order value must be positive".to_string(),
            ));
        }
        if order_value > Decimal::from(self.limits.max_order_value) {
            return Err(Error::Validation(format!(
                "Order value exceeds maximum of {}",
                self.limits.max_order_value
            )));
        }

        let credits = (order_value / Decimal::from(100u32)).ceil();
        credits
            .to_u64()
            .ok_or_else(|| Error::Validation("Order value out of range".to_string()))
    }

    /// Current balance, cache-first
    ///
    /// Initializes a zero balance for a vendor with no record. Falls back
    /// to the last cached value when storage is unreadable (cache-only
    /// mode). Never negative.
    pub async fn current_balance(&self) -> Result<u64> {
        if let Some(balance) = self.cached_balance() {
            return Ok(balance);
        }
        // Zero-init writes, so the storage read runs under the vendor lock
        let _guard = self.mutation.lock().await;
        self.balance_locked()
    }

    fn cached_balance(&self) -> Option<u64> {
        match self.cache.balance() {
            Some(balance) => {
                if let Some(m) = &self.metrics {
                    m.record_cache_lookup(true);
                }
                Some(balance.current_balance)
            }
            None => {
                if let Some(m) = &self.metrics {
                    m.record_cache_lookup(false);
                }
                None
            }
        }
    }

    // Caller holds the vendor mutation lock
    fn balance_locked(&self) -> Result<u64> {
        match self.storage.get_balance(&self.vendor) {
            Ok(Some(balance)) => {
                let current = balance.current_balance;
                self.cache.store_balance(balance);
                Ok(current)
            }
            Ok(None) => {
                let balance = CreditBalance::zero(self.vendor.clone());
                self.storage.put_balance(&balance)?;
                self.cache.store_balance(balance);
                Ok(0)
            }
            Err(e) if e.kind() == ErrorKind::Storage => {
                match self.cache.balance_ignoring_ttl() {
                    Some(stale) => {
                        tracing::warn!(
                            vendor_id = %self.vendor,
                            error = %e,
                            "Storage unreadable, serving stale cached balance"
                        );
                        Ok(stale.current_balance)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Deduct credits for an accepted booking
    ///
    /// Validates inputs, then atomically records a deduction transaction,
    /// the new balance and a queued replay operation. Insufficient balance
    /// returns [`DeductOutcome::InsufficientCredits`] without mutating
    /// anything.
    pub async fn deduct_credits(
        &self,
        amount: u64,
        booking_id: &str,
        order_value: Decimal,
    ) -> Result<DeductOutcome> {
        self.validate_amount(amount)?;
        self.required_credits(order_value)?;

        let _guard = self.mutation.lock().await;

        let balance = match self.cached_balance() {
            Some(balance) => balance,
            None => self.balance_locked()?,
        };
        if balance < amount {
            if let Some(m) = &self.metrics {
                m.insufficient_total.inc();
            }
            self.notifier.show(
                &format!(
                    "Insufficient credits: {} available, {} required. Please recharge.",
                    balance, amount
                ),
                NotificationKind::Error,
            );
            return Ok(DeductOutcome::InsufficientCredits {
                balance,
                requested: amount,
            });
        }

        let tx = CreditTransaction {
            id: TransactionId::generate(),
            kind: TransactionKind::Deduction,
            amount,
            description: format!("Credits deducted for booking {}", booking_id),
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
            booking_id: Some(booking_id.to_string()),
            order_value: Some(order_value),
            payment_amount: None,
            payment_transaction_id: None,
        };

        let new_balance = balance - amount;
        self.apply_mutation(new_balance, tx, OperationKind::CreditDeduction)
            .await?;

        if let Some(m) = &self.metrics {
            m.deductions_total.inc();
        }
        self.notifier.show(
            &format!("{} credits deducted, {} remaining", amount, new_balance),
            NotificationKind::Success,
        );

        Ok(DeductOutcome::Applied { new_balance })
    }

    /// Add purchased credits after a verified recharge payment
    ///
    /// The only ledger operation that rejects bad input with an error
    /// rather than a typed outcome: callers reach it with an
    /// already-verified payment, so invalid input here is a programming
    /// error surfaced loudly.
    pub async fn add_credits(
        &self,
        amount: u64,
        payment_transaction_id: &str,
        payment_amount: Decimal,
    ) -> Result<u64> {
        self.validate_amount(amount)?;
        let payment_id = TransactionId::new(payment_transaction_id)?;

        let min = Decimal::from(self.limits.min_payment_amount);
        let max = Decimal::from(self.limits.max_payment_amount);
        if payment_amount < min || payment_amount > max {
            return Err(Error::Validation(format!(
                "Payment amount must be between {} and {}",
                min, max
            )));
        }

        let _guard = self.mutation.lock().await;

        let balance = match self.cached_balance() {
            Some(balance) => balance,
            None => self.balance_locked()?,
        };
        let new_balance = balance
            .checked_add(amount)
            .ok_or_else(|| Error::Validation("Balance overflow".to_string()))?;

        let tx = CreditTransaction {
            id: TransactionId::generate(),
            kind: TransactionKind::Addition,
            amount,
            description: format!("Credits purchased via payment {}", payment_id),
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
            booking_id: None,
            order_value: None,
            payment_amount: Some(payment_amount),
            payment_transaction_id: Some(payment_id),
        };

        self.apply_mutation(new_balance, tx, OperationKind::CreditAddition)
            .await?;

        if let Some(m) = &self.metrics {
            m.additions_total.inc();
        }
        self.notifier.show(
            &format!("{} credits added, balance is now {}", amount, new_balance),
            NotificationKind::Success,
        );

        Ok(new_balance)
    }

    /// Apply a penalty; the balance floors at zero and never blocks
    ///
    /// The recorded amount is the applied amount (capped at the available
    /// balance) so the balance always equals the transaction sum. A
    /// penalty against a zero balance records nothing.
    pub async fn add_penalty(
        &self,
        amount: u64,
        reason: &str,
        booking_id: Option<&str>,
    ) -> Result<u64> {
        self.validate_amount(amount)?;

        let _guard = self.mutation.lock().await;

        let balance = match self.cached_balance() {
            Some(balance) => balance,
            None => self.balance_locked()?,
        };
        let applied = amount.min(balance);
        if applied == 0 {
            self.notifier.show(
                &format!("Penalty ({}) not applied: balance is zero", reason),
                NotificationKind::Info,
            );
            return Ok(balance);
        }

        let description = if applied < amount {
            format!("Penalty: {} (capped at available balance)", reason)
        } else {
            format!("Penalty: {}", reason)
        };

        let tx = CreditTransaction {
            id: TransactionId::generate(),
            kind: TransactionKind::Penalty,
            amount: applied,
            description,
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
            booking_id: booking_id.map(str::to_string),
            order_value: None,
            payment_amount: None,
            payment_transaction_id: None,
        };

        let new_balance = balance - applied;
        self.apply_mutation(new_balance, tx, OperationKind::TransactionSubmit)
            .await?;

        if let Some(m) = &self.metrics {
            m.penalties_total.inc();
        }
        self.notifier.show(
            &format!("Penalty of {} credits applied", applied),
            NotificationKind::Info,
        );

        Ok(new_balance)
    }

    /// Transaction history, newest first
    ///
    /// Ties on timestamp keep insertion order (stable sort). Served from
    /// the per-filter cache when fresh.
    pub async fn transaction_history(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<CreditTransaction>> {
        let key = filter.cache_key();
        if let Some(hit) = self.cache.transactions(key) {
            if let Some(m) = &self.metrics {
                m.record_cache_lookup(true);
            }
            return Ok(hit);
        }
        if let Some(m) = &self.metrics {
            m.record_cache_lookup(false);
        }

        let all = match self.cache.transactions(TransactionFilter::All.cache_key()) {
            Some(all) => all,
            None => {
                let mut log = self.storage.load_transactions(&self.vendor)?;
                log.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                self.cache
                    .store_transactions(TransactionFilter::All.cache_key(), log.clone());
                log
            }
        };

        if matches!(filter, TransactionFilter::All) {
            return Ok(all);
        }

        let filtered: Vec<_> = all
            .into_iter()
            .filter(|t| filter.matches(t.kind))
            .collect();
        self.cache.store_transactions(key, filtered.clone());
        Ok(filtered)
    }

    /// One page of filtered history
    pub async fn transaction_page(
        &self,
        filter: TransactionFilter,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage> {
        let all = self.transaction_history(filter).await?;
        let total = all.len();
        let data: Vec<_> = all.into_iter().skip(offset).take(limit).collect();

        Ok(TransactionPage {
            data,
            has_more: offset.saturating_add(limit) < total,
            total,
        })
    }

    // Internal

    fn validate_amount(&self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(Error::Validation(
                "Credit amount must be positive".to_string(),
            ));
        }
        if amount > self.limits.max_credits_per_operation {
            return Err(Error::Validation(format!(
                "Credit amount exceeds maximum of {}",
                self.limits.max_credits_per_operation
            )));
        }
        Ok(())
    }

    /// Persist a mutation atomically, invalidate caches, kick the sync
    /// engine
    async fn apply_mutation(
        &self,
        new_balance: u64,
        tx: CreditTransaction,
        op_kind: OperationKind,
    ) -> Result<()> {
        let balance = CreditBalance {
            vendor_id: self.vendor.clone(),
            current_balance: new_balance,
            last_updated: Utc::now(),
            sync_status: SyncStatus::Pending,
        };

        let op_id = format!("mutation:{}", tx.id);
        let queued = OfflineOperation::new(
            op_kind,
            OperationPayload::Transaction(tx.clone()),
            self.op_max_retries,
        );

        let mut log = self.storage.load_transactions(&self.vendor)?;
        log.push(tx);
        let mut ops = self.storage.load_operations(&self.vendor)?;
        ops.push(queued);

        let config = RetryConfig::credit_mutation();
        self.retry
            .execute(&op_id, &config, || async {
                self.storage.commit_mutation(&balance, &log, &ops)
            })
            .await?;

        self.cache.invalidate_all();
        if let Some(m) = &self.metrics {
            // Pending only, matching what the sync engine reports
            let pending = ops
                .iter()
                .filter(|op| op.status == OperationStatus::Pending)
                .count();
            m.set_queue_depth(pending);
        }
        if let Some(kick) = &self.sync_kick {
            let _ = kick.send(());
        }

        Ok(())
    }
}
