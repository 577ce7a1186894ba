//! Queue drain, reconciliation and recovery
//!
//! The engine owns the online half of the ledger's life: it replays
//! queued operations against the remote ledger in FIFO order, reconciles
//! the local snapshot with the server's, and rebuilds local state from
//! the server when corruption is detected.
//!
//! Drains are single-flight. Three things trigger one: the periodic
//! timer, a kick from the ledger after a mutation, and an
//! offline-to-online transition (after a short settle delay so a flapping
//! link does not thrash).

use crate::{
    conflict::{resolve_balance, resolve_transactions},
    queue::OfflineQueue,
    remote::{NetworkOracle, RemoteLedgerClient, SyncRequest},
};
use chrono::Utc;
use credit_core::{
    CreditBalance, Error, IntegrityChecker, IntegrityReport, LedgerCache, Metrics,
    NotificationKind, NotificationSink, OfflineOperation, OperationPayload, OperationStatus,
    Result, RetryConfig, RetryExecutor, Storage, SyncConfig, SyncStatus, VendorId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What one drain pass accomplished
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Drain did not run (offline, or another drain was in flight)
    pub skipped: bool,
    /// Operations replayed successfully
    pub synced: usize,
    /// Replay attempts that failed this pass
    pub failed: usize,
    /// Conflicts resolved while reconciling
    pub conflicts: usize,
    /// Whether the closing reconciliation succeeded
    pub reconciled: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Background synchronization engine for one vendor
pub struct SyncEngine {
    vendor: VendorId,
    storage: Arc<Storage>,
    queue: OfflineQueue,
    client: Arc<dyn RemoteLedgerClient>,
    oracle: Arc<dyn NetworkOracle>,
    notifier: Arc<dyn NotificationSink>,
    retry: RetryExecutor,
    config: SyncConfig,
    metrics: Option<Metrics>,
    cache: Option<Arc<LedgerCache>>,

    // Shared per-vendor mutation lock, from the storage registry
    mutation: Arc<Mutex<()>>,

    // Single-flight guard for drains
    draining: AtomicBool,
}

impl SyncEngine {
    /// Create an engine for one vendor
    pub fn new(
        vendor: VendorId,
        storage: Arc<Storage>,
        client: Arc<dyn RemoteLedgerClient>,
        oracle: Arc<dyn NetworkOracle>,
        notifier: Arc<dyn NotificationSink>,
        config: SyncConfig,
    ) -> Self {
        let queue = OfflineQueue::new(storage.clone(), vendor.clone());
        let mutation = storage.mutation_lock(&vendor);
        Self {
            vendor,
            storage,
            queue,
            client,
            oracle,
            notifier,
            retry: RetryExecutor::new(),
            config,
            metrics: None,
            cache: None,
            mutation,
            draining: AtomicBool::new(false),
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach the ledger's session cache
    ///
    /// Server-side merges and recovery rewrite durable state underneath
    /// the ledger; with the handle attached they invalidate its cache so
    /// reads never serve the pre-sync values for a TTL.
    pub fn with_cache(mut self, cache: Arc<LedgerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Queue view for this vendor
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Drain the queue once, then reconcile with the server
    ///
    /// Returns a skipped report while offline or when another drain is
    /// already in flight.
    pub async fn drain(&self) -> Result<DrainReport> {
        if !self.oracle.is_online() {
            debug!(vendor_id = %self.vendor, "Offline, drain skipped");
            return Ok(DrainReport::skipped());
        }
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(vendor_id = %self.vendor, "Drain already in flight, skipped");
            return Ok(DrainReport::skipped());
        }

        let result = self.drain_inner().await;
        self.draining.store(false, Ordering::SeqCst);
        result
    }

    async fn drain_inner(&self) -> Result<DrainReport> {
        if let Some(m) = &self.metrics {
            m.drains_total.inc();
        }

        let mut report = DrainReport::default();

        // Operations stranded as Processing by a drain that never finished
        // (crash between the mark and the outcome) go back to Pending first
        self.queue.requeue_interrupted().await?;

        let ops = self.queue.pending()?;
        info!(
            vendor_id = %self.vendor,
            pending = ops.len(),
            "Draining offline queue"
        );

        for op in ops {
            if !self.oracle.is_online() {
                warn!(vendor_id = %self.vendor, "Connectivity lost mid-drain");
                break;
            }

            self.queue.mark_processing(&op.id).await?;
            match self.replay(&op).await {
                Ok(conflicts) => {
                    self.queue.complete(&op.id).await?;
                    report.synced += 1;
                    report.conflicts += conflicts;
                    if let Some(m) = &self.metrics {
                        m.operations_synced_total.inc();
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        vendor_id = %self.vendor,
                        op_id = %op.id,
                        error = %e,
                        "Replay failed"
                    );
                    let status = self.queue.record_failure(&op.id).await?;
                    if status == OperationStatus::Failed {
                        if let Some(m) = &self.metrics {
                            m.operations_failed_total.inc();
                        }
                        self.notifier.show(
                            "A queued credit operation could not be synced and needs attention",
                            NotificationKind::Error,
                        );
                    }
                }
            }
        }

        match self.reconcile().await {
            Ok(conflicts) => {
                report.conflicts += conflicts;
                report.reconciled = true;
                self.storage.set_last_sync(&self.vendor, Utc::now())?;
            }
            Err(e) => {
                warn!(vendor_id = %self.vendor, error = %e, "Reconciliation failed");
                self.mark_balance_error()?;
            }
        }

        if let Some(m) = &self.metrics {
            m.set_queue_depth(self.queue.depth()?);
        }

        info!(
            vendor_id = %self.vendor,
            synced = report.synced,
            failed = report.failed,
            conflicts = report.conflicts,
            "Drain finished"
        );
        Ok(report)
    }

    async fn replay(&self, op: &OfflineOperation) -> Result<usize> {
        match &op.payload {
            OperationPayload::Transaction(tx) => {
                let receipt = self.client.submit_transaction(&self.vendor, tx).await?;
                debug!(
                    op_id = %op.id,
                    transaction_id = %receipt.transaction_id,
                    "Operation replayed"
                );
                Ok(0)
            }
            OperationPayload::Balance(_) => self.reconcile().await,
        }
    }

    /// Fetch the server snapshot and merge it with local state
    ///
    /// Returns the number of conflicts resolved. The merged balance is
    /// marked synced; the merged log replaces the local one. The local
    /// load-merge-store runs under the vendor's mutation lock so a ledger
    /// commit landing mid-merge is never clobbered; the remote fetch
    /// happens before the lock is taken.
    pub async fn reconcile(&self) -> Result<usize> {
        let snapshot = self
            .client
            .comprehensive_sync(SyncRequest {
                vendor_id: self.vendor.clone(),
                since: self.storage.last_sync(&self.vendor)?,
            })
            .await?;

        let _guard = self.mutation.lock().await;

        let local_balance = self
            .storage
            .get_balance(&self.vendor)?
            .unwrap_or_else(|| CreditBalance::zero(self.vendor.clone()));
        let window = chrono::Duration::seconds(self.config.conflict_window_secs as i64);
        let resolution = resolve_balance(&local_balance, &snapshot.balance, window);

        let local_log = self.storage.load_transactions(&self.vendor)?;
        let merge = resolve_transactions(&local_log, &snapshot.transactions);

        self.storage.put_balance(&resolution.balance)?;
        self.storage
            .replace_transactions(&self.vendor, &merge.transactions)?;

        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }

        let conflicts = merge.overridden + usize::from(resolution.was_conflict);
        if conflicts > 0 {
            if let Some(m) = &self.metrics {
                m.conflicts_resolved_total.inc_by(conflicts as u64);
            }
            info!(
                vendor_id = %self.vendor,
                conflicts,
                winner = ?resolution.winner,
                "Conflicts resolved during reconciliation"
            );
            self.notifier.show(
                &format!("Synced with server, {} conflict(s) resolved", conflicts),
                NotificationKind::Info,
            );
        }

        Ok(conflicts)
    }

    /// Verify local state and rebuild it from the server if corrupt
    ///
    /// The server is the source of truth once corruption is confirmed:
    /// local state (including the queue, whose provenance is no longer
    /// trustworthy) is wiped and replaced by the server's balance and
    /// history. The only destructive operation in the crate, and it
    /// refuses to run offline. Returns the post-recovery report.
    pub async fn recover_from_corruption(&self) -> Result<IntegrityReport> {
        let checker = IntegrityChecker::new(self.storage.clone());
        let report = checker.check(&self.vendor)?;
        if report.is_healthy() {
            return Ok(report);
        }

        if !self.oracle.is_online() {
            return Err(Error::DataCorruption(
                "Local state is corrupt and recovery requires network connectivity".to_string(),
            ));
        }

        warn!(
            vendor_id = %self.vendor,
            issues = report.issues.len(),
            "Corruption detected, rebuilding from server"
        );
        self.notifier.show(
            "Local credit data was inconsistent and is being restored from the server",
            NotificationKind::Error,
        );

        let (mut balance, transactions) = self
            .retry
            .execute(
                &format!("recovery:{}", self.vendor),
                &RetryConfig::recovery(),
                || async {
                    let balance = self.client.fetch_balance(&self.vendor).await?;
                    let transactions = self
                        .client
                        .fetch_transactions_since(&self.vendor, None)
                        .await?;
                    Ok((balance, transactions))
                },
            )
            .await?;

        {
            let _guard = self.mutation.lock().await;
            self.storage.clear_vendor_state(&self.vendor)?;
            balance.sync_status = SyncStatus::Synced;
            self.storage.put_balance(&balance)?;
            self.storage
                .replace_transactions(&self.vendor, &transactions)?;
            self.storage.set_last_sync(&self.vendor, Utc::now())?;
        }

        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }

        self.notifier
            .show("Credit data restored from server", NotificationKind::Info);

        checker.check(&self.vendor)
    }

    /// Drain, then verify local integrity
    ///
    /// The periodic and reconnect paths run this instead of a bare drain
    /// so silent corruption surfaces during normal operation rather than
    /// at the next read that happens to trip over it.
    pub async fn auto_sync(&self) -> Result<DrainReport> {
        let report = self.drain().await?;
        if !report.skipped {
            let checker = IntegrityChecker::new(self.storage.clone());
            let integrity = checker.check(&self.vendor)?;
            if !integrity.is_healthy() {
                warn!(
                    vendor_id = %self.vendor,
                    issues = integrity.issues.len(),
                    "Integrity issues found after sync"
                );
                self.notifier.show(
                    "Credit data inconsistency detected, recovery is available",
                    NotificationKind::Error,
                );
            }
        }
        Ok(report)
    }

    fn mark_balance_error(&self) -> Result<()> {
        if let Some(mut balance) = self.storage.get_balance(&self.vendor)? {
            balance.sync_status = SyncStatus::Error;
            self.storage.put_balance(&balance)?;
        }
        Ok(())
    }

    async fn drain_logged(&self) {
        if let Err(e) = self.drain().await {
            warn!(vendor_id = %self.vendor, error = %e, "Drain failed");
        }
    }

    async fn auto_sync_logged(&self) {
        if let Err(e) = self.auto_sync().await {
            warn!(vendor_id = %self.vendor, error = %e, "Auto sync failed");
        }
    }

    /// Event loop: periodic drains, mutation kicks, reconnect drains
    pub async fn run(self: Arc<Self>, mut kicks: mpsc::UnboundedReceiver<()>) {
        let mut online = self.oracle.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_secs(
            self.config.auto_sync_interval_secs.max(1),
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(vendor_id = %self.vendor, "Sync engine started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.auto_sync_logged().await,
                Some(()) = kicks.recv() => self.drain_logged().await,
                changed = online.changed() => {
                    if changed.is_err() {
                        warn!(vendor_id = %self.vendor, "Connectivity oracle dropped, stopping");
                        return;
                    }
                    if *online.borrow_and_update() {
                        info!(vendor_id = %self.vendor, "Back online");
                        tokio::time::sleep(Duration::from_millis(
                            self.config.reconnect_settle_ms,
                        ))
                        .await;
                        self.auto_sync_logged().await;
                    }
                }
            }
        }
    }
}

/// Handle to a spawned sync engine
pub struct SyncHandle {
    kick: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Request a drain
    pub fn kick(&self) {
        let _ = self.kick.send(());
    }

    /// Sender half of the kick channel, for wiring into a ledger
    pub fn kick_sender(&self) -> mpsc::UnboundedSender<()> {
        self.kick.clone()
    }

    /// Stop the engine task
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Spawn the engine's event loop on the current runtime
pub fn spawn_sync_engine(engine: Arc<SyncEngine>) -> SyncHandle {
    let (kick_tx, kick_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(engine.run(kick_rx));
    SyncHandle {
        kick: kick_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::WatchOracle;
    use crate::test_support::{open_storage, MockRemoteLedger};
    use chrono::Utc;
    use credit_core::{
        Config, CreditLedger, CreditTransaction, MemorySink, OperationKind, TransactionId,
        TransactionKind, TransactionStatus,
    };
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    struct Fixture {
        engine: Arc<SyncEngine>,
        remote: Arc<MockRemoteLedger>,
        sink: Arc<MemorySink>,
        storage: Arc<Storage>,
        vendor: VendorId,
        _temp: TempDir,
    }

    fn fixture(online: bool) -> Fixture {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warn")
            .try_init();

        let (storage, _temp) = open_storage();
        let vendor = VendorId::new("vendor-1");
        let remote = Arc::new(MockRemoteLedger::new(&vendor));
        let oracle = Arc::new(WatchOracle::new(online));
        let sink = Arc::new(MemorySink::new());

        let engine = Arc::new(
            SyncEngine::new(
                vendor.clone(),
                storage.clone(),
                remote.clone(),
                oracle.clone(),
                sink.clone(),
                SyncConfig::default(),
            )
            .with_metrics(Metrics::new().unwrap()),
        );

        Fixture {
            engine,
            remote,
            sink,
            storage,
            vendor,
            _temp,
        }
    }

    fn tx(kind: TransactionKind, amount: u64) -> CreditTransaction {
        CreditTransaction {
            id: TransactionId::generate(),
            kind,
            amount,
            description: "test".to_string(),
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
            booking_id: None,
            order_value: None,
            payment_amount: None,
            payment_transaction_id: None,
        }
    }

    async fn enqueue_tx(f: &Fixture, transaction: CreditTransaction, max_retries: u32) -> String {
        let op = OfflineOperation::new(
            OperationKind::TransactionSubmit,
            OperationPayload::Transaction(transaction),
            max_retries,
        );
        let id = op.id.clone();
        f.engine.queue().enqueue(op).await.unwrap();
        id
    }

    fn put_local_state(f: &Fixture, balance: u64, log: &[CreditTransaction]) {
        f.storage
            .put_balance(&CreditBalance {
                vendor_id: f.vendor.clone(),
                current_balance: balance,
                last_updated: Utc::now(),
                sync_status: SyncStatus::Pending,
            })
            .unwrap();
        f.storage.replace_transactions(&f.vendor, log).unwrap();
    }

    #[tokio::test]
    async fn test_drain_skipped_while_offline() {
        let f = fixture(false);
        enqueue_tx(&f, tx(TransactionKind::Deduction, 10), 3).await;

        let report = f.engine.drain().await.unwrap();
        assert!(report.skipped);
        assert!(f.remote.submitted.lock().is_empty());
        assert_eq!(f.engine.queue().depth().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_replays_in_fifo_order() {
        // Offline mutations accumulate, then connectivity returns
        let f = fixture(true);

        let add = tx(TransactionKind::Addition, 50);
        let deduct = tx(TransactionKind::Deduction, 15);
        let add_id = add.id.as_str().to_string();
        let deduct_id = deduct.id.as_str().to_string();
        put_local_state(&f, 35, &[add.clone(), deduct.clone()]);
        enqueue_tx(&f, add, 3).await;
        enqueue_tx(&f, deduct, 3).await;

        let report = f.engine.drain().await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 0);
        assert!(report.reconciled);

        assert_eq!(f.remote.submitted_ids(), vec![add_id, deduct_id]);
        assert_eq!(f.engine.queue().depth().unwrap(), 0);
        assert!(f.storage.last_sync(&f.vendor).unwrap().is_some());

        // Replayed mutations brought the server to the local balance
        let balance = f.storage.get_balance(&f.vendor).unwrap().unwrap();
        assert_eq!(balance.current_balance, 35);
        assert_eq!(balance.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_transient_failure_requeues_operation() {
        let f = fixture(true);
        let op_id = enqueue_tx(&f, tx(TransactionKind::Deduction, 10), 3).await;
        f.remote.fail_next_submits(1);

        let report = f.engine.drain().await.unwrap();
        assert_eq!(report.failed, 1);
        let pending = f.engine.queue().pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, op_id);
        assert_eq!(pending[0].retry_count, 1);

        let report = f.engine.drain().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(f.engine.queue().depth().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_operation_parks_as_failed() {
        let f = fixture(true);
        enqueue_tx(&f, tx(TransactionKind::Deduction, 10), 1).await;
        f.remote.fail_next_submits(10);

        f.engine.drain().await.unwrap();

        let failed = f.engine.queue().failed().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, OperationStatus::Failed);
        assert!(f.sink.contains("could not be synced"));
    }

    #[tokio::test]
    async fn test_interrupted_operation_drains_after_restart() {
        let f = fixture(true);
        let op_id = enqueue_tx(&f, tx(TransactionKind::Addition, 10), 3).await;
        f.engine.queue().mark_processing(&op_id).await.unwrap();
        assert_eq!(f.engine.queue().depth().unwrap(), 0);

        // Fresh engine over the same storage, as after a process restart
        let engine = SyncEngine::new(
            f.vendor.clone(),
            f.storage.clone(),
            f.remote.clone(),
            Arc::new(WatchOracle::new(true)),
            f.sink.clone(),
            SyncConfig::default(),
        );
        let report = engine.drain().await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(f.remote.submitted.lock().len(), 1);
        assert_eq!(engine.queue().depth().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replayed_transaction_applies_once_on_server() {
        let f = fixture(true);
        let transaction = tx(TransactionKind::Addition, 50);
        enqueue_tx(&f, transaction.clone(), 3).await;
        f.engine.drain().await.unwrap();

        // The same transaction queued again, as after a crash between the
        // server-side apply and the local dequeue
        enqueue_tx(&f, transaction, 3).await;
        f.engine.drain().await.unwrap();

        assert_eq!(f.remote.submitted.lock().len(), 2);
        assert_eq!(f.remote.transaction_count(), 1);
        assert_eq!(f.remote.balance(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconcile_preserves_mutations() {
        let f = fixture(true);
        let ledger = Arc::new(CreditLedger::new(
            f.vendor.clone(),
            f.storage.clone(),
            &Config::default(),
            f.sink.clone(),
        ));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .add_credits(10, "PAY_123456789", Decimal::from(100u32))
                    .await
                    .unwrap();
            }));
        }
        for _ in 0..10 {
            let engine = f.engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.reconcile().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // No mutation is lost to a concurrent merge
        assert_eq!(f.storage.load_transactions(&f.vendor).unwrap().len(), 10);
        assert_eq!(f.storage.load_operations(&f.vendor).unwrap().len(), 10);
        assert_eq!(
            f.storage
                .get_balance(&f.vendor)
                .unwrap()
                .unwrap()
                .current_balance,
            100
        );
    }

    #[tokio::test]
    async fn test_reconcile_invalidates_ledger_cache() {
        let f = fixture(true);
        let ledger = CreditLedger::new(
            f.vendor.clone(),
            f.storage.clone(),
            &Config::default(),
            f.sink.clone(),
        );
        let engine = SyncEngine::new(
            f.vendor.clone(),
            f.storage.clone(),
            f.remote.clone(),
            Arc::new(WatchOracle::new(true)),
            f.sink.clone(),
            SyncConfig::default(),
        )
        .with_cache(ledger.cache_handle());

        put_local_state(&f, 30, &[]);
        assert_eq!(ledger.current_balance().await.unwrap(), 30); // warm
        f.remote.set_balance(45);

        engine.drain().await.unwrap();

        // Fresh read of the merged balance, not the pre-sync cached value
        assert_eq!(ledger.current_balance().await.unwrap(), 45);
    }

    #[tokio::test]
    async fn test_recovery_invalidates_ledger_cache() {
        let f = fixture(true);
        let ledger = CreditLedger::new(
            f.vendor.clone(),
            f.storage.clone(),
            &Config::default(),
            f.sink.clone(),
        );
        let engine = SyncEngine::new(
            f.vendor.clone(),
            f.storage.clone(),
            f.remote.clone(),
            Arc::new(WatchOracle::new(true)),
            f.sink.clone(),
            SyncConfig::default(),
        )
        .with_cache(ledger.cache_handle());

        // Corrupt snapshot, cached by the ledger before detection
        put_local_state(&f, 10, &[tx(TransactionKind::Addition, 50)]);
        assert_eq!(ledger.current_balance().await.unwrap(), 10);

        f.remote.set_balance(42);
        f.remote
            .set_transactions(vec![tx(TransactionKind::Addition, 42)]);

        engine.recover_from_corruption().await.unwrap();

        assert_eq!(ledger.current_balance().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_reconcile_adopts_higher_concurrent_balance() {
        let f = fixture(true);
        put_local_state(&f, 30, &[]);
        f.remote.set_balance(45);

        let report = f.engine.drain().await.unwrap();
        assert!(report.conflicts >= 1);

        let balance = f.storage.get_balance(&f.vendor).unwrap().unwrap();
        assert_eq!(balance.current_balance, 45);
        assert_eq!(balance.sync_status, SyncStatus::Synced);
        assert!(f.sink.contains("conflict"));
    }

    #[tokio::test]
    async fn test_failed_reconcile_marks_balance_error() {
        let f = fixture(true);
        put_local_state(&f, 30, &[]);
        f.remote.fail_next_fetches(10);

        let report = f.engine.drain().await.unwrap();
        assert!(!report.reconciled);

        let balance = f.storage.get_balance(&f.vendor).unwrap().unwrap();
        assert_eq!(balance.sync_status, SyncStatus::Error);
        assert!(f.storage.last_sync(&f.vendor).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recovery_noop_when_healthy() {
        let f = fixture(true);
        put_local_state(&f, 50, &[tx(TransactionKind::Addition, 50)]);

        let report = f.engine.recover_from_corruption().await.unwrap();
        assert!(report.is_healthy());
        // Untouched
        assert_eq!(
            f.storage
                .get_balance(&f.vendor)
                .unwrap()
                .unwrap()
                .current_balance,
            50
        );
    }

    #[tokio::test]
    async fn test_recovery_rebuilds_from_server() {
        let f = fixture(true);
        // Balance disagrees with the log
        put_local_state(&f, 10, &[tx(TransactionKind::Addition, 50)]);

        f.remote.set_balance(42);
        f.remote
            .set_transactions(vec![tx(TransactionKind::Addition, 42)]);

        let report = f.engine.recover_from_corruption().await.unwrap();
        assert!(report.is_healthy(), "{:?}", report.issues);

        let balance = f.storage.get_balance(&f.vendor).unwrap().unwrap();
        assert_eq!(balance.current_balance, 42);
        assert_eq!(balance.sync_status, SyncStatus::Synced);
        assert_eq!(f.storage.load_transactions(&f.vendor).unwrap().len(), 1);
        assert!(f.sink.contains("restored from server"));
    }

    #[tokio::test]
    async fn test_recovery_refuses_to_run_offline() {
        let f = fixture(false);
        put_local_state(&f, 10, &[tx(TransactionKind::Addition, 50)]);

        let result = f.engine.recover_from_corruption().await;
        assert!(matches!(result, Err(Error::DataCorruption(_))));

        // Nothing was wiped
        assert_eq!(f.storage.load_transactions(&f.vendor).unwrap().len(), 1);
        assert_eq!(
            f.storage
                .get_balance(&f.vendor)
                .unwrap()
                .unwrap()
                .current_balance,
            10
        );
    }

    #[tokio::test]
    async fn test_recovery_survives_transient_fetch_failure() {
        let f = fixture(true);
        put_local_state(&f, 10, &[tx(TransactionKind::Addition, 50)]);
        f.remote.set_balance(42);
        f.remote
            .set_transactions(vec![tx(TransactionKind::Addition, 42)]);
        f.remote.fail_next_fetches(1);

        let report = f.engine.recover_from_corruption().await.unwrap();
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_kick_triggers_drain() {
        let f = fixture(true);

        let handle = spawn_sync_engine(f.engine.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        enqueue_tx(&f, tx(TransactionKind::Deduction, 10), 3).await;
        handle.kick();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(f.remote.submitted.lock().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_triggers_drain() {
        let (storage, _temp) = open_storage();
        let vendor = VendorId::new("vendor-1");
        let remote = Arc::new(MockRemoteLedger::new(&vendor));
        let oracle = Arc::new(WatchOracle::new(false));
        let sink = Arc::new(MemorySink::new());
        let config = SyncConfig {
            reconnect_settle_ms: 10,
            ..SyncConfig::default()
        };
        let engine = Arc::new(SyncEngine::new(
            vendor.clone(),
            storage,
            remote.clone(),
            oracle.clone(),
            sink,
            config,
        ));

        let op = OfflineOperation::new(
            OperationKind::TransactionSubmit,
            OperationPayload::Transaction(tx(TransactionKind::Deduction, 10)),
            3,
        );
        engine.queue().enqueue(op).await.unwrap();

        let handle = spawn_sync_engine(engine.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(remote.submitted.lock().is_empty());

        oracle.set_online(true);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(remote.submitted.lock().len(), 1);
        handle.shutdown().await;
    }
}
