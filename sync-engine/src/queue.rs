//! Durable offline operation queue
//!
//! A thin state machine over the storage layer's queue column family.
//! Operations move Pending -> Processing -> gone on success; a failed
//! attempt bumps the retry count and either requeues the operation or
//! parks it as Failed. Failed operations stay in the queue for
//! inspection until purged.
//!
//! The ledger enqueues by committing the operation in the same write
//! batch as the mutation it replays; the engine enqueues reconcile
//! markers through [`OfflineQueue::enqueue`].

use credit_core::{Error, OfflineOperation, OperationStatus, Result, Storage, VendorId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-vendor view of the durable queue
///
/// Every mutating method holds the vendor's shared mutation lock: the
/// queue is stored as one array, and a rewrite racing a ledger commit
/// would drop whichever side loaded first.
pub struct OfflineQueue {
    storage: Arc<Storage>,
    vendor: VendorId,
    lock: Arc<Mutex<()>>,
}

impl OfflineQueue {
    /// Create a queue view for one vendor
    pub fn new(storage: Arc<Storage>, vendor: VendorId) -> Self {
        let lock = storage.mutation_lock(&vendor);
        Self {
            storage,
            vendor,
            lock,
        }
    }

    /// Append an operation
    pub async fn enqueue(&self, op: OfflineOperation) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ops = self.storage.load_operations(&self.vendor)?;
        ops.push(op);
        self.storage.replace_operations(&self.vendor, &ops)
    }

    /// Pending operations in FIFO order
    pub fn pending(&self) -> Result<Vec<OfflineOperation>> {
        Ok(self
            .storage
            .load_operations(&self.vendor)?
            .into_iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .collect())
    }

    /// Operations that exhausted their retries
    pub fn failed(&self) -> Result<Vec<OfflineOperation>> {
        Ok(self
            .storage
            .load_operations(&self.vendor)?
            .into_iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .collect())
    }

    /// Number of operations awaiting replay
    pub fn depth(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    /// Mark an operation as in flight
    pub async fn mark_processing(&self, op_id: &str) -> Result<()> {
        self.update(op_id, |op| {
            op.status = OperationStatus::Processing;
        })
        .await
    }

    /// Return interrupted operations to the pending state
    ///
    /// A durably persisted Processing status means a drain died between
    /// marking the operation and recording its outcome. Left alone it
    /// would never be replayed: `pending()` skips it and no other
    /// transition can reach it. Returns how many were released.
    pub async fn requeue_interrupted(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut ops = self.storage.load_operations(&self.vendor)?;
        let mut released = 0;
        for op in ops.iter_mut() {
            if op.status == OperationStatus::Processing {
                op.status = OperationStatus::Pending;
                released += 1;
            }
        }
        if released > 0 {
            self.storage.replace_operations(&self.vendor, &ops)?;
            warn!(
                vendor_id = %self.vendor,
                released,
                "Requeued operations left in flight by an interrupted drain"
            );
        }
        Ok(released)
    }

    /// Remove a successfully replayed operation
    pub async fn complete(&self, op_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ops = self.storage.load_operations(&self.vendor)?;
        let before = ops.len();
        ops.retain(|op| op.id != op_id);
        if ops.len() == before {
            return Err(Error::Sync(format!("Operation {} not in queue", op_id)));
        }
        self.storage.replace_operations(&self.vendor, &ops)?;

        debug!(vendor_id = %self.vendor, op_id, "Operation synced and dequeued");
        Ok(())
    }

    /// Record a failed replay attempt
    ///
    /// Requeues the operation while retries remain; otherwise parks it as
    /// Failed. Returns the resulting status.
    pub async fn record_failure(&self, op_id: &str) -> Result<OperationStatus> {
        let mut status = OperationStatus::Pending;
        self.update(op_id, |op| {
            op.retry_count += 1;
            op.status = if op.can_retry() {
                OperationStatus::Pending
            } else {
                OperationStatus::Failed
            };
            status = op.status;
        })
        .await?;

        if status == OperationStatus::Failed {
            warn!(vendor_id = %self.vendor, op_id, "Operation failed permanently");
        }
        Ok(status)
    }

    /// Drop all failed operations, returning how many were removed
    pub async fn purge_failed(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut ops = self.storage.load_operations(&self.vendor)?;
        let before = ops.len();
        ops.retain(|op| op.status != OperationStatus::Failed);
        let removed = before - ops.len();
        if removed > 0 {
            self.storage.replace_operations(&self.vendor, &ops)?;
        }
        Ok(removed)
    }

    async fn update(&self, op_id: &str, f: impl FnOnce(&mut OfflineOperation)) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ops = self.storage.load_operations(&self.vendor)?;
        let op = ops
            .iter_mut()
            .find(|op| op.id == op_id)
            .ok_or_else(|| Error::Sync(format!("Operation {} not in queue", op_id)))?;
        f(op);
        self.storage.replace_operations(&self.vendor, &ops)
    }
}
