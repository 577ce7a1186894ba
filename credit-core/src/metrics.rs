//! Metrics collection for observability
//!
//! Prometheus metrics for the ledger and sync engine. Collectors are
//! registered on an owned registry rather than the process-global default
//! so constructing a second instance (tests, multiple vendor sessions)
//! cannot collide.

use prometheus::{IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Successful deductions
    pub deductions_total: IntCounter,

    /// Successful additions
    pub additions_total: IntCounter,

    /// Penalties applied
    pub penalties_total: IntCounter,

    /// Deductions rejected for insufficient balance
    pub insufficient_total: IntCounter,

    /// Cache hits (balance + transaction queries)
    pub cache_hits_total: IntCounter,

    /// Cache misses
    pub cache_misses_total: IntCounter,

    /// Pending offline operations
    pub queue_depth: IntGauge,

    /// Drain passes started
    pub drains_total: IntCounter,

    /// Operations replayed successfully
    pub operations_synced_total: IntCounter,

    /// Operations that exhausted their retries
    pub operations_failed_total: IntCounter,

    /// Conflicts resolved during sync
    pub conflicts_resolved_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deductions_total = IntCounter::new(
            "credit_deductions_total",
            "Successful credit deductions",
        )?;
        registry.register(Box::new(deductions_total.clone()))?;

        let additions_total =
            IntCounter::new("credit_additions_total", "Successful credit additions")?;
        registry.register(Box::new(additions_total.clone()))?;

        let penalties_total =
            IntCounter::new("credit_penalties_total", "Penalties applied")?;
        registry.register(Box::new(penalties_total.clone()))?;

        let insufficient_total = IntCounter::new(
            "credit_insufficient_rejections_total",
            "Deductions rejected for insufficient balance",
        )?;
        registry.register(Box::new(insufficient_total.clone()))?;

        let cache_hits_total =
            IntCounter::new("credit_cache_hits_total", "Cache hits")?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total =
            IntCounter::new("credit_cache_misses_total", "Cache misses")?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        let queue_depth =
            IntGauge::new("credit_offline_queue_depth", "Pending offline operations")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let drains_total =
            IntCounter::new("credit_sync_drains_total", "Drain passes started")?;
        registry.register(Box::new(drains_total.clone()))?;

        let operations_synced_total = IntCounter::new(
            "credit_operations_synced_total",
            "Operations replayed successfully",
        )?;
        registry.register(Box::new(operations_synced_total.clone()))?;

        let operations_failed_total = IntCounter::new(
            "credit_operations_failed_total",
            "Operations that exhausted their retries",
        )?;
        registry.register(Box::new(operations_failed_total.clone()))?;

        let conflicts_resolved_total = IntCounter::new(
            "credit_conflicts_resolved_total",
            "Conflicts resolved during sync",
        )?;
        registry.register(Box::new(conflicts_resolved_total.clone()))?;

        Ok(Self {
            deductions_total,
            additions_total,
            penalties_total,
            insufficient_total,
            cache_hits_total,
            cache_misses_total,
            queue_depth,
            drains_total,
            operations_synced_total,
            operations_failed_total,
            conflicts_resolved_total,
            registry,
        })
    }

    /// Record a cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits_total.inc();
        } else {
            self.cache_misses_total.inc();
        }
    }

    /// Update the queue depth gauge
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
