//! Retry execution with exponential backoff and jitter
//!
//! Operations are classified by [`ErrorKind`]: anything outside the
//! config's retryable set rethrows immediately. Per-operation profiles
//! differ — credit mutations are the correctness-critical path and get the
//! most patience; payment verification retries only network-class failures
//! to avoid double-charging ambiguity; recovery gets a single retry.

use crate::error::{Error, ErrorKind, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry tuning for one class of operation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,
    /// Delay ceiling (milliseconds)
    pub max_delay_ms: u64,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the computed delay
    pub jitter_factor: f64,
    /// Error kinds worth retrying
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable: vec![ErrorKind::Network, ErrorKind::Sync],
        }
    }
}

impl RetryConfig {
    /// Credit mutation profile: the correctness-critical path
    pub fn credit_mutation() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable: vec![
                ErrorKind::Storage,
                ErrorKind::Network,
                ErrorKind::Sync,
                ErrorKind::Io,
            ],
        }
    }

    /// Payment verification profile
    ///
    /// Only network-class failures retry; an ambiguous gateway response
    /// must not be replayed.
    pub fn payment_verification() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable: vec![ErrorKind::Network],
        }
    }

    /// Recovery profile: a single retry
    pub fn recovery() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            retryable: vec![ErrorKind::Network, ErrorKind::Sync, ErrorKind::Storage],
        }
    }

    fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay for the nth retry: capped exponential backoff with jitter
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// Executes operations with retry, tracking in-flight operations so a
/// caller can abandon one
///
/// Cancellation stops further retries; it does not roll back local state
/// an earlier attempt already applied.
#[derive(Default)]
pub struct RetryExecutor {
    active: DashMap<String, Arc<AtomicBool>>,
}

impl RetryExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel an in-flight operation; returns false if it is not running
    pub fn cancel(&self, op_id: &str) -> bool {
        match self.active.get(op_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Number of operations currently in flight
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    /// Execute an operation with retry per config
    pub async fn execute<T, F, Fut>(
        &self,
        op_id: &str,
        config: &RetryConfig,
        operation: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active.insert(op_id.to_string(), cancelled.clone());

        let result = self
            .run_attempts(op_id, config, &cancelled, operation)
            .await;

        self.active.remove(op_id);
        result
    }

    async fn run_attempts<T, F, Fut>(
        &self,
        op_id: &str,
        config: &RetryConfig,
        cancelled: &AtomicBool,
        operation: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                let delay = config.delay_for(attempt - 1);
                warn!(
                    op_id,
                    attempt,
                    max_retries = config.max_retries,
                    ?delay,
                    "Retrying operation"
                );
                tokio::time::sleep(delay).await;
            }

            if cancelled.load(Ordering::SeqCst) {
                return Err(Error::Concurrency(format!(
                    "Operation {} cancelled",
                    op_id
                )));
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(op_id, attempt, "Operation succeeded on retry");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !config.is_retryable(e.kind()) {
                        warn!(op_id, error = %e, "Non-retryable error");
                        return Err(e);
                    }

                    warn!(
                        op_id,
                        attempt = attempt + 1,
                        attempts = config.max_retries + 1,
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Other("Retries exhausted without error".to_string())))
    }
}
