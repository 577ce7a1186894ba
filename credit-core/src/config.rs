//! Configuration for the credit ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Cache tuning
    pub cache: CacheConfig,

    /// Input limits
    pub limits: LimitConfig,

    /// Sync engine tuning
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/credit-ledger"),
            cache: CacheConfig::default(),
            limits: LimitConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Balance TTL in seconds (short: the balance changes frequently)
    pub balance_ttl_secs: u64,

    /// Transaction query result TTL in seconds
    pub transaction_ttl_secs: u64,

    /// Distinct transaction query keys retained (LRU bound)
    pub transaction_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            balance_ttl_secs: 30,
            transaction_ttl_secs: 300,
            transaction_capacity: 50,
        }
    }
}

/// Input limits for ledger operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum order value accepted by required-credit computation
    pub max_order_value: u64,

    /// Maximum credits a single operation may move
    pub max_credits_per_operation: u64,

    /// Minimum recharge payment amount
    pub min_payment_amount: u64,

    /// Maximum recharge payment amount
    pub max_payment_amount: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_order_value: 1_000_000,
            max_credits_per_operation: 100_000,
            min_payment_amount: 10,
            max_payment_amount: 50_000,
        }
    }
}

/// Sync engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Background drain interval while online (seconds)
    pub auto_sync_interval_secs: u64,

    /// Settle delay after reconnection before draining (milliseconds)
    pub reconnect_settle_ms: u64,

    /// Concurrent-update window for balance conflicts (seconds)
    pub conflict_window_secs: u64,

    /// Replay attempts before a queued operation is marked failed
    pub max_operation_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_interval_secs: 300, // 5 minutes
            reconnect_settle_ms: 1_000,
            conflict_window_secs: 300,
            max_operation_retries: 3,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CREDIT_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(interval) = std::env::var("CREDIT_AUTO_SYNC_INTERVAL_SECS") {
            config.sync.auto_sync_interval_secs = interval
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid sync interval: {}", e)))?;
        }

        Ok(config)
    }
}
