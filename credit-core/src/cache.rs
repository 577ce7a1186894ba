//! In-memory TTL cache for balance and transaction queries
//!
//! Two TTL classes: the balance slot expires quickly because the balance
//! changes often and staleness is costly; transaction query results live
//! longer and are bounded to the N most-recent distinct query keys via LRU
//! eviction. Every mutation invalidates the balance slot and all
//! transaction entries at once — the data is small and append-only, so
//! coarse invalidation is the safe choice.
//!
//! Constructed at session start and owned by the ledger; the sync engine
//! holds a handle to the same cache so server-side merges and recovery
//! invalidate it too. No module-level state.

use crate::config::CacheConfig;
use crate::types::{CreditBalance, CreditTransaction};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A cached value with its creation time and validity window
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    data: T,
    cached_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Wrap a value with a TTL starting now
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Whether the entry has outlived its TTL
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }

    #[cfg(test)]
    fn backdate(&mut self, by: Duration) {
        self.cached_at -= by;
    }
}

/// Session-scoped cache owned by the ledger
pub struct LedgerCache {
    balance: RwLock<Option<CacheEntry<CreditBalance>>>,
    transactions: Mutex<TransactionCache>,
    balance_ttl: Duration,
    transaction_ttl: Duration,
}

struct TransactionCache {
    entries: HashMap<String, CacheEntry<Vec<CreditTransaction>>>,
    // Recency order, least recent at the front
    order: VecDeque<String>,
    capacity: usize,
}

impl TransactionCache {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl LedgerCache {
    /// Build a cache from config
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            balance: RwLock::new(None),
            transactions: Mutex::new(TransactionCache {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity: config.transaction_capacity.max(1),
            }),
            balance_ttl: Duration::from_secs(config.balance_ttl_secs),
            transaction_ttl: Duration::from_secs(config.transaction_ttl_secs),
        }
    }

    /// Cached balance, if present and fresh
    ///
    /// An expired entry counts as a miss and is evicted immediately.
    pub fn balance(&self) -> Option<CreditBalance> {
        {
            let slot = self.balance.read();
            match slot.as_ref() {
                Some(entry) if !entry.is_expired() => return Some(entry.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict under the write lock
        let mut slot = self.balance.write();
        if slot.as_ref().is_some_and(|e| e.is_expired()) {
            *slot = None;
        }
        slot.as_ref().map(|e| e.data.clone())
    }

    /// Cached balance regardless of TTL
    ///
    /// Cache-only fallback for when storage reads fail; callers log the
    /// staleness.
    pub fn balance_ignoring_ttl(&self) -> Option<CreditBalance> {
        self.balance.read().as_ref().map(|e| e.data.clone())
    }

    /// Store the balance snapshot
    pub fn store_balance(&self, balance: CreditBalance) {
        *self.balance.write() = Some(CacheEntry::new(balance, self.balance_ttl));
    }

    /// Cached transaction query result, if present and fresh
    pub fn transactions(&self, key: &str) -> Option<Vec<CreditTransaction>> {
        let mut cache = self.transactions.lock();

        let expired = match cache.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };

        if expired {
            cache.entries.remove(key);
            if let Some(pos) = cache.order.iter().position(|k| k == key) {
                cache.order.remove(pos);
            }
            return None;
        }

        cache.touch(key);
        cache.entries.get(key).map(|e| e.data.clone())
    }

    /// Store a transaction query result, evicting the least-recently-used
    /// key once over capacity
    pub fn store_transactions(&self, key: &str, data: Vec<CreditTransaction>) {
        let ttl = self.transaction_ttl;
        let mut cache = self.transactions.lock();
        cache.entries.insert(key.to_string(), CacheEntry::new(data, ttl));
        cache.touch(key);
        cache.evict_to_capacity();
    }

    /// Drop everything: balance slot and all transaction entries
    pub fn invalidate_all(&self) {
        *self.balance.write() = None;
        let mut cache = self.transactions.lock();
        cache.entries.clear();
        cache.order.clear();
    }

    #[cfg(test)]
    fn expire_balance(&self) {
        if let Some(entry) = self.balance.write().as_mut() {
            entry.backdate(Duration::from_secs(3600));
        }
    }

    #[cfg(test)]
    fn expire_transactions(&self, key: &str) {
        if let Some(entry) = self.transactions.lock().entries.get_mut(key) {
            entry.backdate(Duration::from_secs(3600));
        }
    }
}
