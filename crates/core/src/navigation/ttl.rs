//! Bounded in-memory cache tier with TTL expiry and LRU eviction.
//!
//! Reads take the shared lock and bump an atomic access stamp, so
//! concurrent readers never serialize on each other. Writers take the
//! exclusive lock only for the map mutation itself.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::CacheTier;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// Nanoseconds since the cache epoch of the last read or write.
    last_access: AtomicU64,
}

/// Hit/miss counters for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct TtlCache<K, V> {
    name: &'static str,
    max_size: usize,
    ttl: Duration,
    epoch: Instant,
    entries: RwLock<HashMap<K, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, max_size: usize, ttl: Duration) -> Self {
        Self {
            name,
            max_size: max_size.max(1),
            ttl,
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_tier(name: &'static str, tier: &CacheTier) -> Self {
        Self::new(name, tier.max_size, tier.ttl())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn stamp(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        entry.inserted_at.elapsed() > self.ttl
    }

    /// Cached value for `key`, unless absent or expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !self.is_expired(entry) => {
                entry.last_access.store(self.stamp(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace `key`.
    ///
    /// Expired entries are dropped first; if the tier is still full the
    /// least recently used entry is evicted.
    pub async fn insert(&self, key: K, value: V) {
        let now = self.stamp();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);

            if entries.len() >= self.max_size
                && let Some(lru) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone())
            {
                entries.remove(&lru);
                tracing::trace!(cache = self.name, "evicted least recently used entry");
            }
        }

        entries.insert(key, Entry { value, inserted_at: Instant::now(), last_access: AtomicU64::new(now) });
    }

    /// Drop every entry whose key matches `predicate`.
    pub async fn invalidate_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop expired entries. Returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().await.len(),
        }
    }
}
