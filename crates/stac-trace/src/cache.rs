//! Bounded in-memory caches for lookup results.
//!
//! ## Eviction
//!
//! Every entry carries a TTL. When the cache is at `max_entries` and a new
//! key is inserted, expired entries are dropped first; if none are expired,
//! the least-recently-accessed entry is evicted.
//!
//! The cache is shared by reference between tasks. Its mutex is held only for
//! the duration of a map operation, never across an await.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default number of entries before LRU eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Default time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// Size- and age-bounded key/value cache.
pub struct BoundedCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    max_entries: usize,
    ttl: Duration,
}

impl<V: Clone> Default for BoundedCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl<V: Clone> BoundedCache<V> {
    /// `max_entries` is floored at one.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        if entries.get(key)?.is_expired(self.ttl) {
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.touch();
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = self.lock();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            Self::evict(&mut entries, self.ttl);
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed: now,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove all expired entries.
    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        self.lock().retain(|_, entry| !entry.is_expired(ttl));
    }

    fn evict(entries: &mut HashMap<String, CacheEntry<V>>, ttl: Duration) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl));
        if entries.len() < before {
            return;
        }

        if let Some(lru) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone())
        {
            tracing::debug!("evicting LRU cache entry: {lru}");
            entries.remove(&lru);
        }
    }
}
