//! Bounded, time-expiring cache used for embeddings, search results,
//! and historical-context bundles.
//!
//! Each [`TtlCache`] holds at most `capacity` entries. Inserting into a
//! full cache evicts the least-recently-used entry; an entry read after
//! its `expires_at` is dropped and reported as a miss. Nothing is
//! persisted.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Rough in-memory footprint of a cached value, for cache statistics.
pub trait CacheWeight {
    fn approx_bytes(&self) -> usize;
}

impl CacheWeight for f32 {
    fn approx_bytes(&self) -> usize {
        std::mem::size_of::<f32>()
    }
}

impl<T: CacheWeight> CacheWeight for Vec<T> {
    fn approx_bytes(&self) -> usize {
        self.iter().map(CacheWeight::approx_bytes).sum::<usize>() + std::mem::size_of::<Vec<T>>()
    }
}

/// A cached value with its insertion and expiry instants.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let inserted_at = Instant::now();
        Self {
            value,
            inserted_at,
            expires_at: inserted_at + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Entry count and approximate size of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub approx_size_bytes: usize,
}

/// String-keyed LRU cache with a fixed per-cache TTL.
///
/// All methods take `&self`; the map sits behind a mutex so one cache
/// can be shared across tasks.
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache. A `capacity` of zero is raised to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Look up `key`, marking it most recently used. Expired entries are
    /// removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert or overwrite `key`, resetting its timestamps.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry::new(value, self.ttl);
        self.lock().put(key.into(), entry);
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().pop(key).map(|entry| entry.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.lock();
        entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Number of stored entries, including any not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}

impl<V: Clone + CacheWeight> TtlCache<V> {
    /// Purge expired entries, then report what is left.
    pub fn stats(&self) -> CacheStats {
        self.purge_expired();
        let entries = self.lock();
        let approx_size_bytes = entries
            .iter()
            .map(|(key, entry)| key.len() + entry.value.approx_bytes())
            .sum();
        CacheStats {
            entry_count: entries.len(),
            approx_size_bytes,
        }
    }
}
