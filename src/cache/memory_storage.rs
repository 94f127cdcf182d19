use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::CacheStorage;

const DEFAULT_CAPACITY: usize = 1024;

struct Entry<V> {
    value: V,
    expired_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        match &self.expired_at {
            Some(expired_at) => Instant::now() >= *expired_at,
            None => false,
        }
    }
}

/// A bounded in-memory cache storage.
///
/// Entries are evicted in least-recently-used order once the capacity is
/// reached, and optionally after a fixed time-to-live.
pub struct MemoryStorage<V> {
    lru: Mutex<LruCache<String, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<V> Default for MemoryStorage<V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<V> MemoryStorage<V> {
    /// Create a `MemoryStorage` holding at most 1024 entries.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a `MemoryStorage` holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl: None,
        }
    }

    /// Sets the time-to-live of new entries.
    #[must_use]
    pub fn ttl(self, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Returns `true` if the storage holds no entry.
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lru.lock().clear();
    }
}

impl<V: Clone + Send> CacheStorage<V> for MemoryStorage<V> {
    fn get(&self, key: &str) -> Option<V> {
        let mut lru = self.lru.lock();
        let expired = match lru.get(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            lru.pop(key);
        }
        None
    }

    fn insert_if_absent(&self, key: &str, value: V) -> V {
        let mut lru = self.lru.lock();
        if let Some(entry) = lru.get(key) {
            if !entry.is_expired() {
                return entry.value.clone();
            }
        }

        lru.put(
            key.to_string(),
            Entry {
                value: value.clone(),
                expired_at: self.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        value
    }
}
