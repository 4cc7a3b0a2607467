//! Cache Module
//!
//! Bounded in-memory cache of encoded records, keyed by key hash.
//!
//! ## Responsibilities
//! - Serve repeated reads without touching segment files
//! - Bound memory by the summed size of cached values
//! - Evict least recently used entries first
//!
//! ## Data Structure Choice
//! Arena-backed doubly linked list plus a hash map from key hash to slot,
//! behind its own Mutex (every lookup promotes, so reads mutate too).
//! Slot 0 is a sentinel: `next` of the sentinel is the most recently used
//! entry, `prev` the least recently used.

mod lru;

pub use lru::LruList;

use bytes::Bytes;
use parking_lot::Mutex;

/// Cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheUsage {
    /// Maximum bytes held
    pub capacity: u64,
    /// Bytes currently held
    pub used: u64,
    pub items: usize,
}

/// Thread-safe LRU cache of encoded records
pub struct Cache {
    inner: Mutex<LruList>,
}

impl Cache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Mutex::new(LruList::new(capacity)),
        }
    }

    /// Look up a key hash, promoting it to most recently used
    pub fn get(&self, key_hash: u32) -> Option<Bytes> {
        self.inner.lock().get(key_hash)
    }

    pub fn put(&self, key_hash: u32, value: Bytes) {
        self.inner.lock().insert(key_hash, value);
    }

    /// Insert only if `current` still holds once the cache lock is taken
    ///
    /// Readers use this to fill the cache without overwriting a newer value
    /// stored by a concurrent writer.
    pub fn put_if(&self, key_hash: u32, value: Bytes, current: impl FnOnce() -> bool) {
        let mut inner = self.inner.lock();
        if current() {
            inner.insert(key_hash, value);
        }
    }

    pub fn remove(&self, key_hash: u32) -> Option<Bytes> {
        self.inner.lock().remove(key_hash)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn usage(&self) -> CacheUsage {
        let inner = self.inner.lock();
        CacheUsage {
            capacity: inner.capacity(),
            used: inner.used(),
            items: inner.len(),
        }
    }
}
