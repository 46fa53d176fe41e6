//! Cache Store Module
//!
//! Main cache engine combining a storage backend, an eviction strategy and a
//! key hash. Every write is followed by a synchronous eviction sweep.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::cache::digest::default_hash_fn;
use crate::cache::{CacheKey, EvictionStrategy, HashFn, HitRateCounter, NoEviction, Storage, Value};

// == Cache ==
/// A storage plus the strategy that bounds it.
///
/// Holds no lock of its own; storage and strategy lock internally, so a
/// `Cache` can be shared across threads behind an `Arc`.
pub struct Cache {
    /// Byte storage
    storage: Box<dyn Storage>,
    /// Eviction bookkeeping
    strategy: Box<dyn EvictionStrategy>,
    /// Caller key to digest
    hash_fn: HashFn,
    /// Hit/miss statistics
    rate: HitRateCounter,
    /// Keys removed by eviction sweeps
    evictions: AtomicU64,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache with MD5 key hashing.
    ///
    /// # Arguments
    /// * `storage` - Backend holding the values
    /// * `strategy` - Eviction strategy enforcing the bounds
    pub fn new(storage: impl Storage + 'static, strategy: impl EvictionStrategy + 'static) -> Self {
        Self::from_parts(Box::new(storage), Box::new(strategy), default_hash_fn())
    }

    /// Creates a cache that never evicts.
    pub fn unbounded(storage: impl Storage + 'static) -> Self {
        Self::new(storage, NoEviction)
    }

    /// Creates a cache from boxed parts and a custom hash function.
    pub fn from_parts(
        storage: Box<dyn Storage>,
        strategy: Box<dyn EvictionStrategy>,
        hash_fn: HashFn,
    ) -> Self {
        Self {
            storage,
            strategy,
            hash_fn,
            rate: HitRateCounter::new(),
            evictions: AtomicU64::new(0),
        }
    }

    /// Replaces the key hash function.
    pub fn with_hash_fn(mut self, hash_fn: HashFn) -> Self {
        self.hash_fn = hash_fn;
        self
    }

    fn digest(&self, key: &[u8]) -> CacheKey {
        (self.hash_fn)(key)
    }

    // == Get ==
    /// Retrieves a value by key, recording a hit or a miss.
    ///
    /// # Arguments
    /// * `key` - The caller key to look up
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Value> {
        let key = key.as_ref();
        let digest = self.digest(key);

        match self.storage.get(&digest) {
            Some(value) => {
                self.rate.hit();
                if let Err(err) = self.strategy.handle_hit(&digest, &value) {
                    warn!(key = %digest, error = %err, "Strategy failed to record hit");
                }
                debug!(key = %digest, "Cache hit");
                Some(value)
            }
            None => {
                self.rate.missing();
                if let Err(err) = self.strategy.handle_missing(&digest) {
                    warn!(key = %digest, error = %err, "Strategy failed to record miss");
                }
                debug!(key = %digest, "Cache miss");
                None
            }
        }
    }

    // == Get Or ==
    /// Retrieves a value by key, falling back to `default` on a miss.
    pub fn get_or(&self, key: impl AsRef<[u8]>, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    // == Set ==
    /// Stores a value, then evicts until the storage is back within bounds.
    ///
    /// Returns false if the storage write failed; the eviction sweep runs either way.
    pub fn set(&self, key: impl AsRef<[u8]>, value: &[u8]) -> bool {
        let digest = self.digest(key.as_ref());

        let stored = match self.storage.set(&digest, value) {
            Ok(_) => {
                self.track_set(&digest, value);
                true
            }
            Err(err) => {
                warn!(key = %digest, error = %err, "Failed to store cache entry");
                // A failed write may still have left an entry behind; keep it evictable
                if self.storage.has(&digest) {
                    self.track_set(&digest, value);
                }
                false
            }
        };

        self.clean_up_storage();
        stored
    }

    fn track_set(&self, digest: &CacheKey, value: &[u8]) {
        if let Err(err) = self.strategy.handle_set(digest, value) {
            warn!(key = %digest, error = %err, "Strategy failed to record set");
        }
    }

    // == Delete ==
    /// Removes a key out of band and drops it from the strategy.
    ///
    /// Returns true if an entry was removed.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> bool {
        let digest = self.digest(key.as_ref());

        if let Err(err) = self.strategy.reset(&digest) {
            warn!(key = %digest, error = %err, "Strategy failed to forget key");
        }
        match self.storage.delete(&digest) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(key = %digest, error = %err, "Failed to delete cache entry");
                false
            }
        }
    }

    // == Clean Up ==
    fn clean_up_storage(&self) {
        match self.strategy.remove_keys(self.storage.as_ref()) {
            Ok(0) => {}
            Ok(evicted) => {
                self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                debug!(evicted, count = self.count(), size = self.size(), "Eviction sweep finished");
            }
            Err(err) => warn!(error = %err, "Eviction sweep failed"),
        }
    }

    // == Accessors ==
    /// Number of stored entries.
    pub fn count(&self) -> u64 {
        self.storage.count()
    }

    /// Total size of stored entries.
    pub fn size(&self) -> u64 {
        self.storage.size()
    }

    /// Hit/miss statistics.
    pub fn state(&self) -> &HitRateCounter {
        &self.rate
    }

    /// Total number of keys evicted by sweeps.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }
}

impl fmt::Display for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Cache [state={}, count={}, size={}, evictions={}]>",
            self.rate,
            self.count(),
            self.size(),
            self.evictions()
        )
    }
}
