//! LRU Strategy Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{Bounds, CacheKey, EvictionStrategy, Storage};
use crate::error::Result;

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Order of keys by access time
    order: VecDeque<CacheKey>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    ///
    /// If key exists, removes it first then adds to front.
    /// If key is new, just adds to front.
    pub fn touch(&mut self, key: &CacheKey) {
        self.remove(key);
        self.order.push_front(key.clone());
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<CacheKey> {
        self.order.pop_back()
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.back()
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.order.iter().any(|k| k == key)
    }
}

// == LRU Strategy ==
/// Evicts the least recently set or hit digest first.
#[derive(Debug, Default)]
pub struct LruStrategy {
    bounds: Bounds,
    tracker: Mutex<LruTracker>,
}

impl LruStrategy {
    // == Constructor ==
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            tracker: Mutex::new(LruTracker::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.tracker.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.lock().is_empty()
    }

    /// Next key to evict, if any.
    pub fn peek_oldest(&self) -> Option<CacheKey> {
        self.tracker.lock().peek_oldest().cloned()
    }
}

impl EvictionStrategy for LruStrategy {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn handle_set(&self, key: &CacheKey, _value: &[u8]) -> Result<()> {
        self.tracker.lock().touch(key);
        Ok(())
    }

    fn handle_hit(&self, key: &CacheKey, _value: &[u8]) -> Result<()> {
        self.tracker.lock().touch(key);
        Ok(())
    }

    fn remove_keys(&self, storage: &dyn Storage) -> Result<usize> {
        let mut tracker = self.tracker.lock();
        let mut evicted = 0;
        while self.is_excess(storage) {
            let Some(key) = tracker.evict_oldest() else {
                break;
            };
            storage.delete(&key)?;
            debug!(key = %key, "Evicted cache entry (lru)");
            evicted += 1;
        }
        Ok(evicted)
    }

    fn reset(&self, key: &CacheKey) -> Result<()> {
        self.tracker.lock().remove(key);
        Ok(())
    }
}
