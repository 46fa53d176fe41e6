//! FIFO Strategy Module
//!
//! Evicts digests in first-seen order; reads do not affect the order.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{Bounds, CacheKey, EvictionStrategy, Storage};
use crate::error::Result;

// == FIFO Strategy ==
/// Keys are stored in a VecDeque where:
/// - Front = First seen (next to evict)
/// - Back = Most recently added
#[derive(Debug, Default)]
pub struct FifoStrategy {
    bounds: Bounds,
    keys: Mutex<VecDeque<CacheKey>>,
}

impl FifoStrategy {
    // == Constructor ==
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            keys: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    /// Next key to evict, if any.
    pub fn peek_oldest(&self) -> Option<CacheKey> {
        self.keys.lock().front().cloned()
    }
}

impl EvictionStrategy for FifoStrategy {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn handle_set(&self, key: &CacheKey, _value: &[u8]) -> Result<()> {
        let mut keys = self.keys.lock();
        if !keys.contains(key) {
            keys.push_back(key.clone());
        }
        Ok(())
    }

    fn handle_hit(&self, _key: &CacheKey, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn remove_keys(&self, storage: &dyn Storage) -> Result<usize> {
        let mut keys = self.keys.lock();
        let mut evicted = 0;
        while self.is_excess(storage) {
            let Some(key) = keys.pop_front() else {
                break;
            };
            storage.delete(&key)?;
            debug!(key = %key, "Evicted cache entry (fifo)");
            evicted += 1;
        }
        Ok(evicted)
    }

    fn reset(&self, key: &CacheKey) -> Result<()> {
        self.keys.lock().retain(|k| k != key);
        Ok(())
    }
}
