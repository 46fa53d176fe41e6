//! Eviction Strategy Module
//!
//! Strategies keep their own bookkeeping of digests and decide which entries
//! leave a `Storage` once it grows past its bounds.

use serde::Deserialize;

use crate::cache::{CacheKey, Storage};
use crate::error::Result;

// == Bounds ==
/// Capacity limits. An unset bound never triggers eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Bounds {
    /// Maximum total size in bytes
    pub max_size: Option<u64>,
    /// Maximum number of entries
    pub max_count: Option<u64>,
}

impl Bounds {
    pub fn new(max_size: Option<u64>, max_count: Option<u64>) -> Self {
        Self { max_size, max_count }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_size(max_size: u64) -> Self {
        Self::new(Some(max_size), None)
    }

    pub fn max_count(max_count: u64) -> Self {
        Self::new(None, Some(max_count))
    }

    // == Is Exceeded ==
    /// True if either set bound is strictly exceeded.
    pub fn is_exceeded(&self, size: u64, count: u64) -> bool {
        self.max_size.is_some_and(|max| size > max) || self.max_count.is_some_and(|max| count > max)
    }
}

// == Eviction Strategy Trait ==
/// Bookkeeping and eviction policy for one cache.
///
/// Implementations lock internally. `remove_keys` holds the strategy lock for
/// the whole sweep, so sweeps are serialized; storage never calls back into a
/// strategy, so this cannot deadlock.
pub trait EvictionStrategy: Send + Sync {
    /// Limits this strategy enforces.
    fn bounds(&self) -> Bounds;

    /// Called after `key` has been written.
    fn handle_set(&self, key: &CacheKey, value: &[u8]) -> Result<()>;

    /// Called after a read of `key` found a value.
    fn handle_hit(&self, key: &CacheKey, value: &[u8]) -> Result<()>;

    /// Called after a read of `key` found nothing.
    fn handle_missing(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }

    /// Evicts entries from `storage` until it is back within bounds or
    /// nothing evictable is left.
    ///
    /// # Returns
    /// The number of keys evicted.
    fn remove_keys(&self, storage: &dyn Storage) -> Result<usize>;

    fn is_excess(&self, storage: &dyn Storage) -> bool {
        self.bounds().is_exceeded(storage.size(), storage.count())
    }

    /// Forgets `key`, e.g. after it was removed from storage out of band.
    fn reset(&self, key: &CacheKey) -> Result<()>;
}

// == No Eviction ==
/// Strategy for unmanaged bounds: tracks nothing and never evicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEviction;

impl EvictionStrategy for NoEviction {
    fn bounds(&self) -> Bounds {
        Bounds::unbounded()
    }

    fn handle_set(&self, _key: &CacheKey, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn handle_hit(&self, _key: &CacheKey, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn remove_keys(&self, _storage: &dyn Storage) -> Result<usize> {
        Ok(0)
    }

    fn is_excess(&self, _storage: &dyn Storage) -> bool {
        false
    }

    fn reset(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }
}
