//! Storage Module
//!
//! Byte-oriented backends a `Cache` reads from and writes to. Backends lock
//! internally, so every method takes `&self`.

use std::sync::Arc;

use crate::cache::CacheKey;
use crate::error::Result;

/// Stored value. Cloning shares the bytes instead of copying them.
pub type Value = Arc<[u8]>;

/// Computes the accounted size of a value.
pub type SizeFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

// == Storage Trait ==
/// Key/value backend keyed by digest.
///
/// `size` and `count` always reflect the live entries; neither `clear` nor
/// any other method is atomic with respect to concurrent writers.
pub trait Storage: Send + Sync {
    /// Stores `value` under `key`.
    ///
    /// # Returns
    /// - `Ok(true)` if a new entry was created
    /// - `Ok(false)` if an existing entry was replaced
    /// - `Err` if the write failed; any prior content is left untouched
    fn set(&self, key: &CacheKey, value: &[u8]) -> Result<bool>;

    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &CacheKey) -> Option<Value>;

    fn has(&self, key: &CacheKey) -> bool;

    /// Removes `key`. Returns whether an entry was removed.
    fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Removes every entry and zeroes the aggregate counters.
    fn clear(&self) -> Result<()>;

    /// Sum of the sizes of the live entries.
    fn size(&self) -> u64;

    /// Number of live entries.
    fn count(&self) -> u64;
}

/// Default size function: byte length.
pub fn byte_len() -> SizeFn {
    Arc::new(|value: &[u8]| value.len() as u64)
}
