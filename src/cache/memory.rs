//! Memory Storage Module
//!
//! In-process storage backed by a concurrent map of per-entry locked records.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::storage::byte_len;
use crate::cache::{CacheEntry, CacheKey, SizeFn, Storage, Value};
use crate::error::Result;

// == Memory Storage ==
/// Map from digest to entry.
///
/// Different digests proceed concurrently; updates of one digest lock only
/// that entry plus the aggregate size counter.
pub struct MemoryStorage {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    /// Aggregate size; also serializes the insertion of new digests
    total_size: Mutex<u64>,
    size_fn: SizeFn,
}

impl MemoryStorage {
    // == Constructor ==
    /// Creates an empty storage that accounts values by byte length.
    pub fn new() -> Self {
        Self::with_size_fn(byte_len())
    }

    /// Creates an empty storage with a custom size function.
    pub fn with_size_fn(size_fn: SizeFn) -> Self {
        Self {
            entries: DashMap::new(),
            total_size: Mutex::new(0),
            size_fn,
        }
    }

    // == Insert ==
    /// Double-checked insert of an unseen digest. Returns false if another
    /// writer created the entry first.
    fn try_insert(&self, key: &CacheKey, value: &[u8], size: u64) -> bool {
        let mut total = self.total_size.lock();
        match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(CacheEntry::new(key.clone(), Value::from(value), size)));
                *total += size;
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    // == Update ==
    /// Replaces the value of an existing entry. Returns false if the entry
    /// vanished before it could be locked.
    fn try_update(&self, key: &CacheKey, value: &[u8], size: u64) -> bool {
        let entry = match self.entries.get(key) {
            Some(entry) => Arc::clone(entry.value()),
            None => return false,
        };

        let mut slot = entry.lock();
        if !slot.live {
            return false;
        }
        let mut total = self.total_size.lock();
        *total = *total + size - slot.size;
        slot.value = Value::from(value);
        slot.size = size;
        true
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn set(&self, key: &CacheKey, value: &[u8]) -> Result<bool> {
        let size = (self.size_fn)(value);

        loop {
            // Fast path skips the insert lock for digests already present
            if !self.entries.contains_key(key) && self.try_insert(key, value, size) {
                return Ok(true);
            }
            if self.try_update(key, value, size) {
                return Ok(false);
            }
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Value> {
        let entry = self.entries.get(key).map(|e| Arc::clone(e.value()))?;
        Some(entry.value())
    }

    fn has(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let Some((_, entry)) = self.entries.remove(key) else {
            return Ok(false);
        };

        let mut slot = entry.lock();
        slot.live = false;
        let mut total = self.total_size.lock();
        *total -= slot.size;
        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        let keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.delete(&key)?;
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        *self.total_size.lock()
    }

    fn count(&self) -> u64 {
        self.entries.len() as u64
    }
}
