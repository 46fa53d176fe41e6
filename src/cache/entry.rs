//! Cache Entry Module
//!
//! Defines the in-memory entry record owned by `MemoryStorage`.

use parking_lot::{Mutex, MutexGuard};

use crate::cache::{CacheKey, Value};

// == Entry Slot ==
/// Mutable part of an entry, guarded by the entry lock.
#[derive(Debug)]
pub struct EntrySlot {
    /// The stored value
    pub value: Value,
    /// Accounted size of `value`
    pub size: u64,
    /// Cleared once the entry has been removed from its storage map
    pub live: bool,
}

// == Cache Entry ==
/// A single stored value with its own lock for in-place updates.
#[derive(Debug)]
pub struct CacheEntry {
    /// Digest this entry is stored under
    pub key: CacheKey,
    slot: Mutex<EntrySlot>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a live entry.
    ///
    /// # Arguments
    /// * `key` - Digest the entry is stored under
    /// * `value` - The value to store
    /// * `size` - Accounted size of the value
    pub fn new(key: CacheKey, value: Value, size: u64) -> Self {
        Self {
            key,
            slot: Mutex::new(EntrySlot {
                value,
                size,
                live: true,
            }),
        }
    }

    // == Lock ==
    /// Locks the entry for an in-place update.
    pub fn lock(&self) -> MutexGuard<'_, EntrySlot> {
        self.slot.lock()
    }

    // == Value ==
    /// Returns the current value. Readers may observe a concurrent update.
    pub fn value(&self) -> Value {
        self.slot.lock().value.clone()
    }

    pub fn size(&self) -> u64 {
        self.slot.lock().size
    }
}
