//! LFU Disk Strategy Module
//!
//! Least Frequently Used eviction with the frequency order kept on disk in an
//! `OrderedRecordStore`. Rows stay sorted by non-increasing hit count, so the
//! eviction victim is always the last row.

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{Bounds, CacheKey, EvictionStrategy, OrderedRecordStore, Storage};
use crate::error::Result;

// == LFU Disk Strategy ==
/// Frequency-ordered eviction backed by a record file.
///
/// The strategy lock makes each search-then-move sequence atomic; the record
/// store keeps its own lock around raw file positioning.
#[derive(Debug)]
pub struct LfuDiskStrategy {
    bounds: Bounds,
    record: Mutex<OrderedRecordStore>,
}

impl LfuDiskStrategy {
    // == Constructor ==
    /// Opens the record file at `path` with key slots of `key_width` bytes.
    pub fn open(path: impl Into<PathBuf>, bounds: Bounds, key_width: usize) -> Result<Self> {
        Ok(Self::with_record(OrderedRecordStore::open(path, key_width)?, bounds))
    }

    pub fn with_record(record: OrderedRecordStore, bounds: Bounds) -> Self {
        Self {
            bounds,
            record: Mutex::new(record),
        }
    }

    /// Hit count recorded for `key`.
    pub fn frequency(&self, key: &CacheKey) -> Result<Option<u32>> {
        self.record.lock().get(key.as_bytes())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> Result<u32> {
        self.record.lock().length()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Tracked keys from most to least frequently used.
    pub fn ranking(&self) -> Result<Vec<(CacheKey, u32)>> {
        let record = self.record.lock();
        (0..record.length()?)
            .map(|i| {
                let (key, counter) = record.get_at(i)?;
                Ok((CacheKey::from_bytes(key), counter))
            })
            .collect()
    }

    // == Place New ==
    /// Inserts a zero-count row just ahead of the existing zero-count block.
    fn place_new(record: &OrderedRecordStore, key: &CacheKey) -> Result<u32> {
        let mut index = record.length()?;
        while index > 0 && record.get_at(index - 1)?.1 == 0 {
            index -= 1;
        }
        record.insert(index, key.as_bytes(), 0)?;
        Ok(index)
    }
}

impl EvictionStrategy for LfuDiskStrategy {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn handle_set(&self, key: &CacheKey, _value: &[u8]) -> Result<()> {
        let record = self.record.lock();
        if !record.has(key.as_bytes())? {
            Self::place_new(&record, key)?;
        }
        Ok(())
    }

    fn handle_hit(&self, key: &CacheKey, _value: &[u8]) -> Result<()> {
        let record = self.record.lock();
        let (mut index, counter) = match record.search(key.as_bytes())? {
            Some(found) => found,
            None => (Self::place_new(&record, key)?, 0),
        };

        let counter = counter.saturating_add(1);
        record.set_at(index, key.as_bytes(), counter)?;

        // Bubble toward the front past every row with an equal or lower count
        while index > 0 && record.get_at(index - 1)?.1 <= counter {
            record.swap(index - 1, index)?;
            index -= 1;
        }
        Ok(())
    }

    fn remove_keys(&self, storage: &dyn Storage) -> Result<usize> {
        // Held for the whole sweep so concurrent sweeps cannot both pop for one excess entry
        let record = self.record.lock();
        let mut evicted = 0;
        while self.is_excess(storage) {
            if record.is_empty()? {
                break;
            }
            let (key, counter) = record.pop_at(None)?;
            let key = CacheKey::from_bytes(key);
            storage.delete(&key)?;
            debug!(key = %key, hits = counter, "Evicted cache entry (lfu)");
            evicted += 1;
        }
        Ok(evicted)
    }

    fn reset(&self, key: &CacheKey) -> Result<()> {
        self.record.lock().pop(key.as_bytes())?;
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{md5_key, MemoryStorage};
    use tempfile::tempdir;

    fn k(name: &str) -> CacheKey {
        md5_key(name.as_bytes())
    }

    fn strategy(dir: &std::path::Path, bounds: Bounds) -> LfuDiskStrategy {
        LfuDiskStrategy::open(dir.join("lfu.record"), bounds, 16).unwrap()
    }

    fn order(lfu: &LfuDiskStrategy) -> Vec<(CacheKey, u32)> {
        lfu.ranking().unwrap()
    }

    #[test]
    fn test_lfu_handle_set_registers_once() {
        let dir = tempdir().unwrap();
        let lfu = strategy(dir.path(), Bounds::unbounded());

        lfu.handle_set(&k("a"), b"").unwrap();
        lfu.handle_set(&k("a"), b"").unwrap();

        assert_eq!(lfu.len().unwrap(), 1);
        assert_eq!(lfu.frequency(&k("a")).unwrap(), Some(0));
    }

    #[test]
    fn test_lfu_new_keys_land_ahead_of_zero_block() {
        let dir = tempdir().unwrap();
        let lfu = strategy(dir.path(), Bounds::unbounded());

        lfu.handle_set(&k("a"), b"").unwrap();
        lfu.handle_hit(&k("a"), b"").unwrap();
        lfu.handle_set(&k("b"), b"").unwrap();
        lfu.handle_set(&k("c"), b"").unwrap();

        assert_eq!(
            order(&lfu),
            vec![(k("a"), 1), (k("c"), 0), (k("b"), 0)]
        );
    }

    #[test]
    fn test_lfu_hit_bubbles_forward() {
        let dir = tempdir().unwrap();
        let lfu = strategy(dir.path(), Bounds::unbounded());

        for name in ["a", "b", "c"] {
            lfu.handle_set(&k(name), b"").unwrap();
        }
        lfu.handle_hit(&k("a"), b"").unwrap();
        lfu.handle_hit(&k("a"), b"").unwrap();
        lfu.handle_hit(&k("b"), b"").unwrap();

        assert_eq!(
            order(&lfu),
            vec![(k("a"), 2), (k("b"), 1), (k("c"), 0)]
        );

        // An equal count overtakes the row ahead of it
        lfu.handle_hit(&k("b"), b"").unwrap();
        assert_eq!(
            order(&lfu),
            vec![(k("b"), 2), (k("a"), 2), (k("c"), 0)]
        );
    }

    #[test]
    fn test_lfu_evicts_least_frequent() {
        let dir = tempdir().unwrap();
        let storage = MemoryStorage::new();
        let lfu = strategy(dir.path(), Bounds::max_count(1));

        for name in ["k1", "k2"] {
            storage.set(&k(name), b"v").unwrap();
            lfu.handle_set(&k(name), b"v").unwrap();
        }
        for _ in 0..3 {
            lfu.handle_hit(&k("k1"), b"v").unwrap();
        }
        lfu.handle_hit(&k("k2"), b"v").unwrap();

        assert_eq!(lfu.remove_keys(&storage).unwrap(), 1);

        assert!(storage.has(&k("k1")));
        assert!(!storage.has(&k("k2")));
        assert_eq!(order(&lfu), vec![(k("k1"), 3)]);
    }

    #[test]
    fn test_lfu_stops_when_record_empty() {
        let dir = tempdir().unwrap();
        let storage = MemoryStorage::new();
        storage.set(&k("untracked"), b"0123456789").unwrap();
        let lfu = strategy(dir.path(), Bounds::max_size(1));

        assert_eq!(lfu.remove_keys(&storage).unwrap(), 0);
        assert_eq!(storage.count(), 1);
    }

    #[test]
    fn test_lfu_hit_on_untracked_key() {
        let dir = tempdir().unwrap();
        let lfu = strategy(dir.path(), Bounds::unbounded());
        lfu.handle_set(&k("a"), b"").unwrap();

        lfu.handle_hit(&k("ghost"), b"").unwrap();

        assert_eq!(lfu.frequency(&k("ghost")).unwrap(), Some(1));
        assert_eq!(order(&lfu)[0], (k("ghost"), 1));
    }

    #[test]
    fn test_lfu_reset_removes_row() {
        let dir = tempdir().unwrap();
        let lfu = strategy(dir.path(), Bounds::unbounded());
        lfu.handle_set(&k("a"), b"").unwrap();
        lfu.handle_set(&k("b"), b"").unwrap();

        lfu.reset(&k("a")).unwrap();
        lfu.reset(&k("missing")).unwrap();

        assert_eq!(order(&lfu), vec![(k("b"), 0)]);
    }

    #[test]
    fn test_lfu_concurrent_sweeps_evict_only_the_excess() {
        let dir = tempdir().unwrap();
        let storage = MemoryStorage::new();
        let lfu = strategy(dir.path(), Bounds::max_count(10));
        for i in 0..11 {
            let key = k(&format!("key{}", i));
            storage.set(&key, b"v").unwrap();
            lfu.handle_set(&key, b"v").unwrap();
        }

        let evicted: usize = std::thread::scope(|scope| {
            let sweeps: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| lfu.remove_keys(&storage).unwrap()))
                .collect();
            sweeps.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(evicted, 1);
        assert_eq!(storage.count(), 10);
        assert_eq!(lfu.len().unwrap(), 10);
    }

    #[test]
    fn test_lfu_frequencies_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let lfu = strategy(dir.path(), Bounds::unbounded());
            lfu.handle_set(&k("a"), b"").unwrap();
            lfu.handle_hit(&k("a"), b"").unwrap();
            lfu.handle_hit(&k("a"), b"").unwrap();
        }

        let lfu = strategy(dir.path(), Bounds::unbounded());
        assert_eq!(lfu.frequency(&k("a")).unwrap(), Some(2));
    }
}
