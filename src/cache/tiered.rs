//! Tiered Cache Module
//!
//! Chains several caches as levels, fastest first. A hit in a slower level is
//! promoted one level up.

use crate::cache::{Cache, HitRateCounter, Value};

// == Tiered Cache ==
/// Ordered list of cache levels with read promotion.
pub struct TieredCache {
    tiers: Vec<Cache>,
    rate: HitRateCounter,
}

impl TieredCache {
    // == Constructor ==
    /// Creates a tiered cache from levels ordered fastest/smallest first.
    pub fn new(tiers: Vec<Cache>) -> Self {
        Self {
            tiers,
            rate: HitRateCounter::new(),
        }
    }

    pub fn tiers(&self) -> &[Cache] {
        &self.tiers
    }

    // == Get ==
    /// Probes the levels in order.
    ///
    /// On a hit at level `i > 0` the value is written into level `i - 1` only;
    /// faster levels beyond that are not backfilled.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Value> {
        let key = key.as_ref();

        for (i, tier) in self.tiers.iter().enumerate() {
            if let Some(value) = tier.get(key) {
                self.rate.hit();
                if let Some(faster) = i.checked_sub(1).and_then(|j| self.tiers.get(j)) {
                    faster.set(key, &value);
                }
                return Some(value);
            }
        }

        self.rate.missing();
        None
    }

    // == Get Or ==
    pub fn get_or(&self, key: impl AsRef<[u8]>, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    // == Set ==
    /// Writes through to every level.
    ///
    /// Returns true only if every level stored the value.
    pub fn set(&self, key: impl AsRef<[u8]>, value: &[u8]) -> bool {
        let key = key.as_ref();
        self.tiers
            .iter()
            .fold(true, |stored, tier| tier.set(key, value) && stored)
    }

    // == Accessors ==
    /// Total entries across all levels.
    pub fn count(&self) -> u64 {
        self.tiers.iter().map(Cache::count).sum()
    }

    /// Total size across all levels.
    pub fn size(&self) -> u64 {
        self.tiers.iter().map(Cache::size).sum()
    }

    /// Hit/miss statistics over the whole chain.
    pub fn state(&self) -> &HitRateCounter {
        &self.rate
    }
}
