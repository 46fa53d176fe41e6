//! Cache Statistics Module
//!
//! Thread-safe hit/miss tally shared by `Cache` and `TieredCache`.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

// == Hit Rate Snapshot ==
/// A consistent copy of the hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HitRateSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals
    pub misses: u64,
}

impl HitRateSnapshot {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Returns hits / total, or None if no requests have been made.
    pub fn hit_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.hits as f64 / total as f64),
        }
    }

    /// Returns misses / total, or None if no requests have been made.
    pub fn missing_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.misses as f64 / total as f64),
        }
    }
}

// == Hit Rate Counter ==
/// Tracks cache hits and misses under a single lock.
#[derive(Debug, Default)]
pub struct HitRateCounter {
    counts: Mutex<HitRateSnapshot>,
}

impl HitRateCounter {
    // == Constructor ==
    /// Creates a new counter with both tallies at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn hit(&self) {
        self.counts.lock().hits += 1;
    }

    // == Record Miss ==
    pub fn missing(&self) {
        self.counts.lock().misses += 1;
    }

    // == Update ==
    /// Records a hit when `is_hit` is true, a miss otherwise.
    pub fn update(&self, is_hit: bool) {
        if is_hit {
            self.hit();
        } else {
            self.missing();
        }
    }

    // == Reset ==
    pub fn reset(&self) {
        *self.counts.lock() = HitRateSnapshot::default();
    }

    // == Snapshot ==
    /// Returns both counters read under one lock acquisition.
    pub fn snapshot(&self) -> HitRateSnapshot {
        *self.counts.lock()
    }

    pub fn hit_count(&self) -> u64 {
        self.counts.lock().hits
    }

    pub fn missing_count(&self) -> u64 {
        self.counts.lock().misses
    }

    pub fn total(&self) -> u64 {
        self.snapshot().total()
    }

    /// Returns hits / total, or None if no requests have been made.
    pub fn hit_rate(&self) -> Option<f64> {
        self.snapshot().hit_rate()
    }

    /// Returns misses / total, or None if no requests have been made.
    pub fn missing_rate(&self) -> Option<f64> {
        self.snapshot().missing_rate()
    }
}

impl fmt::Display for HitRateCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        write!(
            f,
            "[HitCount: {}, HitRate: {:.2}, Total: {}]",
            snapshot.hits,
            snapshot.hit_rate().unwrap_or(0.0),
            snapshot.total()
        )
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_stats_new() {
        let stats = HitRateCounter::new();
        assert_eq!(stats.hit_count(), 0);
        assert_eq!(stats.missing_count(), 0);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = HitRateCounter::new();
        assert_eq!(stats.hit_rate(), None);
        assert_eq!(stats.missing_rate(), None);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let stats = HitRateCounter::new();
        stats.hit();
        stats.hit();
        stats.hit();
        assert_eq!(stats.hit_rate(), Some(1.0));
        assert_eq!(stats.missing_rate(), Some(0.0));
    }

    #[test]
    fn test_hit_rate_mixed() {
        let stats = HitRateCounter::new();
        stats.update(true);
        stats.update(false);
        stats.update(false);
        stats.update(false);
        assert_eq!(stats.hit_rate(), Some(0.25));
        assert_eq!(stats.missing_rate(), Some(0.75));
    }

    #[test]
    fn test_reset() {
        let stats = HitRateCounter::new();
        for i in 0..57 {
            stats.update(i % 3 == 0);
        }
        stats.reset();
        assert_eq!(stats.hit_count(), 0);
        assert_eq!(stats.missing_count(), 0);
    }

    #[test]
    fn test_multi_threaded_totals() {
        let stats = Arc::new(HitRateCounter::new());
        let hit_nums: Vec<u64> = (0..10).map(|i| i * 7 + 3).collect();
        let miss_nums: Vec<u64> = (0..10).map(|i| i * 5 + 1).collect();

        let mut handles = Vec::new();
        for (&hits, &misses) in hit_nums.iter().zip(&miss_nums) {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..hits {
                    s.update(true);
                }
            }));
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..misses {
                    s.update(false);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let total_hits: u64 = hit_nums.iter().sum();
        let total_misses: u64 = miss_nums.iter().sum();
        assert_eq!(stats.total(), total_hits + total_misses);
        assert_eq!(stats.hit_count(), total_hits);
        assert_eq!(stats.missing_count(), total_misses);
        assert_eq!(
            stats.hit_rate(),
            Some(total_hits as f64 / (total_hits + total_misses) as f64)
        );
    }

    #[test]
    fn test_display() {
        let stats = HitRateCounter::new();
        stats.hit();
        stats.missing();
        assert_eq!(stats.to_string(), "[HitCount: 1, HitRate: 0.50, Total: 2]");
    }
}
