//! Tiercache - A pluggable byte cache engine
//!
//! Hashes caller keys into digests, stores values in memory or on disk, and
//! keeps each store within its bounds using FIFO, LRU or disk-resident LFU
//! eviction. Caches can be chained into tiers with read promotion.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    Bounds, Cache, DiskStorage, EvictionStrategy, FifoStrategy, HitRateCounter, LfuDiskStrategy,
    LruStrategy, MemoryStorage, NoEviction, OrderedRecordStore, Storage, TieredCache, Value,
};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
