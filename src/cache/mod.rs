//! Cache Module
//!
//! Provides byte caching over pluggable storage backends (memory, disk) with
//! pluggable eviction strategies (FIFO, LRU, disk-resident LFU).

mod digest;
mod disk;
mod entry;
mod fifo;
mod lfu;
mod lru;
mod memory;
mod record;
mod stats;
mod storage;
mod store;
mod strategy;
mod tiered;


// Re-export public types
pub use digest::{default_hash_fn, default_path_fn, hex_path, md5_key, CacheKey, HashFn, PathFn};
pub use disk::{tmp_path, AggregateInfo, DiskStorage, LockRegistry, PathLock, INFO_FILE};
pub use entry::{CacheEntry, EntrySlot};
pub use fifo::FifoStrategy;
pub use lfu::LfuDiskStrategy;
pub use lru::{LruStrategy, LruTracker};
pub use memory::MemoryStorage;
pub use record::{OrderedRecordStore, HEADER_LEN, MAX_KEY_WIDTH};
pub use stats::{HitRateCounter, HitRateSnapshot};
pub use storage::{byte_len, SizeFn, Storage, Value};
pub use store::Cache;
pub use strategy::{Bounds, EvictionStrategy, NoEviction};
pub use tiered::TieredCache;

// == Public Constants ==
/// Length of the default MD5 digest, and the default record key slot width
pub const DEFAULT_KEY_WIDTH: usize = 16;
