//! Configuration Module
//!
//! Handles loading cache configuration from environment variables or any
//! serde source, and wiring the configured storage and strategy into a `Cache`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::{
    Bounds, Cache, DiskStorage, EvictionStrategy, FifoStrategy, LfuDiskStrategy, LruStrategy,
    MemoryStorage, NoEviction, Storage, DEFAULT_KEY_WIDTH,
};
use crate::error::{CacheError, Result};

/// Suffix appended to the storage root to name the default LFU record file
pub const RECORD_SUFFIX: &str = ".lfu.record";

// == Storage Kind ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    #[default]
    Memory,
    Disk,
}

impl FromStr for StorageKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "disk" => Ok(Self::Disk),
            other => Err(CacheError::InvalidConfig(format!("unknown storage: {}", other))),
        }
    }
}

// == Strategy Kind ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    None,
    Fifo,
    Lru,
    LfuDisk,
}

impl FromStr for StrategyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "fifo" => Ok(Self::Fifo),
            "lru" => Ok(Self::Lru),
            "lfu-disk" | "lfu" => Ok(Self::LfuDisk),
            other => Err(CacheError::InvalidConfig(format!("unknown strategy: {}", other))),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum total size in bytes, unbounded if unset
    pub max_size: Option<u64>,
    /// Maximum number of entries, unbounded if unset
    pub max_count: Option<u64>,
    /// Storage backend
    pub storage: StorageKind,
    /// Root directory for disk storage
    pub root: PathBuf,
    /// Eviction strategy
    pub strategy: StrategyKind,
    /// Record file for the LFU strategy, defaults to `<root>.lfu.record`
    pub record_path: Option<PathBuf>,
    /// Key slot width of the LFU record file
    pub key_width: usize,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Maximum total size in bytes (default: unbounded)
    /// - `CACHE_MAX_COUNT` - Maximum entries (default: unbounded)
    /// - `CACHE_STORAGE` - `memory` or `disk` (default: memory)
    /// - `CACHE_ROOT` - Disk storage root (default: ./cache)
    /// - `CACHE_STRATEGY` - `none`, `fifo`, `lru` or `lfu-disk` (default: none)
    /// - `CACHE_RECORD_PATH` - LFU record file (default: <root>.lfu.record)
    /// - `CACHE_KEY_WIDTH` - LFU key slot width (default: 16)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: parse_var("CACHE_MAX_SIZE"),
            max_count: parse_var("CACHE_MAX_COUNT"),
            storage: parse_var("CACHE_STORAGE").unwrap_or(defaults.storage),
            root: env::var("CACHE_ROOT").map(PathBuf::from).unwrap_or(defaults.root),
            strategy: parse_var("CACHE_STRATEGY").unwrap_or(defaults.strategy),
            record_path: env::var("CACHE_RECORD_PATH").ok().map(PathBuf::from),
            key_width: parse_var("CACHE_KEY_WIDTH").unwrap_or(defaults.key_width),
        }
    }

    // == Bounds ==
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.max_size, self.max_count)
    }

    /// Record file the LFU strategy uses.
    ///
    /// The default sits next to the storage root rather than inside it, so
    /// clearing the storage leaves the record alone.
    pub fn record_path(&self) -> PathBuf {
        self.record_path.clone().unwrap_or_else(|| {
            let mut name = self.root.components().as_path().as_os_str().to_owned();
            name.push(RECORD_SUFFIX);
            PathBuf::from(name)
        })
    }

    // == Build ==
    /// Opens the configured storage and strategy and wires them into a cache.
    pub fn build(&self) -> Result<Cache> {
        // MD5 digests must fit the record key slot or nothing would be tracked
        if self.strategy == StrategyKind::LfuDisk && self.key_width < DEFAULT_KEY_WIDTH {
            return Err(CacheError::InvalidConfig(format!(
                "key width {} cannot hold a {}-byte digest",
                self.key_width, DEFAULT_KEY_WIDTH
            )));
        }

        let storage: Box<dyn Storage> = match self.storage {
            StorageKind::Memory => Box::new(MemoryStorage::new()),
            StorageKind::Disk => Box::new(DiskStorage::new(&self.root)?),
        };

        let bounds = self.bounds();
        let strategy: Box<dyn EvictionStrategy> = match self.strategy {
            StrategyKind::None => Box::new(NoEviction),
            StrategyKind::Fifo => Box::new(FifoStrategy::new(bounds)),
            StrategyKind::Lru => Box::new(LruStrategy::new(bounds)),
            StrategyKind::LfuDisk => Box::new(LfuDiskStrategy::open(
                self.record_path(),
                bounds,
                self.key_width,
            )?),
        };

        Ok(Cache::from_parts(storage, strategy, crate::cache::default_hash_fn()))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: None,
            max_count: None,
            storage: StorageKind::Memory,
            root: PathBuf::from("cache"),
            strategy: StrategyKind::None,
            record_path: None,
            key_width: DEFAULT_KEY_WIDTH,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
