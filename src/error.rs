//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for storage backends, strategies and the record store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying file operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Positional record access outside the current row range
    #[error("Index {index} out of range (length: {len})")]
    IndexOutOfRange { index: u64, len: u64 },

    /// Key does not fit in the record key slot
    #[error("Key of {len} bytes exceeds slot width of {width} bytes")]
    KeyTooLong { len: usize, width: usize },

    /// Configuration value could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
