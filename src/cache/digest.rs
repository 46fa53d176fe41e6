//! Cache Key Module
//!
//! Hashes caller-supplied keys into the fixed-length digests every storage
//! backend and strategy is keyed on.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// == Cache Key ==
/// Digest of a caller key. Callers never see it; storage and strategies only ever see this.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Box<[u8]>);

impl CacheKey {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for CacheKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// == Pluggable Functions ==
/// Maps a caller key to its digest.
pub type HashFn = Arc<dyn Fn(&[u8]) -> CacheKey + Send + Sync>;

/// Maps a digest to a path relative to a disk storage root.
pub type PathFn = Arc<dyn Fn(&CacheKey) -> PathBuf + Send + Sync>;

/// Default hash: 16-byte MD5 digest.
pub fn md5_key(key: &[u8]) -> CacheKey {
    CacheKey::from_bytes(md5::compute(key).0.to_vec())
}

pub fn default_hash_fn() -> HashFn {
    Arc::new(md5_key)
}

/// Default path mapping: one flat file named by the hex digest.
pub fn hex_path(key: &CacheKey) -> PathBuf {
    PathBuf::from(key.to_hex())
}

pub fn default_path_fn() -> PathFn {
    Arc::new(hex_path)
}
