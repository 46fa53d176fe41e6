//! Disk Storage Module
//!
//! One file per digest under a storage root, plus a sidecar file holding the
//! aggregate size and count. Writes go to a temporary sibling that is renamed
//! over the target, so a crash never leaves a partially written entry.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::cache::digest::default_path_fn;
use crate::cache::{CacheKey, PathFn, Storage, Value};
use crate::error::Result;

// == Public Constants ==
/// Name of the aggregate counter sidecar inside the storage root
pub const INFO_FILE: &str = "cache.info";

/// Suffix of the temporary file a write lands in before the rename
pub const TMP_SUFFIX: &str = ".tmp";

const SLOT_LEN: u64 = 8;
const SIZE_SLOT: u64 = 0;
const COUNT_SLOT: u64 = 1;

// == Aggregate Info ==
/// Persistent total size and count.
///
/// Stored as two little-endian u64 slots (offset 0 = size, offset 8 = count).
/// Each slot is written on its own as soon as it changes, so after a crash
/// the two may disagree; the counters are advisory accounting only.
#[derive(Debug)]
pub struct AggregateInfo {
    inner: Mutex<InfoFile>,
}

#[derive(Debug)]
struct InfoFile {
    file: File,
    size: u64,
    count: u64,
}

impl InfoFile {
    fn write_slot(&mut self, slot: u64, n: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(slot * SLOT_LEN))?;
        self.file.write_all(&n.to_le_bytes())
    }

    /// Updates the in-memory counters, then persists the slots that changed.
    fn store(&mut self, size: u64, count: u64) -> io::Result<()> {
        let (old_size, old_count) = (self.size, self.count);
        self.size = size;
        self.count = count;
        if size != old_size {
            self.write_slot(SIZE_SLOT, size)?;
        }
        if count != old_count {
            self.write_slot(COUNT_SLOT, count)?;
        }
        Ok(())
    }
}

impl AggregateInfo {
    // == Open ==
    /// Opens or creates the sidecar at `path`.
    ///
    /// A sidecar that is not exactly two slots long is treated as absent and
    /// rewritten with zeroed counters.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        let parsed = parse_info(&raw);
        let (size, count) = parsed.unwrap_or((0, 0));
        let mut info = InfoFile { file, size, count };

        if parsed.is_none() {
            if !raw.is_empty() {
                warn!(path = %path.display(), len = raw.len(), "Malformed cache info file, resetting counters");
            }
            info.file.set_len(0)?;
            info.write_slot(SIZE_SLOT, 0)?;
            info.write_slot(COUNT_SLOT, 0)?;
        }

        Ok(Self {
            inner: Mutex::new(info),
        })
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    // == Record Insert ==
    /// Accounts for a newly created entry of `size` bytes.
    pub fn record_insert(&self, size: u64) -> Result<()> {
        let mut info = self.inner.lock();
        let (new_size, new_count) = (info.size.saturating_add(size), info.count.saturating_add(1));
        info.store(new_size, new_count)?;
        Ok(())
    }

    // == Record Replace ==
    /// Accounts for an entry rewritten from `old` to `new` bytes.
    pub fn record_replace(&self, old: u64, new: u64) -> Result<()> {
        let mut info = self.inner.lock();
        let (new_size, count) = (info.size.saturating_add(new).saturating_sub(old), info.count);
        info.store(new_size, count)?;
        Ok(())
    }

    // == Record Remove ==
    /// Accounts for a removed entry of `size` bytes.
    pub fn record_remove(&self, size: u64) -> Result<()> {
        let mut info = self.inner.lock();
        let (new_size, new_count) = (info.size.saturating_sub(size), info.count.saturating_sub(1));
        info.store(new_size, new_count)?;
        Ok(())
    }

    // == Reset ==
    pub fn reset(&self) -> Result<()> {
        let mut info = self.inner.lock();
        info.write_slot(SIZE_SLOT, 0)?;
        info.write_slot(COUNT_SLOT, 0)?;
        info.size = 0;
        info.count = 0;
        info.file.flush()?;
        Ok(())
    }
}

fn parse_info(raw: &[u8]) -> Option<(u64, u64)> {
    if raw.len() != (SLOT_LEN * 2) as usize {
        return None;
    }
    let (size, count) = raw.split_at(SLOT_LEN as usize);
    Some((
        u64::from_le_bytes(size.try_into().ok()?),
        u64::from_le_bytes(count.try_into().ok()?),
    ))
}

// == Lock Registry ==
/// Per-path locks, reclaimed as soon as no caller holds them.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<PathBuf, Weak<Mutex<()>>>,
}

/// A registered lock for one path. Dropping the last handle for a path
/// removes its registry entry.
pub struct PathLock<'a> {
    registry: &'a LockRegistry,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Acquire ==
    /// Returns the shared lock handle for `path`, creating it if needed.
    pub fn acquire(&self, path: &Path) -> PathLock<'_> {
        let lock = match self.locks.entry(path.to_path_buf()) {
            Entry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    occupied.insert(Arc::downgrade(&lock));
                    lock
                }
            },
            Entry::Vacant(vacant) => {
                let lock = Arc::new(Mutex::new(()));
                vacant.insert(Arc::downgrade(&lock));
                lock
            }
        };

        PathLock {
            registry: self,
            path: path.to_path_buf(),
            lock,
        }
    }

    /// Number of paths with a live lock handle.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl PathLock<'_> {
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        // The shard lock held by remove_if keeps acquire from upgrading concurrently
        let ours = Arc::as_ptr(&self.lock);
        self.registry.locks.remove_if(&self.path, |_, weak| {
            Weak::as_ptr(weak) == ours && weak.strong_count() == 1
        });
    }
}

// == Disk Storage ==
/// Storage keeping one file per digest under `root`.
pub struct DiskStorage {
    root: PathBuf,
    path_fn: PathFn,
    locks: LockRegistry,
    info: AggregateInfo,
}

impl DiskStorage {
    // == Constructor ==
    /// Opens a storage rooted at `root` with flat hex file names.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_path_fn(root, default_path_fn())
    }

    /// Opens a storage rooted at `root` using `path_fn` to place entries.
    ///
    /// Existing counters are loaded from the sidecar when present.
    pub fn with_path_fn(root: impl Into<PathBuf>, path_fn: PathFn) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let info = AggregateInfo::open(&root.join(INFO_FILE))?;
        debug!(root = %root.display(), size = info.size(), count = info.count(), "Opened disk storage");

        Ok(Self {
            root,
            path_fn,
            locks: LockRegistry::new(),
            info,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // == Full Path ==
    /// Returns the file path an entry for `key` is stored at.
    pub fn full_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join((self.path_fn)(key))
    }

    fn write_file(path: &Path, value: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(value)?;
        file.sync_all()
    }

    fn clear_dir(&self, dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.clear_dir(&path)?;
                fs::remove_dir(&path)?;
            } else if dir != self.root.as_path() || path.file_name() != Some(OsStr::new(INFO_FILE)) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Temporary sibling of `path` that a write lands in first.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

impl Storage for DiskStorage {
    fn set(&self, key: &CacheKey, value: &[u8]) -> Result<bool> {
        let path = self.full_path(key);
        let tmp = tmp_path(&path);

        let handle = self.locks.acquire(&path);
        let _guard = handle.lock();

        let previous = fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len());

        if let Err(err) = Self::write_file(&tmp, value).and_then(|_| fs::rename(&tmp, &path)) {
            warn!(path = %path.display(), error = %err, "Failed to write cache entry");
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        // The entry is live once renamed; a sidecar failure only costs accounting
        let size = value.len() as u64;
        let accounted = match previous {
            Some(old) => self.info.record_replace(old, size),
            None => self.info.record_insert(size),
        };
        if let Err(err) = accounted {
            warn!(path = %path.display(), error = %err, "Failed to update cache info");
        }
        Ok(previous.is_none())
    }

    fn get(&self, key: &CacheKey) -> Option<Value> {
        let path = self.full_path(key);
        if !path.is_file() {
            return None;
        }

        let handle = self.locks.acquire(&path);
        let _guard = handle.lock();

        match fs::read(&path) {
            Ok(bytes) => Some(Value::from(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read cache entry");
                None
            }
        }
    }

    fn has(&self, key: &CacheKey) -> bool {
        self.full_path(key).is_file()
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let path = self.full_path(key);
        if !path.is_file() {
            return Ok(false);
        }

        let handle = self.locks.acquire(&path);
        let _guard = handle.lock();

        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        fs::remove_file(&path)?;
        self.info.record_remove(size)?;
        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        self.clear_dir(&self.root)?;
        self.info.reset()?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.info.size()
    }

    fn count(&self) -> u64 {
        self.info.count()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::md5_key;
    use std::thread;
    use tempfile::tempdir;

    fn write_info(root: &Path, size: u64, count: u64) {
        let mut raw = size.to_le_bytes().to_vec();
        raw.extend_from_slice(&count.to_le_bytes());
        fs::write(root.join(INFO_FILE), raw).unwrap();
    }

    #[test]
    fn test_disk_set_and_get() {
        let dir = tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        let key = md5_key(b"key1");

        assert!(storage.set(&key, b"value1").unwrap());

        assert_eq!(storage.get(&key).as_deref(), Some(&b"value1"[..]));
        assert!(storage.has(&key));
        assert_eq!(storage.count(), 1);
        assert_eq!(storage.size(), 6);
        assert!(storage.full_path(&key).ends_with(key.to_hex()));
    }

    #[test]
    fn test_disk_get_missing() {
        let dir = tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();

        assert!(storage.get(&md5_key(b"nope")).is_none());
        assert!(!storage.has(&md5_key(b"nope")));
    }

    #[test]
    fn test_disk_overwrite_keeps_count() {
        let dir = tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        let key = md5_key(b"key1");

        assert!(storage.set(&key, b"abcd").unwrap());
        assert!(!storage.set(&key, b"ab").unwrap());

        assert_eq!(storage.get(&key).as_deref(), Some(&b"ab"[..]));
        assert_eq!(storage.count(), 1);
        assert_eq!(storage.size(), 2);
    }

    #[test]
    fn test_disk_delete() {
        let dir = tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        let k1 = md5_key(b"key1");
        let k2 = md5_key(b"key2");
        storage.set(&k1, b"aaaa").unwrap();
        storage.set(&k2, b"bb").unwrap();

        assert!(storage.delete(&k1).unwrap());
        assert!(!storage.delete(&k1).unwrap());

        assert!(!storage.full_path(&k1).exists());
        assert_eq!(storage.count(), 1);
        assert_eq!(storage.size(), 2);
    }

    #[test]
    fn test_disk_counters_persist_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = DiskStorage::new(dir.path()).unwrap();
            storage.set(&md5_key(b"a"), b"123").unwrap();
            storage.set(&md5_key(b"b"), b"4567").unwrap();
        }

        let storage = DiskStorage::new(dir.path()).unwrap();
        assert_eq!(storage.count(), 2);
        assert_eq!(storage.size(), 7);
        assert_eq!(storage.get(&md5_key(b"b")).as_deref(), Some(&b"4567"[..]));
    }

    #[test]
    fn test_disk_malformed_info_resets_counters() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(INFO_FILE), b"garbage").unwrap();

        let storage = DiskStorage::new(dir.path()).unwrap();
        assert_eq!(storage.count(), 0);
        assert_eq!(storage.size(), 0);

        storage.set(&md5_key(b"a"), b"xyz").unwrap();
        let raw = fs::read(dir.path().join(INFO_FILE)).unwrap();
        assert_eq!(raw.len(), 16);
        assert_eq!(parse_info(&raw), Some((3, 1)));
    }

    #[test]
    fn test_disk_partially_updated_info_recovers() {
        let dir = tempdir().unwrap();
        {
            let storage = DiskStorage::new(dir.path()).unwrap();
            storage.set(&md5_key(b"a"), b"12345").unwrap();
        }
        // Size slot written, count slot lost: size says two entries, count says one
        write_info(dir.path(), 8, 1);

        let storage = DiskStorage::new(dir.path()).unwrap();
        assert_eq!(storage.size(), 8);
        assert_eq!(storage.count(), 1);

        assert!(storage.delete(&md5_key(b"a")).unwrap());
        assert_eq!(storage.size(), 3);
        assert_eq!(storage.count(), 0);

        // Drift never underflows
        write_info(dir.path(), 0, 0);
        let storage = DiskStorage::new(dir.path()).unwrap();
        storage.set(&md5_key(b"b"), b"zz").unwrap();
        write_info(dir.path(), 0, 0);
        let storage = DiskStorage::new(dir.path()).unwrap();
        assert!(storage.delete(&md5_key(b"b")).unwrap());
        assert_eq!(storage.size(), 0);
        assert_eq!(storage.count(), 0);
    }

    #[test]
    fn test_disk_oversized_info_saturates() {
        let dir = tempdir().unwrap();
        write_info(dir.path(), u64::MAX - 2, u64::MAX);

        let storage = DiskStorage::new(dir.path()).unwrap();
        assert!(storage.set(&md5_key(b"a"), b"hello").unwrap());
        assert_eq!(storage.size(), u64::MAX);
        assert_eq!(storage.count(), u64::MAX);

        // Saturated accounting stays pinned instead of wrapping
        assert!(!storage.set(&md5_key(b"a"), b"hi").unwrap());
        assert_eq!(storage.size(), u64::MAX - 5);
        assert_eq!(
            parse_info(&fs::read(dir.path().join(INFO_FILE)).unwrap()),
            Some((u64::MAX - 5, u64::MAX))
        );
    }

    #[test]
    fn test_disk_info_write_failure_keeps_entry() {
        let dir = tempdir().unwrap();
        let mut storage = DiskStorage::new(dir.path()).unwrap();
        // Swap in a sidecar handle that refuses writes
        let read_only = File::open(dir.path().join(INFO_FILE)).unwrap();
        storage.info = AggregateInfo {
            inner: Mutex::new(InfoFile {
                file: read_only,
                size: 0,
                count: 0,
            }),
        };
        let key = md5_key(b"key1");

        assert!(storage.set(&key, b"value").unwrap());
        assert_eq!(storage.get(&key).as_deref(), Some(&b"value"[..]));
        assert_eq!(storage.count(), 1);
        assert_eq!(storage.size(), 5);

        assert!(!storage.set(&key, b"v").unwrap());
        assert_eq!(storage.size(), 1);
    }

    #[test]
    fn test_disk_crash_before_rename_keeps_old_file() {
        let dir = tempdir().unwrap();
        let key = md5_key(b"key1");
        {
            let storage = DiskStorage::new(dir.path()).unwrap();
            storage.set(&key, b"complete value").unwrap();
            // Simulate a crash after a partial temp write, before the rename
            fs::write(tmp_path(&storage.full_path(&key)), b"compl").unwrap();
        }

        let storage = DiskStorage::new(dir.path()).unwrap();
        assert_eq!(storage.get(&key).as_deref(), Some(&b"complete value"[..]));
        assert_eq!(storage.count(), 1);

        storage.set(&key, b"new").unwrap();
        assert_eq!(storage.get(&key).as_deref(), Some(&b"new"[..]));
        assert!(!tmp_path(&storage.full_path(&key)).exists());
    }

    #[test]
    fn test_disk_clear() {
        let dir = tempdir().unwrap();
        let nested: PathFn = Arc::new(|key: &CacheKey| {
            let hex = key.to_hex();
            PathBuf::from(&hex[..2]).join(&hex[2..])
        });
        let storage = DiskStorage::with_path_fn(dir.path(), nested).unwrap();
        storage.set(&md5_key(b"a"), b"1").unwrap();
        storage.set(&md5_key(b"b"), b"22").unwrap();

        storage.clear().unwrap();

        assert_eq!(storage.count(), 0);
        assert_eq!(storage.size(), 0);
        assert!(!storage.has(&md5_key(b"a")));
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1, "only the info sidecar survives clear");
    }

    #[test]
    fn test_disk_nested_path_fn() {
        let dir = tempdir().unwrap();
        let nested: PathFn = Arc::new(|key: &CacheKey| {
            let hex = key.to_hex();
            PathBuf::from(&hex[..2]).join(&hex[2..])
        });
        let storage = DiskStorage::with_path_fn(dir.path(), nested).unwrap();
        let key = md5_key(b"nested");

        storage.set(&key, b"deep").unwrap();

        let hex = key.to_hex();
        assert!(dir.path().join(&hex[..2]).join(&hex[2..]).is_file());
        assert_eq!(storage.get(&key).as_deref(), Some(&b"deep"[..]));
    }

    #[test]
    fn test_lock_registry_reclaims_locks() {
        let registry = LockRegistry::new();
        let path = Path::new("/tmp/entry");

        {
            let first = registry.acquire(path);
            let second = registry.acquire(path);
            assert!(Arc::ptr_eq(&first.lock, &second.lock));
            assert_eq!(registry.len(), 1);
            drop(first);
            assert_eq!(registry.len(), 1, "a remaining holder keeps the entry");
        }

        assert!(registry.is_empty());
    }

    #[test]
    fn test_disk_concurrent_writes_same_key() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(DiskStorage::new(dir.path()).unwrap());
        let key = md5_key(b"shared");

        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let storage = Arc::clone(&storage);
                let key = key.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        storage.set(&key, &vec![t; 16]).unwrap();
                        let value = storage.get(&key).unwrap();
                        assert_eq!(value.len(), 16);
                        assert!(value.iter().all(|&b| b == value[0]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.count(), 1);
        assert_eq!(storage.size(), 16);
        assert!(storage.locks.is_empty());
    }
}
