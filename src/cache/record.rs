//! Ordered Record Store Module
//!
//! A flat file of fixed-width `(key, counter)` rows with positional insert,
//! swap and delete. Used by the disk-resident LFU strategy to keep digests
//! ordered by access frequency.
//!
//! # File Layout
//! ```text
//! offset 0   : reserved byte (0)
//! offset 1   : row count, u32 little-endian
//! offset 5.. : rows
//!
//! row        : [key length: u8][key bytes, zero padded to key_width][counter: u32 LE]
//! ```
//!
//! Every operation is O(n) in the worst case; the store is meant for caches
//! bounded to a modest number of entries.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{CacheError, Result};

// == Layout Constants ==
/// Offset of the first row
pub const HEADER_LEN: u64 = 5;
/// Largest key slot width the one-byte length prefix can describe
pub const MAX_KEY_WIDTH: usize = u8::MAX as usize;

const COUNT_OFFSET: u64 = 1;
const COUNTER_LEN: usize = 4;

// == Record File ==
/// Raw positional access. Callers hold the store lock.
#[derive(Debug)]
struct RecordFile {
    file: File,
    key_width: usize,
}

impl RecordFile {
    fn row_len(&self) -> usize {
        1 + self.key_width + COUNTER_LEN
    }

    fn offset(&self, index: u32) -> u64 {
        HEADER_LEN + index as u64 * self.row_len() as u64
    }

    fn encode(&self, key: &[u8], counter: u32) -> Result<Vec<u8>> {
        let mut row = self.encode_slot(key)?;
        row.extend_from_slice(&counter.to_le_bytes());
        Ok(row)
    }

    /// Length-prefixed, zero-padded key slot.
    fn encode_slot(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.len() > self.key_width {
            return Err(CacheError::KeyTooLong {
                len: key.len(),
                width: self.key_width,
            });
        }
        let mut slot = Vec::with_capacity(self.row_len());
        slot.push(key.len() as u8);
        slot.extend_from_slice(key);
        slot.resize(1 + self.key_width, 0);
        Ok(slot)
    }

    fn decode(&self, row: &[u8]) -> (Vec<u8>, u32) {
        let len = (row[0] as usize).min(self.key_width);
        let key = row[1..1 + len].to_vec();
        let mut counter = [0u8; COUNTER_LEN];
        counter.copy_from_slice(&row[1 + self.key_width..]);
        (key, u32::from_le_bytes(counter))
    }

    fn read_len(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.file.read_exact(&mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn write_len(&mut self, len: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.file.write_all(&len.to_le_bytes())?;
        Ok(())
    }

    fn read_row_into(&mut self, index: u32, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.offset(index)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn read_row(&mut self, index: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.row_len()];
        self.read_row_into(index, &mut buf)?;
        Ok(buf)
    }

    fn write_row(&mut self, index: u32, row: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.offset(index)))?;
        self.file.write_all(row)?;
        Ok(())
    }

    fn check_index(index: u32, len: u32) -> Result<()> {
        if index >= len {
            return Err(CacheError::IndexOutOfRange {
                index: index as u64,
                len: len as u64,
            });
        }
        Ok(())
    }

    /// Linear scan for the row whose key slot matches.
    fn find(&mut self, key: &[u8]) -> Result<Option<(u32, u32)>> {
        let slot = self.encode_slot(key)?;
        let len = self.read_len()?;
        let mut buf = vec![0u8; self.row_len()];

        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        for index in 0..len {
            self.file.read_exact(&mut buf)?;
            if buf[..slot.len()] == slot[..] {
                return Ok(Some((index, self.decode(&buf).1)));
            }
        }
        Ok(None)
    }

    fn get_at(&mut self, index: u32) -> Result<(Vec<u8>, u32)> {
        let len = self.read_len()?;
        Self::check_index(index, len)?;
        let row = self.read_row(index)?;
        Ok(self.decode(&row))
    }

    fn set_at(&mut self, index: u32, key: &[u8], counter: u32) -> Result<()> {
        let row = self.encode(key, counter)?;
        let len = self.read_len()?;
        Self::check_index(index, len)?;
        self.write_row(index, &row)
    }

    /// Shifts rows `index..len` one position later, carrying each displaced
    /// row forward instead of buffering the tail.
    fn insert(&mut self, index: u32, key: &[u8], counter: u32) -> Result<()> {
        let mut carry = self.encode(key, counter)?;
        let len = self.read_len()?;
        if index > len {
            return Err(CacheError::IndexOutOfRange {
                index: index as u64,
                len: len as u64,
            });
        }

        let mut displaced = vec![0u8; self.row_len()];
        for pos in index..len {
            self.read_row_into(pos, &mut displaced)?;
            self.write_row(pos, &carry)?;
            std::mem::swap(&mut carry, &mut displaced);
        }
        self.write_row(len, &carry)?;
        self.write_len(len + 1)
    }

    fn swap(&mut self, i: u32, j: u32) -> Result<()> {
        let len = self.read_len()?;
        Self::check_index(i, len)?;
        Self::check_index(j, len)?;
        if i == j {
            return Ok(());
        }

        let first = self.read_row(i)?;
        let second = self.read_row(j)?;
        self.write_row(i, &second)?;
        self.write_row(j, &first)
    }

    /// Shifts rows after `index` one position earlier and shrinks the file.
    fn pop_at(&mut self, index: Option<u32>) -> Result<(Vec<u8>, u32)> {
        let len = self.read_len()?;
        let index = match index {
            Some(index) => index,
            None if len > 0 => len - 1,
            None => return Err(CacheError::IndexOutOfRange { index: 0, len: 0 }),
        };
        Self::check_index(index, len)?;

        let removed = self.read_row(index)?;
        let mut next = vec![0u8; self.row_len()];
        for pos in index + 1..len {
            self.read_row_into(pos, &mut next)?;
            self.write_row(pos - 1, &next)?;
        }
        self.write_len(len - 1)?;
        self.file.set_len(self.offset(len - 1))?;
        Ok(self.decode(&removed))
    }

    fn reinitialize(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&[0u8; HEADER_LEN as usize])?;
        Ok(())
    }
}

// == Ordered Record Store ==
/// Persistent sequence of `(key, counter)` rows.
///
/// A single lock serializes all reads and writes; compound operations
/// (`set`, `pop`) run under one acquisition.
#[derive(Debug)]
pub struct OrderedRecordStore {
    path: PathBuf,
    inner: Mutex<RecordFile>,
}

impl OrderedRecordStore {
    // == Open ==
    /// Opens or creates a store at `path` with key slots of `key_width` bytes.
    ///
    /// A file with a truncated header, or whose row count points past the end
    /// of the file, is reinitialized as an empty store.
    pub fn open(path: impl Into<PathBuf>, key_width: usize) -> Result<Self> {
        if key_width == 0 || key_width > MAX_KEY_WIDTH {
            return Err(CacheError::InvalidConfig(format!(
                "key width must be between 1 and {}, got {}",
                MAX_KEY_WIDTH, key_width
            )));
        }

        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let mut record = RecordFile { file, key_width };
        let intact = file_len >= HEADER_LEN && {
            let len = record.read_len()?;
            record.offset(len) <= file_len
        };
        if !intact {
            if file_len > 0 {
                warn!(path = %path.display(), file_len, "Malformed record file, starting empty");
            }
            record.reinitialize()?;
        }

        Ok(Self {
            path,
            inner: Mutex::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_width(&self) -> usize {
        self.inner.lock().key_width
    }

    // == Length ==
    /// Number of rows.
    pub fn length(&self) -> Result<u32> {
        self.inner.lock().read_len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.length()? == 0)
    }

    // == Search ==
    /// Returns `(index, counter)` of the row for `key`.
    pub fn search(&self, key: &[u8]) -> Result<Option<(u32, u32)>> {
        self.inner.lock().find(key)
    }

    // == Has ==
    pub fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.search(key)?.is_some())
    }

    // == Get ==
    /// Returns the counter stored for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<u32>> {
        Ok(self.search(key)?.map(|(_, counter)| counter))
    }

    // == Get At ==
    /// Reads the row at `index`.
    pub fn get_at(&self, index: u32) -> Result<(Vec<u8>, u32)> {
        self.inner.lock().get_at(index)
    }

    // == Set At ==
    /// Overwrites the row at `index`.
    pub fn set_at(&self, index: u32, key: &[u8], counter: u32) -> Result<()> {
        self.inner.lock().set_at(index, key, counter)
    }

    // == Set ==
    /// Updates the counter of `key` in place, or appends a new row.
    ///
    /// # Returns
    /// The index of the row.
    pub fn set(&self, key: &[u8], counter: u32) -> Result<u32> {
        let mut record = self.inner.lock();
        match record.find(key)? {
            Some((index, _)) => {
                record.set_at(index, key, counter)?;
                Ok(index)
            }
            None => {
                let index = record.read_len()?;
                record.insert(index, key, counter)?;
                Ok(index)
            }
        }
    }

    // == Insert ==
    /// Inserts a row at `index` (`0..=length`), shifting later rows back.
    pub fn insert(&self, index: u32, key: &[u8], counter: u32) -> Result<()> {
        self.inner.lock().insert(index, key, counter)
    }

    // == Swap ==
    pub fn swap(&self, i: u32, j: u32) -> Result<()> {
        self.inner.lock().swap(i, j)
    }

    // == Pop At ==
    /// Removes and returns the row at `index`, or the last row when `None`.
    pub fn pop_at(&self, index: Option<u32>) -> Result<(Vec<u8>, u32)> {
        self.inner.lock().pop_at(index)
    }

    // == Pop ==
    /// Removes the row for `key`, returning its counter.
    pub fn pop(&self, key: &[u8]) -> Result<Option<u32>> {
        let mut record = self.inner.lock();
        match record.find(key)? {
            Some((index, _)) => Ok(Some(record.pop_at(Some(index))?.1)),
            None => Ok(None),
        }
    }

    // == Flush ==
    /// Syncs the file to disk.
    pub fn flush(&self) -> Result<()> {
        let mut record = self.inner.lock();
        record.file.flush()?;
        record.file.sync_all()?;
        Ok(())
    }
}
