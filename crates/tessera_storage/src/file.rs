//! Append-only file store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::KvStore;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;
/// op (1) + key length (4) + value length (4).
const HEADER_SIZE: usize = 9;
const CRC_SIZE: usize = 4;

/// A file-backed key/value store.
///
/// Every write is appended to a log file as a checksummed record; the live
/// rows are rebuilt by replaying the log on [`open`](Self::open). Rows
/// survive process restarts.
///
/// # Record Format
///
/// ```text
/// op (u8) | key_len (u32 LE) | value_len (u32 LE) | key | value | crc32 (u32 LE)
/// ```
///
/// # Durability
///
/// - With `sync_on_write` (the default) every write calls `File::sync_data()`
/// - A torn record at the tail (crash mid-append) is truncated on open
/// - [`compact`](Self::compact) rewrites the log with live rows only
///
/// # Locking
///
/// The file is locked exclusively while the store is open, so two
/// processes can't interleave appends.
///
/// # Example
///
/// ```no_run
/// use tessera_storage::{FileStore, KvStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("queue.log")).unwrap();
/// store.put("sync_queue/1", b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    sync_on_write: bool,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    rows: BTreeMap<String, Vec<u8>>,
    /// Bytes in the log that belong to overwritten or deleted rows.
    dead_bytes: u64,
}

impl FileStore {
    /// Opens or creates a file store at the given path and replays its log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or contains a corrupted record before its tail.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|e| StorageError::Locked(format!("{}: {e}", path.display())))?;

        let (rows, dead_bytes) = replay(&mut file, path)?;
        debug!(path = %path.display(), rows = rows.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write: true,
            inner: Mutex::new(Inner {
                file,
                rows,
                dead_bytes,
            }),
        })
    }

    /// Sets whether every write is synced to disk before returning.
    #[must_use]
    pub fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of log bytes held by overwritten or deleted rows.
    #[must_use]
    pub fn dead_bytes(&self) -> u64 {
        self.inner.lock().dead_bytes
    }

    /// Rewrites the log so it only contains live rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewritten log cannot be written or swapped in.
    pub fn compact(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();

        let tmp_path = self.path.with_extension("compact");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        for (key, value) in &inner.rows {
            tmp.write_all(&encode_record(OP_PUT, key, value))?;
        }
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.try_lock_exclusive()
            .map_err(|e| StorageError::Locked(format!("{}: {e}", self.path.display())))?;

        debug!(
            path = %self.path.display(),
            reclaimed = inner.dead_bytes,
            "compacted file store"
        );
        inner.file = file;
        inner.dead_bytes = 0;
        Ok(())
    }

    fn append(&self, inner: &mut Inner, op: u8, key: &str, value: &[u8]) -> StorageResult<()> {
        let record = encode_record(op, key, value);
        inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(&record)?;
        if self.sync_on_write {
            inner.file.sync_data()?;
        }
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().rows.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, OP_PUT, key, value)?;
        if let Some(old) = inner.rows.insert(key.to_string(), value.to_vec()) {
            inner.dead_bytes += record_len(key, &old);
        }
        Ok(())
    }

    fn insert(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if inner.rows.contains_key(key) {
            return Err(StorageError::duplicate_key(key));
        }
        self.append(&mut inner, OP_PUT, key, value)?;
        inner.rows.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        if !inner.rows.contains_key(key) {
            return Ok(false);
        }
        self.append(&mut inner, OP_DELETE, key, &[])?;
        if let Some(old) = inner.rows.remove(key) {
            inner.dead_bytes += record_len(key, &old) + record_len(key, &[]);
        }
        Ok(true)
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let inner = self.inner.lock();
        Ok(inner
            .rows
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}

fn record_len(key: &str, value: &[u8]) -> u64 {
    (HEADER_SIZE + key.len() + value.len() + CRC_SIZE) as u64
}

fn encode_record(op: u8, key: &str, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + key.len() + value.len() + CRC_SIZE);
    buf.push(op);
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value);
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Replays the log into a row map.
///
/// A record that runs past the end of the file is a torn write and gets
/// truncated. A checksum mismatch on the final record is treated the same
/// way; anywhere else it means corruption.
fn replay(file: &mut File, path: &Path) -> StorageResult<(BTreeMap<String, Vec<u8>>, u64)> {
    let mut data = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut data)?;

    let mut rows = BTreeMap::new();
    let mut dead_bytes = 0u64;
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < HEADER_SIZE + CRC_SIZE {
            break;
        }
        let op = data[offset];
        let key_len = read_u32(&data[offset + 1..offset + 5]) as usize;
        let value_len = read_u32(&data[offset + 5..offset + 9]) as usize;
        let total = HEADER_SIZE + key_len + value_len + CRC_SIZE;
        if remaining < total {
            break;
        }

        let body_end = offset + total - CRC_SIZE;
        let stored_crc = read_u32(&data[body_end..offset + total]);
        if compute_crc32(&data[offset..body_end]) != stored_crc {
            if offset + total == data.len() {
                break;
            }
            return Err(StorageError::Corrupted(format!(
                "checksum mismatch at offset {offset} in {}",
                path.display()
            )));
        }

        let key_start = offset + HEADER_SIZE;
        let key = std::str::from_utf8(&data[key_start..key_start + key_len])
            .map_err(|e| StorageError::Corrupted(format!("invalid key at offset {offset}: {e}")))?
            .to_string();
        let value = data[key_start + key_len..body_end].to_vec();

        match op {
            OP_PUT => {
                if let Some(old) = rows.insert(key.clone(), value) {
                    dead_bytes += record_len(&key, &old);
                }
            }
            OP_DELETE => {
                if let Some(old) = rows.remove(&key) {
                    dead_bytes += record_len(&key, &old);
                }
                dead_bytes += total as u64;
            }
            other => {
                return Err(StorageError::Corrupted(format!(
                    "unknown record op {other} at offset {offset}"
                )));
            }
        }
        offset += total;
    }

    if offset < data.len() {
        warn!(
            path = %path.display(),
            discarded = data.len() - offset,
            "truncating torn record at end of log"
        );
        file.set_len(offset as u64)?;
        file.sync_all()?;
    }

    Ok((rows, dead_bytes))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

/// Computes CRC32 (IEEE polynomial) for a record body.
fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
