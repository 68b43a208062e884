//! File-backed record table
//!
//! Durable implementation of the blob-table boundary.
//!
//! ## File Format (records.log)
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Entry 1                                     │
//! │ ┌─────────┬─────────┬─────────┬──────────┐  │
//! │ │ ID (32) │ Len (4) │ CRC (4) │ Payload  │  │
//! │ └─────────┴─────────┴─────────┴──────────┘  │
//! ├─────────────────────────────────────────────┤
//! │ Entry 2                                     │
//! │ ...                                         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The log is append-only; the id → offset index is rebuilt by scanning on
//! open. A truncated trailing entry (torn write) is cut off with a warning;
//! a CRC mismatch on read is corruption and is reported, never repaired.
//! The head pointer lives in a separate `HEAD` file, replaced atomically
//! via a temp-file rename.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::SyncStrategy;
use crate::error::{Result, StoreError};

use super::Backend;

const LOG_FILENAME: &str = "records.log";
const HEAD_FILENAME: &str = "HEAD";

/// id (32) + payload length (4) + crc32 (4)
const ENTRY_HEADER: u64 = 40;
const ID_LEN: usize = 32;

/// Durable blob table: append-only record log plus a HEAD file
pub struct FileBackend {
    dir: PathBuf,
    sync: SyncStrategy,
    inner: Mutex<Inner>,
}

/// File handle and index under one lock, so check-and-insert is atomic
struct Inner {
    log: File,
    index: HashMap<[u8; ID_LEN], IndexEntry>,
}

#[derive(Clone, Copy)]
struct IndexEntry {
    offset: u64,
    len: u32,
    crc: u32,
}

impl FileBackend {
    /// Open or create the record store in `dir`, rebuilding the id index
    /// by scanning the log
    pub fn open(dir: &Path, sync: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let mut log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(dir.join(LOG_FILENAME))?;

        let (index, valid_end) = Self::scan(&mut log)?;
        let file_len = log.metadata()?.len();
        if valid_end < file_len {
            warn!(
                valid_end,
                file_len, "truncating torn tail entry from record log"
            );
            log.set_len(valid_end)?;
        }
        info!(records = index.len(), dir = %dir.display(), "record store opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            sync,
            inner: Mutex::new(Inner { log, index }),
        })
    }

    /// Scan the log front to back, collecting `(index, valid_end)`.
    /// Stops at the first incomplete entry.
    fn scan(log: &mut File) -> Result<(HashMap<[u8; ID_LEN], IndexEntry>, u64)> {
        let file_len = log.metadata()?.len();
        let mut index = HashMap::new();
        let mut offset = 0u64;
        log.seek(SeekFrom::Start(0))?;

        while offset + ENTRY_HEADER <= file_len {
            let mut header = [0u8; ENTRY_HEADER as usize];
            log.read_exact(&mut header)?;

            let mut id = [0u8; ID_LEN];
            id.copy_from_slice(&header[..ID_LEN]);
            let len = u32::from_le_bytes([header[32], header[33], header[34], header[35]]);
            let crc = u32::from_le_bytes([header[36], header[37], header[38], header[39]]);

            let payload_offset = offset + ENTRY_HEADER;
            if payload_offset + len as u64 > file_len {
                // torn write at the tail
                break;
            }
            index.insert(
                id,
                IndexEntry {
                    offset: payload_offset,
                    len,
                    crc,
                },
            );
            offset = payload_offset + len as u64;
            log.seek(SeekFrom::Start(offset))?;
        }

        Ok((index, offset))
    }

    fn head_path(&self) -> PathBuf {
        self.dir.join(HEAD_FILENAME)
    }
}

impl Backend for FileBackend {
    fn insert_if_absent(&self, id: &[u8], bytes: &[u8]) -> Result<()> {
        let id: [u8; ID_LEN] = id
            .try_into()
            .map_err(|_| StoreError::Corruption(format!("record id must be {} bytes", ID_LEN)))?;

        let mut inner = self.inner.lock();
        if inner.index.contains_key(&id) {
            return Ok(());
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(bytes);
        let crc = hasher.finalize();

        let payload_offset = inner.log.metadata()?.len() + ENTRY_HEADER;
        let mut entry = Vec::with_capacity(ENTRY_HEADER as usize + bytes.len());
        entry.extend_from_slice(&id);
        entry.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        entry.extend_from_slice(&crc.to_le_bytes());
        entry.extend_from_slice(bytes);
        inner.log.write_all(&entry)?;
        if self.sync == SyncStrategy::EveryWrite {
            inner.log.sync_data()?;
        }

        inner.index.insert(
            id,
            IndexEntry {
                offset: payload_offset,
                len: bytes.len() as u32,
                crc,
            },
        );
        Ok(())
    }

    fn get(&self, id: &[u8]) -> Result<Option<Bytes>> {
        let id: [u8; ID_LEN] = match id.try_into() {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };

        let mut inner = self.inner.lock();
        let entry = match inner.index.get(&id) {
            Some(entry) => *entry,
            None => return Ok(None),
        };

        let mut payload = vec![0u8; entry.len as usize];
        inner.log.seek(SeekFrom::Start(entry.offset))?;
        inner.log.read_exact(&mut payload)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != entry.crc {
            return Err(StoreError::Corruption(format!(
                "crc mismatch for record {}",
                hex::encode(id)
            )));
        }
        Ok(Some(Bytes::from(payload)))
    }

    fn read_head(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.head_path()) {
            Ok(contents) => {
                let head = contents.trim();
                if head.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(head.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_head(&self, id: &str) -> Result<()> {
        let tmp = self.dir.join("HEAD.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(id.as_bytes())?;
        if self.sync == SyncStrategy::EveryWrite {
            file.sync_data()?;
        }
        fs::rename(&tmp, self.head_path())?;
        Ok(())
    }
}
