//! Backing record store boundary
//!
//! A keyed byte-blob table plus a single-row mutable head cell. The store
//! core only ever issues `insert_if_absent`, `get`, and head reads/writes;
//! everything else (pooling, table layout) belongs to the implementation.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::Result;

/// Keyed byte-blob table consumed by the content-addressable store.
///
/// `insert_if_absent` must be atomic with respect to concurrent writers of
/// the same key: both may observe success, at most one physically inserts.
pub trait Backend: Send + Sync {
    /// Insert `bytes` under `id` unless a row with that id already exists;
    /// a silent no-op otherwise
    fn insert_if_absent(&self, id: &[u8], bytes: &[u8]) -> Result<()>;

    /// Fetch the blob stored under `id`
    fn get(&self, id: &[u8]) -> Result<Option<Bytes>>;

    /// Current head id (hex), None if uninitialized
    fn read_head(&self) -> Result<Option<String>>;

    /// Overwrite the head cell; the only in-place mutation in the store
    fn write_head(&self, id: &str) -> Result<()>;
}

/// In-memory backend for tests and embedders without durability needs
#[derive(Default)]
pub struct MemoryBackend {
    /// One write lock covers the whole check-and-insert
    records: RwLock<HashMap<Vec<u8>, Bytes>>,
    head: RwLock<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical records (for dedup assertions)
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }
}

impl Backend for MemoryBackend {
    fn insert_if_absent(&self, id: &[u8], bytes: &[u8]) -> Result<()> {
        let mut records = self.records.write();
        records
            .entry(id.to_vec())
            .or_insert_with(|| Bytes::copy_from_slice(bytes));
        Ok(())
    }

    fn get(&self, id: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn read_head(&self) -> Result<Option<String>> {
        Ok(self.head.read().clone())
    }

    fn write_head(&self, id: &str) -> Result<()> {
        *self.head.write() = Some(id.to_string());
        Ok(())
    }
}
