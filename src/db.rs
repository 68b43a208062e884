//! Db Module
//!
//! The top-level handle tying the index, the document tree, and the
//! content-addressable store together.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
//!
//! - **Writes** (insert/put/delete): the index write lock is held for the
//!   whole logical transaction — mutate tree, then flush the journal as one
//!   diff. Splits and rebalances mutate shared page state, so structural
//!   mutation is strictly one writer at a time.
//! - **Reads** (get/range): the index read lock only; many concurrent
//!   readers against a stable snapshot.
//! - **Commits**: serialize on the document-tree lock; record writes go
//!   through the store's own atomic insert-if-absent.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::btree::BTree;
use crate::config::Config;
use crate::doctree::MemoryTreeStore;
use crate::error::Result;
use crate::store::{Backend, ContentAddressableStore, FileBackend, Id, MemoryBackend};

/// Name of the index subtree inside the document tree
const INDEX_TREE: &str = "index";

/// A revision-tracked document store instance
pub struct Db<B: Backend> {
    config: Config,

    /// Secondary index; RwLock enforces the single-writer discipline
    index: RwLock<BTree>,

    /// Document tree the journal flushes against
    doctree: Mutex<MemoryTreeStore>,

    /// Durable, deduplicating record store
    store: ContentAddressableStore<B>,
}

impl Db<MemoryBackend> {
    /// Open a store with no durable backing (tests, scratch instances)
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_backend(config, MemoryBackend::new())
    }
}

impl Db<FileBackend> {
    /// Open or create a store under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let backend = FileBackend::open(&config.data_dir, config.sync)?;
        Self::with_backend(config, backend)
    }
}

impl<B: Backend> Db<B> {
    /// Wire a store over an explicit backend
    pub fn with_backend(config: Config, backend: B) -> Result<Self> {
        config.validate()?;
        let mut index = BTree::new(INDEX_TREE, &config);
        let mut doctree = MemoryTreeStore::new();
        // materialize the empty root leaf so the first revision is complete
        index.flush(&mut doctree)?;
        Ok(Self {
            config,
            index: RwLock::new(index),
            doctree: Mutex::new(doctree),
            store: ContentAddressableStore::new(backend),
        })
    }

    // =========================================================================
    // Index Operations
    // =========================================================================

    /// Look up the value for `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.index.read().search(key).map(String::from)
    }

    /// Insert a new entry; an existing key is rejected with `DuplicateKey`
    pub fn insert(&self, key: &str, value: &str) -> Result<()> {
        let mut index = self.index.write();
        let mut doctree = self.doctree.lock();
        index.insert(key, value)?;
        index.flush(&mut *doctree)
    }

    /// Insert or replace, returning the previous value if any
    pub fn put(&self, key: &str, value: &str) -> Result<Option<String>> {
        let mut index = self.index.write();
        let mut doctree = self.doctree.lock();
        let old = index.put(key, value);
        index.flush(&mut *doctree)?;
        Ok(old)
    }

    /// Remove an entry, returning its value; `NotFound` if absent
    pub fn delete(&self, key: &str) -> Result<String> {
        let mut index = self.index.write();
        let mut doctree = self.doctree.lock();
        let value = index.delete(key)?;
        index.flush(&mut *doctree)?;
        Ok(value)
    }

    /// Entries with `from <= key < to`, in key order; `None` bounds are open
    pub fn range(&self, from: Option<&str>, to: Option<&str>) -> Vec<(String, String)> {
        self.index
            .read()
            .range(from, to)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    /// Persist the current document tree as a new revision and advance the
    /// head pointer. Every record is durable before the head moves.
    pub fn commit(&self, message: &str) -> Result<Id> {
        let doctree = self.doctree.lock();
        let time_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        doctree.persist_revision(&self.store, message, time_ms)
    }

    /// Id of the latest committed revision, None before the first commit
    pub fn head(&self) -> Result<Option<Id>> {
        self.store.read_head()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn store(&self) -> &ContentAddressableStore<B> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check the index's structural invariants
    pub fn verify(&self) -> Result<()> {
        self.index.read().verify()
    }

    /// True after a failed flush until the next successful one
    pub fn is_desynced(&self) -> bool {
        self.index.read().is_desynced()
    }

    /// Run `f` against the document tree (test introspection)
    pub fn with_doctree<T>(&self, f: impl FnOnce(&MemoryTreeStore) -> T) -> T {
        let guard = self.doctree.lock();
        f(&guard)
    }
}
