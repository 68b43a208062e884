//! # revstore
//!
//! The indexing and durable-storage core of a content-addressable,
//! revision-tracked document store:
//! - B-tree secondary index whose pages are paths in a document tree
//! - Buffered operation log, flushed as one atomic diff per operation
//! - Content-addressed record store with write-once deduplication
//! - Single mutable head pointer naming the latest committed revision
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Db                                  │
//! │               (Single Writer / Multi Reader)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    BTree    │ journal  │  Document   │
//!   │  (pages +   ├─────────►│    Tree     │
//!   │ OperationLog│   diff   │ (path map)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ records
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Content-  │
//!                           │ Addressable │
//!                           │    Store    │
//!                           └─────────────┘
//! ```
//!
//! A mutation enters at [`Db`], descends the [`btree::BTree`] to a leaf,
//! and every structural change buffers itself into the operation log. The
//! log flushes as one diff against the document tree; [`Db::commit`] then
//! persists the tree's state as typed records through the
//! [`store::ContentAddressableStore`], which deduplicates by content hash
//! and advances the head pointer last.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod journal;
pub mod btree;
pub mod records;
pub mod store;
pub mod doctree;
pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, SyncStrategy};
pub use btree::BTree;
pub use db::Db;
pub use doctree::MemoryTreeStore;
pub use journal::{DiffSink, JournalOp, OperationLog};
pub use records::{ChildEntriesRecord, CommitRecord, NodeRecord, Record};
pub use store::{Backend, ContentAddressableStore, FileBackend, Id, MemoryBackend};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of revstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
