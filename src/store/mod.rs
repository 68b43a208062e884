//! Store Module
//!
//! Content-addressable persistence for opaque serialized records.
//!
//! ## Responsibilities
//! - Address every record by the hash of its own bytes
//! - Deduplicate writes: identical content is stored exactly once
//! - Maintain the single mutable head-revision slot
//! - Typed codec wrappers for node / commit / child-entries records
//!
//! ## Layering
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        ContentAddressableStore              │
//! │   (sha-256 ids, dedup, typed helpers)       │
//! └─────────────────────┬───────────────────────┘
//!                       │ Backend trait
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │MemoryBackend│          │ FileBackend │
//!   │ (hash map)  │          │ (records.log│
//!   │             │          │  + HEAD)    │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! Records are immutable once inserted and are never deleted; the head
//! pointer is the only cell ever mutated in place.

mod backend;
mod cas;
mod file;

pub use backend::{Backend, MemoryBackend};
pub use cas::{ContentAddressableStore, Id};
pub use file::FileBackend;
