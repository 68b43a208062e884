//! Content-addressable store
//!
//! Records are keyed by the SHA-256 of their own bytes: identical payloads
//! collapse to one stored copy and addresses are deterministic. The store
//! is insert-only apart from the head pointer, the single mutable cell
//! naming the current revision.

use std::fmt;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::records::{ChildEntriesRecord, CommitRecord, NodeRecord, Record};

use super::Backend;

/// Content hash of a record; hex-encoded when crossing a boundary
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; 32]);

impl Id {
    /// The id of a payload: SHA-256 over its bytes
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| StoreError::Serialization(format!("malformed record id: {}", e)))?;
        let raw: [u8; 32] = raw.try_into().map_err(|_| {
            StoreError::Serialization(format!("record id must be 32 bytes, got {:?}", s))
        })?;
        Ok(Self(raw))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

/// Deduplicating record store over a pluggable blob-table backend
pub struct ContentAddressableStore<B> {
    backend: B,
}

impl<B: Backend> ContentAddressableStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Store a payload under the hash of its bytes.
    ///
    /// A no-op when a record with that id already exists; the id is
    /// returned either way. The backend's insert-if-absent is atomic, so
    /// concurrent writers of identical content both succeed and exactly
    /// one copy is stored.
    pub fn write_record(&self, bytes: &[u8]) -> Result<Id> {
        let id = Id::of(bytes);
        self.backend.insert_if_absent(id.as_bytes(), bytes)?;
        Ok(id)
    }

    /// Fetch a record by id; `NotFound` if no such record exists
    pub fn read_record(&self, id: &Id) -> Result<Bytes> {
        self.backend
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))
    }

    /// Currently committed revision id, None if uninitialized
    pub fn read_head(&self) -> Result<Option<Id>> {
        match self.backend.read_head()? {
            Some(hex) => Ok(Some(Id::from_hex(&hex)?)),
            None => Ok(None),
        }
    }

    /// Advance the head pointer.
    ///
    /// Callers must have written every record the new revision references:
    /// the store does not guard against a head that dereferences to a
    /// missing record.
    pub fn write_head(&self, id: &Id) -> Result<()> {
        self.backend.write_head(&id.to_hex())
    }

    // =========================================================================
    // Typed Helpers
    // =========================================================================

    pub fn write_node(&self, node: &NodeRecord) -> Result<Id> {
        self.write_record(&node.encode()?)
    }

    pub fn read_node(&self, id: &Id) -> Result<NodeRecord> {
        NodeRecord::decode(&self.read_record(id)?)
    }

    pub fn write_commit(&self, commit: &CommitRecord) -> Result<Id> {
        self.write_record(&commit.encode()?)
    }

    pub fn read_commit(&self, id: &Id) -> Result<CommitRecord> {
        CommitRecord::decode(&self.read_record(id)?)
    }

    pub fn write_child_map(&self, map: &ChildEntriesRecord) -> Result<Id> {
        self.write_record(&map.encode()?)
    }

    pub fn read_child_map(&self, id: &Id) -> Result<ChildEntriesRecord> {
        ChildEntriesRecord::decode(&self.read_record(id)?)
    }
}
