//! Records Module
//!
//! Typed records persisted through the content-addressable store and the
//! codec that turns them into the opaque byte blobs the store hashes.
//!
//! ## Record Kinds
//! - `NodeRecord`    — a document node: scalar properties plus the id of
//!   its child-entries map, when it has children
//! - `ChildEntriesRecord` — child name → node record id
//! - `CommitRecord`  — parent revision, root node id, timestamp, message
//!
//! All maps are `BTreeMap` so encodings are deterministic: a record's
//! identity is the hash of its bytes, and equal records must produce equal
//! bytes. Round-trips are exact: `decode(encode(x)) == x`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Serialize/deserialize boundary for typed records
pub trait Record: Serialize + DeserializeOwned {
    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// A document node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Scalar properties, by name
    pub properties: BTreeMap<String, String>,

    /// Hex id of this node's `ChildEntriesRecord`, None for a childless node
    pub child_map: Option<String>,
}

impl Record for NodeRecord {}

/// Child name → node record hex id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntriesRecord {
    pub entries: BTreeMap<String, String>,
}

impl Record for ChildEntriesRecord {}

/// A committed revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Hex id of the parent commit, None for the first revision
    pub parent: Option<String>,

    /// Hex id of the revision's root node record
    pub root: String,

    /// Commit time, unix millis
    pub time_ms: u64,

    pub message: String,
}

impl Record for CommitRecord {}
