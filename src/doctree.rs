//! Document tree store
//!
//! The receiving side of the diff boundary: a path-addressed node store
//! that applies journal batches atomically and can persist its whole state
//! as one revision through the content-addressable store.
//!
//! Nodes are kept in a flat map keyed by absolute path; hierarchy is
//! derived from path segments, so intermediate nodes that never carried
//! arrays of their own still appear in persisted revisions.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::journal::{array, DiffSink, JournalOp};
use crate::records::{ChildEntriesRecord, CommitRecord, NodeRecord};
use crate::store::{Backend, ContentAddressableStore, Id};

/// Array properties of one document-tree node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageData {
    pub keys: Vec<String>,
    pub values: Vec<String>,
}

/// In-memory document tree applying journal diffs
#[derive(Debug, Default)]
pub struct MemoryTreeStore {
    nodes: BTreeMap<String, PageData>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node data at `path`, if present
    pub fn get(&self, path: &str) -> Option<&PageData> {
        self.nodes.get(path)
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node paths, in order
    pub fn paths(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    fn apply_one(nodes: &mut BTreeMap<String, PageData>, op: &JournalOp) -> Result<()> {
        match op {
            JournalOp::Create { path, keys, values } => {
                if nodes.contains_key(path) {
                    return Err(StoreError::Flush(format!(
                        "create of existing node {:?}",
                        path
                    )));
                }
                nodes.insert(
                    path.clone(),
                    PageData {
                        keys: keys.clone(),
                        values: values.clone(),
                    },
                );
            }
            JournalOp::Rewrite { path, keys, values } => {
                nodes.insert(
                    path.clone(),
                    PageData {
                        keys: keys.clone(),
                        values: values.clone(),
                    },
                );
            }
            JournalOp::Remove { path } => {
                if nodes.remove(path).is_none() {
                    return Err(StoreError::Flush(format!(
                        "remove of missing node {:?}",
                        path
                    )));
                }
                // a removed node takes its remaining subtree with it
                let prefix = format!("{}/", path);
                nodes.retain(|p, _| !p.starts_with(&prefix));
            }
            JournalOp::Move { from, to } => {
                let Some(data) = nodes.remove(from) else {
                    return Err(StoreError::Flush(format!("move of missing node {:?}", from)));
                };
                if nodes.contains_key(to) {
                    return Err(StoreError::Flush(format!(
                        "move target {:?} already exists",
                        to
                    )));
                }
                let prefix = format!("{}/", from);
                let descendants: Vec<String> = nodes
                    .range(prefix.clone()..)
                    .take_while(|(p, _)| p.starts_with(&prefix))
                    .map(|(p, _)| p.clone())
                    .collect();
                nodes.insert(to.clone(), data);
                for old_path in descendants {
                    if let Some(sub) = nodes.remove(&old_path) {
                        let new_path = format!("{}{}", to, &old_path[from.len()..]);
                        nodes.insert(new_path, sub);
                    }
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Revision Persistence
    // =========================================================================

    /// Persist the whole tree as one revision and advance the head.
    ///
    /// Node and child-map records are written bottom-up, so every record a
    /// revision references is durable before its referrer, and the head
    /// moves only after the commit record itself is stored. Unchanged
    /// subtrees re-hash to the same ids and deduplicate away.
    pub fn persist_revision<B: Backend>(
        &self,
        store: &ContentAddressableStore<B>,
        message: &str,
        time_ms: u64,
    ) -> Result<Id> {
        let root = self.persist_subtree("", store)?;
        let parent = store.read_head()?.map(|id| id.to_hex());
        let commit = CommitRecord {
            parent,
            root: root.to_hex(),
            time_ms,
            message: message.to_string(),
        };
        let id = store.write_commit(&commit)?;
        store.write_head(&id)?;
        info!(commit = %id, root = %root, "revision committed");
        Ok(id)
    }

    fn persist_subtree<B: Backend>(
        &self,
        path: &str,
        store: &ContentAddressableStore<B>,
    ) -> Result<Id> {
        let mut entries = BTreeMap::new();
        for (name, child_path) in self.direct_children(path) {
            let child_id = self.persist_subtree(&child_path, store)?;
            entries.insert(name, child_id.to_hex());
        }
        let child_map = if entries.is_empty() {
            None
        } else {
            Some(store.write_child_map(&ChildEntriesRecord { entries })?.to_hex())
        };

        let mut properties = BTreeMap::new();
        if let Some(data) = self.nodes.get(path) {
            properties.insert("keys".to_string(), array(&data.keys));
            properties.insert("values".to_string(), array(&data.values));
        }
        store.write_node(&NodeRecord {
            properties,
            child_map,
        })
    }

    /// Direct child segments under `path`, derived from the flat key space
    fn direct_children(&self, path: &str) -> Vec<(String, String)> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut segments = BTreeSet::new();
        for node_path in self
            .nodes
            .range(prefix.clone()..)
            .map(|(p, _)| p.as_str())
            .take_while(|p| p.starts_with(prefix.as_str()))
        {
            let rest = &node_path[prefix.len()..];
            if rest.is_empty() {
                continue;
            }
            let segment = match rest.find('/') {
                Some(pos) => &rest[..pos],
                None => rest,
            };
            segments.insert(segment.to_string());
        }
        segments
            .into_iter()
            .map(|segment| {
                let child_path = if path.is_empty() {
                    segment.clone()
                } else {
                    format!("{}/{}", path, segment)
                };
                (segment, child_path)
            })
            .collect()
    }
}

impl DiffSink for MemoryTreeStore {
    /// Apply one batch atomically: ops run against a working copy that
    /// replaces the live tree only when every op succeeded
    fn apply(&mut self, ops: &[JournalOp]) -> Result<()> {
        let mut next = self.nodes.clone();
        for op in ops {
            Self::apply_one(&mut next, op)?;
        }
        self.nodes = next;
        debug!(ops = ops.len(), nodes = self.nodes.len(), "diff applied");
        Ok(())
    }
}
