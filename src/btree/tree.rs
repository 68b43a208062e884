//! B-tree orchestrator
//!
//! Owns the page arena, routes lookups, decides splits and rebalancing, and
//! buffers every structural change into the operation log. Nothing here
//! touches durable storage: `flush` hands the buffered batch to a `DiffSink`
//! and either the whole batch applies or the whole batch is discarded.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::journal::{join_path, DiffSink, JournalOp, OperationLog};

use super::page::{Page, PageContent, PageId};

/// A B-tree index addressed as a subtree of the document tree.
///
/// Not internally synchronized: structural mutations require a single
/// writer at a time. `Db` wraps the tree in a `RwLock` for that; embedders
/// using `BTree` directly must provide the same discipline. Concurrent
/// read-only searches against a non-mutating tree are safe.
pub struct BTree {
    /// Root path prefix of this tree in the document-tree namespace
    name: String,

    /// Page arena; freed slots are recycled through `free`
    pages: Vec<Page>,
    free: Vec<PageId>,
    root: PageId,

    max_entries: usize,
    min_entries: usize,

    /// Fresh page names, monotonically increasing, never reused
    next_name: u64,

    /// Pages mutated since the last flush; marking is idempotent
    dirty: BTreeSet<PageId>,

    /// Buffered journal for the pending logical operation(s)
    log: OperationLog,

    /// Number of key/value entries in the tree
    entry_count: usize,

    /// Set when a flush failed; cleared by the next successful flush
    desynced: bool,
}

impl BTree {
    /// Create an empty tree.
    ///
    /// Buffers the bootstrap Create for the root leaf, which does not exist
    /// in the document tree until the first flush.
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        let name = name.into();
        let mut log = OperationLog::new();
        log.push(JournalOp::Create {
            path: name.clone(),
            keys: Vec::new(),
            values: Vec::new(),
        });
        Self {
            name,
            pages: vec![Page::new_leaf(None, "", Vec::new(), Vec::new())],
            free: Vec::new(),
            root: 0,
            max_entries: config.max_page_entries,
            min_entries: config.min_page_entries,
            next_name: 0,
            dirty: BTreeSet::new(),
            log,
            entry_count: 0,
            desynced: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Number of node hops from the root to any leaf
    pub fn height(&self) -> usize {
        let mut id = self.root;
        let mut height = 0;
        loop {
            match &self.pages[id].content {
                PageContent::Leaf { .. } => return height,
                PageContent::Node { children } => {
                    id = children[0];
                    height += 1;
                }
            }
        }
    }

    /// Number of live leaf pages
    pub fn leaf_count(&self) -> usize {
        let mut count = 1;
        let mut leaf = self.first_leaf(self.root);
        while let Some(next) = self.next_leaf(leaf) {
            count += 1;
            leaf = next;
        }
        count
    }

    /// True after a failed flush, until the next successful one. While set,
    /// durable state may lag the in-memory tree and the caller must retry
    /// the whole logical operation before trusting reads of storage.
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// The pending operation log (buffered, not yet flushed)
    pub fn pending(&self) -> &OperationLog {
        &self.log
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find the value associated with `key`
    pub fn search(&self, key: &str) -> Option<&str> {
        let leaf = self.find_leaf(key);
        let page = &self.pages[leaf];
        match (page.search(key), &page.content) {
            (Ok(pos), PageContent::Leaf { values }) => Some(values[pos].as_str()),
            _ => None,
        }
    }

    /// Iterate all entries in key order
    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            tree: self,
            leaf: Some(self.first_leaf(self.root)),
            pos: 0,
            end: None,
        }
    }

    /// Iterate entries with `from <= key < to`; `None` bounds are open
    pub fn range(&self, from: Option<&str>, to: Option<&str>) -> RangeIter<'_> {
        let (leaf, pos) = match from {
            Some(key) => {
                let leaf = self.find_leaf(key);
                let pos = match self.pages[leaf].search(key) {
                    Ok(pos) | Err(pos) => pos,
                };
                (leaf, pos)
            }
            None => (self.first_leaf(self.root), 0),
        };
        RangeIter {
            tree: self,
            leaf: Some(leaf),
            pos,
            end: to.map(String::from),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a new entry. Strict mode: an existing key is rejected with
    /// `DuplicateKey`; use `put` for declared update semantics.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<()> {
        let leaf = self.find_leaf(key);
        match self.pages[leaf].search(key) {
            Ok(_) => Err(StoreError::DuplicateKey(key.to_string())),
            Err(pos) => {
                self.insert_in_leaf(leaf, pos, key.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    /// Insert or replace in place, returning the previous value if any
    pub fn put(&mut self, key: &str, value: &str) -> Option<String> {
        let leaf = self.find_leaf(key);
        match self.pages[leaf].search(key) {
            Ok(pos) => {
                let old = match &mut self.pages[leaf].content {
                    PageContent::Leaf { values } => {
                        std::mem::replace(&mut values[pos], value.to_string())
                    }
                    PageContent::Node { .. } => unreachable!("find_leaf returned a node"),
                };
                self.modified(leaf);
                Some(old)
            }
            Err(pos) => {
                self.insert_in_leaf(leaf, pos, key.to_string(), value.to_string());
                None
            }
        }
    }

    /// Remove an entry, returning its value. `NotFound` if the key is absent.
    pub fn delete(&mut self, key: &str) -> Result<String> {
        let leaf = self.find_leaf(key);
        let pos = match self.pages[leaf].search(key) {
            Ok(pos) => pos,
            Err(_) => return Err(StoreError::NotFound(format!("key {:?}", key))),
        };
        let (_, value) = self.pages[leaf].remove_at(pos);
        self.entry_count -= 1;
        self.modified(leaf);
        self.rebalance(leaf);
        Ok(value)
    }

    /// Register a page as dirty for the next flush. Idempotent.
    pub fn modified(&mut self, id: PageId) {
        self.dirty.insert(id);
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Submit the pending batch as one atomic diff.
    ///
    /// Dirty pages without a buffered structural entry get a Rewrite
    /// appended (in path order); pages with one get its arrays refreshed
    /// instead, so each page ends up with exactly one entry per flush. On
    /// sink failure the whole batch is discarded, the error propagates, and
    /// the tree is marked desynced; the caller retries the whole logical
    /// operation, never individual page writes.
    pub fn flush(&mut self, sink: &mut dyn DiffSink) -> Result<()> {
        if self.log.is_empty() && self.dirty.is_empty() {
            return Ok(());
        }

        let mut dirty: Vec<PageId> = std::mem::take(&mut self.dirty).into_iter().collect();
        dirty.sort_by_key(|&id| self.path(id));
        for id in dirty {
            let (keys, values) = self.page_arrays(id);
            let path = self.absolute(&self.path(id));
            if !self.log.refresh(&path, &keys, &values) {
                self.log.push(JournalOp::Rewrite { path, keys, values });
            }
        }

        let ops = self.log.take();
        match sink.apply(&ops) {
            Ok(()) => {
                self.desynced = false;
                debug!(tree = %self.name, ops = ops.len(), "journal flushed");
                Ok(())
            }
            Err(e) => {
                self.desynced = true;
                warn!(tree = %self.name, dropped = ops.len(), error = %e,
                      "flush failed; pending operation log discarded");
                Err(e)
            }
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Walk the whole tree checking structural invariants: parallel array
    /// lengths, strict key order, separator bounds, parent back-links,
    /// fill factors, and uniform leaf depth. Violations are fatal and are
    /// reported, never repaired.
    pub fn verify(&self) -> Result<()> {
        let mut leaf_depth = None;
        self.verify_page(self.root, None, 0, &mut leaf_depth)?;
        Ok(())
    }

    fn verify_page(
        &self,
        id: PageId,
        parent: Option<PageId>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> Result<Option<(String, String)>> {
        let page = &self.pages[id];
        let path = self.path(id);
        page.verify(&path)?;
        if page.parent != parent {
            return Err(StoreError::Corruption(format!(
                "page {:?}: parent link mismatch",
                path
            )));
        }
        if parent.is_some() && page.len() < self.min_entries {
            return Err(StoreError::Corruption(format!(
                "page {:?}: {} entries below minimum fill {}",
                path,
                page.len(),
                self.min_entries
            )));
        }
        match &page.content {
            PageContent::Leaf { .. } => {
                match *leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(StoreError::Corruption(format!(
                            "page {:?}: leaf at depth {} but expected {}",
                            path, depth, expected
                        )));
                    }
                    Some(_) => {}
                    None => *leaf_depth = Some(depth),
                }
                Ok(match (page.keys.first(), page.keys.last()) {
                    (Some(first), Some(last)) => Some((first.clone(), last.clone())),
                    _ => None,
                })
            }
            PageContent::Node { children } => {
                let mut low = None;
                let mut high = None;
                for (i, &child) in children.iter().enumerate() {
                    let bounds = self.verify_page(child, Some(id), depth + 1, leaf_depth)?;
                    let Some((cmin, cmax)) = bounds else {
                        return Err(StoreError::Corruption(format!(
                            "page {:?}: empty subtree under child {}",
                            path, i
                        )));
                    };
                    if i > 0 && page.keys[i - 1].as_str() > cmin.as_str() {
                        return Err(StoreError::Corruption(format!(
                            "page {:?}: separator {:?} above subtree minimum {:?}",
                            path,
                            page.keys[i - 1],
                            cmin
                        )));
                    }
                    if i < page.keys.len() && cmax.as_str() >= page.keys[i].as_str() {
                        return Err(StoreError::Corruption(format!(
                            "page {:?}: subtree maximum {:?} reaches separator {:?}",
                            path, cmax, page.keys[i]
                        )));
                    }
                    if i == 0 {
                        low = Some(cmin);
                    }
                    high = Some(cmax);
                }
                Ok(low.zip(high))
            }
        }
    }

    // =========================================================================
    // Traversal Helpers
    // =========================================================================

    /// Leftmost leaf of the subtree rooted at `id`
    pub(crate) fn first_leaf(&self, mut id: PageId) -> PageId {
        loop {
            match &self.pages[id].content {
                PageContent::Leaf { .. } => return id,
                PageContent::Node { children } => id = children[0],
            }
        }
    }

    /// Leaf immediately after `id` in in-order traversal; None for the last
    pub(crate) fn next_leaf(&self, id: PageId) -> Option<PageId> {
        let mut cur = id;
        loop {
            let parent = self.pages[cur].parent?;
            let idx = match self.pages[parent].child_index(cur) {
                Some(idx) => idx,
                None => unreachable!("page not registered with its parent"),
            };
            match &self.pages[parent].content {
                PageContent::Node { children } if idx + 1 < children.len() => {
                    return Some(self.first_leaf(children[idx + 1]));
                }
                _ => cur = parent,
            }
        }
    }

    fn find_leaf(&self, key: &str) -> PageId {
        let mut id = self.root;
        loop {
            match &self.pages[id].content {
                PageContent::Leaf { .. } => return id,
                PageContent::Node { children } => id = children[self.pages[id].route(key)],
            }
        }
    }

    // =========================================================================
    // Split
    // =========================================================================

    fn insert_in_leaf(&mut self, id: PageId, pos: usize, key: String, value: String) {
        self.pages[id].insert_at(pos, key, value);
        self.entry_count += 1;
        self.modified(id);
        if self.pages[id].len() > self.max_entries {
            self.split(id);
        }
    }

    /// Split an overflowing page at the midpoint of its arrays
    fn split(&mut self, id: PageId) {
        let pos = self.pages[id].len() / 2;
        match self.pages[id].parent {
            Some(parent) => self.split_under(id, parent, pos),
            None => self.split_root(id, pos),
        }
    }

    /// Split a non-root page in place under its parent: the page keeps its
    /// name and the `[0, pos)` half, a fresh sibling takes `[pos, ..)`.
    fn split_under(&mut self, id: PageId, parent: PageId, pos: usize) {
        let sibling_name = self.fresh_name();
        let page_path = self.path(id);
        let parent_path = self.path(parent);
        let sibling_path = join_path(&parent_path, &sibling_name);

        let mut moves = Vec::new();
        let (separator, sibling) = if self.pages[id].is_leaf() {
            let (right_keys, right_values) = self.pages[id].split_leaf(pos);
            let separator = right_keys[0].clone();
            let sibling = self.alloc(Page::new_leaf(
                Some(parent),
                sibling_name.clone(),
                right_keys,
                right_values,
            ));
            (separator, sibling)
        } else {
            let (promoted, right_keys, right_children) = self.pages[id].split_node(pos);
            let sibling = self.alloc(Page::new_node(
                Some(parent),
                sibling_name.clone(),
                right_keys,
                right_children.clone(),
            ));
            self.relocate_children(&right_children, sibling, &page_path, &sibling_path, &mut moves);
            (promoted, sibling)
        };

        debug!(tree = %self.name, page = %page_path, sibling = %sibling_path, pos, "page split");

        self.write_data(id);
        self.write_create(sibling);
        for op in moves {
            self.log.push(op);
        }

        let idx = match self.pages[parent].child_index(id) {
            Some(idx) => idx,
            None => unreachable!("page not registered with its parent"),
        };
        self.pages[parent].insert_child(idx, separator, sibling);
        self.modified(parent);
        if self.pages[parent].len() > self.max_entries {
            self.split(parent);
        }
    }

    /// Split the root. The root path is stable: a fresh node takes it over,
    /// the original page keeps its identity and moves under it with a fresh
    /// name (its journal entry is the Rewrite at the new path), and the
    /// sibling is the one Create. Height grows only here.
    fn split_root(&mut self, id: PageId, pos: usize) {
        let left_name = self.fresh_name();
        let right_name = self.fresh_name();

        let new_root = self.alloc(Page::new_node(None, "", Vec::new(), Vec::new()));
        self.pages[id].parent = Some(new_root);
        self.pages[id].name = left_name.clone();

        let mut moves = Vec::new();
        let (separator, sibling) = if self.pages[id].is_leaf() {
            let (right_keys, right_values) = self.pages[id].split_leaf(pos);
            let separator = right_keys[0].clone();
            let sibling = self.alloc(Page::new_leaf(
                Some(new_root),
                right_name.clone(),
                right_keys,
                right_values,
            ));
            (separator, sibling)
        } else {
            let (promoted, right_keys, right_children) = self.pages[id].split_node(pos);
            let sibling = self.alloc(Page::new_node(
                Some(new_root),
                right_name.clone(),
                right_keys,
                right_children.clone(),
            ));
            // both halves' children were addressed directly under the root
            let left_children = match &self.pages[id].content {
                PageContent::Node { children } => children.clone(),
                PageContent::Leaf { .. } => Vec::new(),
            };
            self.relocate_children(&left_children, id, "", &left_name, &mut moves);
            self.relocate_children(&right_children, sibling, "", &right_name, &mut moves);
            (promoted, sibling)
        };

        self.pages[new_root].keys = vec![separator];
        self.pages[new_root].content = PageContent::Node {
            children: vec![id, sibling],
        };
        self.root = new_root;

        debug!(tree = %self.name, left = %left_name, right = %right_name,
               "root split, height increased");

        self.write_data(id);
        self.write_create(sibling);
        for op in moves {
            self.log.push(op);
        }
        self.modified(new_root);
    }

    /// Re-parent `children` to `to_page` and record one Move per child from
    /// under `from_path` to under `to_path`
    fn relocate_children(
        &mut self,
        children: &[PageId],
        to_page: PageId,
        from_path: &str,
        to_path: &str,
        moves: &mut Vec<JournalOp>,
    ) {
        for &child in children {
            let child_name = self.pages[child].name.clone();
            self.pages[child].parent = Some(to_page);
            moves.push(JournalOp::Move {
                from: self.absolute(&join_path(from_path, &child_name)),
                to: self.absolute(&join_path(to_path, &child_name)),
            });
        }
    }

    // =========================================================================
    // Rebalance
    // =========================================================================

    fn rebalance(&mut self, id: PageId) {
        if id == self.root {
            let single_child = match &self.pages[id].content {
                PageContent::Node { children } if children.len() == 1 => Some(children[0]),
                _ => None,
            };
            if let Some(child) = single_child {
                self.collapse_root(child);
            }
            return;
        }
        if self.pages[id].len() >= self.min_entries {
            return;
        }

        let parent = match self.pages[id].parent {
            Some(parent) => parent,
            None => unreachable!("non-root page without a parent"),
        };
        let idx = match self.pages[parent].child_index(id) {
            Some(idx) => idx,
            None => unreachable!("page not registered with its parent"),
        };
        let sibling_at = |node: &Page, i: usize| match &node.content {
            PageContent::Node { children } => children.get(i).copied(),
            PageContent::Leaf { .. } => None,
        };

        if idx > 0 {
            if let Some(left) = sibling_at(&self.pages[parent], idx - 1) {
                if self.pages[left].len() > self.min_entries {
                    self.borrow_from_left(parent, idx);
                    return;
                }
            }
        }
        if let Some(right) = sibling_at(&self.pages[parent], idx + 1) {
            if self.pages[right].len() > self.min_entries {
                self.borrow_from_right(parent, idx);
                return;
            }
        }

        if idx > 0 {
            self.merge(parent, idx - 1);
        } else {
            self.merge(parent, idx);
        }
        self.rebalance(parent);
    }

    fn child_at(&self, node: PageId, idx: usize) -> PageId {
        match &self.pages[node].content {
            PageContent::Node { children } => children[idx],
            PageContent::Leaf { .. } => unreachable!("child_at on a leaf"),
        }
    }

    /// Move one entry from the left sibling into child `idx`; the parent
    /// separator becomes the receiver's new first key
    fn borrow_from_left(&mut self, parent: PageId, idx: usize) {
        let left = self.child_at(parent, idx - 1);
        let cur = self.child_at(parent, idx);
        let sep_idx = idx - 1;

        if self.pages[cur].is_leaf() {
            let last = self.pages[left].len() - 1;
            let (key, value) = self.pages[left].remove_at(last);
            self.pages[parent].keys[sep_idx] = key.clone();
            self.pages[cur].insert_at(0, key, value);
        } else {
            let (moved_key, moved_child) = {
                let page = &mut self.pages[left];
                match &mut page.content {
                    PageContent::Node { children } => {
                        match (page.keys.pop(), children.pop()) {
                            (Some(key), Some(child)) => (key, child),
                            _ => unreachable!("borrow from an empty sibling"),
                        }
                    }
                    PageContent::Leaf { .. } => unreachable!("sibling kind mismatch"),
                }
            };
            let sep = std::mem::replace(&mut self.pages[parent].keys[sep_idx], moved_key);
            let child_name = self.pages[moved_child].name.clone();
            let from = join_path(&self.path(left), &child_name);
            self.pages[moved_child].parent = Some(cur);
            let to = join_path(&self.path(cur), &child_name);
            self.log.push(JournalOp::Move {
                from: self.absolute(&from),
                to: self.absolute(&to),
            });
            let page = &mut self.pages[cur];
            page.keys.insert(0, sep);
            match &mut page.content {
                PageContent::Node { children } => children.insert(0, moved_child),
                PageContent::Leaf { .. } => unreachable!("sibling kind mismatch"),
            }
        }

        debug!(tree = %self.name, page = %self.path(cur), "borrowed from left sibling");
        self.modified(left);
        self.modified(cur);
        self.modified(parent);
    }

    /// Move one entry from the right sibling into child `idx`; the parent
    /// separator becomes the donor's new first key
    fn borrow_from_right(&mut self, parent: PageId, idx: usize) {
        let cur = self.child_at(parent, idx);
        let right = self.child_at(parent, idx + 1);
        let sep_idx = idx;

        if self.pages[cur].is_leaf() {
            let (key, value) = self.pages[right].remove_at(0);
            let pos = self.pages[cur].len();
            self.pages[cur].insert_at(pos, key, value);
            let new_sep = self.pages[right].keys[0].clone();
            self.pages[parent].keys[sep_idx] = new_sep;
        } else {
            let (moved_key, moved_child) = {
                let page = &mut self.pages[right];
                match &mut page.content {
                    PageContent::Node { children } => {
                        (page.keys.remove(0), children.remove(0))
                    }
                    PageContent::Leaf { .. } => unreachable!("sibling kind mismatch"),
                }
            };
            let sep = std::mem::replace(&mut self.pages[parent].keys[sep_idx], moved_key);
            let child_name = self.pages[moved_child].name.clone();
            let from = join_path(&self.path(right), &child_name);
            self.pages[moved_child].parent = Some(cur);
            let to = join_path(&self.path(cur), &child_name);
            self.log.push(JournalOp::Move {
                from: self.absolute(&from),
                to: self.absolute(&to),
            });
            let page = &mut self.pages[cur];
            page.keys.push(sep);
            match &mut page.content {
                PageContent::Node { children } => children.push(moved_child),
                PageContent::Leaf { .. } => unreachable!("sibling kind mismatch"),
            }
        }

        debug!(tree = %self.name, page = %self.path(cur), "borrowed from right sibling");
        self.modified(cur);
        self.modified(right);
        self.modified(parent);
    }

    /// Merge child `idx + 1` into child `idx`, removing the separator
    /// between them and the absorbed page
    fn merge(&mut self, parent: PageId, idx: usize) {
        let left = self.child_at(parent, idx);
        let right = self.child_at(parent, idx + 1);
        let left_path = self.path(left);
        let right_path = self.path(right);

        let separator = {
            let page = &mut self.pages[parent];
            let separator = page.keys.remove(idx);
            match &mut page.content {
                PageContent::Node { children } => {
                    children.remove(idx + 1);
                }
                PageContent::Leaf { .. } => unreachable!("merge parent is a leaf"),
            }
            separator
        };

        let absorbed = std::mem::replace(
            &mut self.pages[right],
            Page::new_leaf(None, "~free", Vec::new(), Vec::new()),
        );
        match absorbed.content {
            PageContent::Leaf { values } => {
                // leaf separators are copies; the separator is dropped
                let page = &mut self.pages[left];
                page.keys.extend(absorbed.keys);
                match &mut page.content {
                    PageContent::Leaf { values: left_values } => left_values.extend(values),
                    PageContent::Node { .. } => unreachable!("sibling kind mismatch"),
                }
            }
            PageContent::Node { children } => {
                for &child in &children {
                    let child_name = self.pages[child].name.clone();
                    self.pages[child].parent = Some(left);
                    self.log.push(JournalOp::Move {
                        from: self.absolute(&join_path(&right_path, &child_name)),
                        to: self.absolute(&join_path(&left_path, &child_name)),
                    });
                }
                let page = &mut self.pages[left];
                page.keys.push(separator);
                page.keys.extend(absorbed.keys);
                match &mut page.content {
                    PageContent::Node { children: left_children } => {
                        left_children.extend(children);
                    }
                    PageContent::Leaf { .. } => unreachable!("sibling kind mismatch"),
                }
            }
        }

        debug!(tree = %self.name, page = %left_path, absorbed = %right_path, "pages merged");

        self.log.push(JournalOp::Remove {
            path: self.absolute(&right_path),
        });
        self.free_page(right);
        self.modified(left);
        self.modified(parent);
    }

    /// Absorb the root's sole remaining child into the root page, whose
    /// path never changes. Height shrinks only here.
    fn collapse_root(&mut self, child: PageId) {
        let child_path = self.path(child);
        let absorbed = std::mem::replace(
            &mut self.pages[child],
            Page::new_leaf(None, "~free", Vec::new(), Vec::new()),
        );

        if let PageContent::Node { children } = &absorbed.content {
            for &grandchild in children {
                let name = self.pages[grandchild].name.clone();
                self.pages[grandchild].parent = Some(self.root);
                self.log.push(JournalOp::Move {
                    from: self.absolute(&join_path(&child_path, &name)),
                    to: self.absolute(&name),
                });
            }
        }

        let root = self.root;
        self.pages[root].keys = absorbed.keys;
        self.pages[root].content = absorbed.content;

        debug!(tree = %self.name, absorbed = %child_path, "root collapsed, height decreased");

        self.log.push(JournalOp::Remove {
            path: self.absolute(&child_path),
        });
        self.free_page(child);
        self.modified(root);
    }

    // =========================================================================
    // Journal Helpers
    // =========================================================================

    /// Buffer a Rewrite of this page's current arrays at its current path
    fn write_data(&mut self, id: PageId) {
        self.modified(id);
        let (keys, values) = self.page_arrays(id);
        let path = self.absolute(&self.path(id));
        if !self.log.refresh(&path, &keys, &values) {
            self.log.push(JournalOp::Rewrite { path, keys, values });
        }
    }

    /// Buffer a Create carrying this page's full arrays; only for pages
    /// that do not exist in the document tree yet
    fn write_create(&mut self, id: PageId) {
        self.modified(id);
        let (keys, values) = self.page_arrays(id);
        self.log.push(JournalOp::Create {
            path: self.absolute(&self.path(id)),
            keys,
            values,
        });
    }

    /// The two serialized arrays of a page: keys plus leaf values, or keys
    /// plus child names for an internal page
    fn page_arrays(&self, id: PageId) -> (Vec<String>, Vec<String>) {
        let page = &self.pages[id];
        let values = match &page.content {
            PageContent::Leaf { values } => values.clone(),
            PageContent::Node { children } => children
                .iter()
                .map(|&child| self.pages[child].name.clone())
                .collect(),
        };
        (page.keys.clone(), values)
    }

    // =========================================================================
    // Arena Helpers
    // =========================================================================

    /// Path of a page inside this tree (ancestor names joined by `/`)
    fn path(&self, id: PageId) -> String {
        let mut segments = Vec::new();
        let mut cur = Some(id);
        while let Some(page_id) = cur {
            let page = &self.pages[page_id];
            if !page.name.is_empty() {
                segments.push(page.name.as_str());
            }
            cur = page.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    fn absolute(&self, rel: &str) -> String {
        join_path(&self.name, rel)
    }

    fn fresh_name(&mut self) -> String {
        let name = self.next_name.to_string();
        self.next_name += 1;
        name
    }

    fn alloc(&mut self, page: Page) -> PageId {
        match self.free.pop() {
            Some(id) => {
                self.pages[id] = page;
                id
            }
            None => {
                self.pages.push(page);
                self.pages.len() - 1
            }
        }
    }

    fn free_page(&mut self, id: PageId) {
        self.dirty.remove(&id);
        self.free.push(id);
    }
}

/// Ordered iterator over `(key, value)` pairs, walking the leaf chain
pub struct RangeIter<'a> {
    tree: &'a BTree,
    leaf: Option<PageId>,
    pos: usize,
    /// Exclusive upper bound
    end: Option<String>,
}

impl<'a> Iterator for RangeIter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        loop {
            let leaf = self.leaf?;
            let page = &tree.pages[leaf];
            if self.pos >= page.len() {
                self.leaf = tree.next_leaf(leaf);
                self.pos = 0;
                continue;
            }
            let key = page.keys[self.pos].as_str();
            if let Some(end) = &self.end {
                if key >= end.as_str() {
                    self.leaf = None;
                    return None;
                }
            }
            let value = match &page.content {
                PageContent::Leaf { values } => values[self.pos].as_str(),
                PageContent::Node { .. } => unreachable!("leaf chain reached a node"),
            };
            self.pos += 1;
            return Some((key, value));
        }
    }
}
