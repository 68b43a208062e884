//! Tests for the B-tree index
//!
//! These tests verify:
//! - Sorted-order and uniqueness invariants under arbitrary insert orders
//! - Search across page boundaries
//! - Split partitioning and the journal entries it emits
//! - Duplicate-key policy (strict insert vs. declared update)
//! - Underflow handling: borrow, merge, root collapse
//! - Range scans over the leaf chain

use revstore::journal::{DiffSink, JournalOp};
use revstore::{BTree, Config, MemoryTreeStore, Result, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

/// Install the test subscriber once; RUST_LOG=debug shows journal activity
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Tree with a small fan-out so splits happen early
fn small_config() -> Config {
    Config::builder()
        .max_page_entries(4)
        .build()
        .unwrap()
}

fn new_tree() -> (BTree, MemoryTreeStore) {
    (BTree::new("idx", &small_config()), MemoryTreeStore::new())
}

/// Insert with a flush per key, like one logical operation each
fn insert_all(tree: &mut BTree, sink: &mut MemoryTreeStore, keys: &[&str]) {
    for key in keys {
        tree.insert(key, &format!("v-{}", key)).unwrap();
        tree.flush(sink).unwrap();
    }
}

/// Sink that keeps every applied batch for inspection
#[derive(Default)]
struct RecordingSink {
    inner: MemoryTreeStore,
    batches: Vec<Vec<JournalOp>>,
}

impl DiffSink for RecordingSink {
    fn apply(&mut self, ops: &[JournalOp]) -> Result<()> {
        self.batches.push(ops.to_vec());
        self.inner.apply(ops)
    }
}

/// Sink that always fails
struct FailingSink;

impl DiffSink for FailingSink {
    fn apply(&mut self, _ops: &[JournalOp]) -> Result<()> {
        Err(StoreError::Flush("sink unavailable".to_string()))
    }
}

// =============================================================================
// Lookup and Ordering
// =============================================================================

#[test]
fn test_insert_then_search() {
    let (mut tree, mut sink) = new_tree();
    insert_all(&mut tree, &mut sink, &["b", "a", "c"]);

    assert_eq!(tree.search("a"), Some("v-a"));
    assert_eq!(tree.search("b"), Some("v-b"));
    assert_eq!(tree.search("c"), Some("v-c"));
    assert_eq!(tree.search("d"), None);
}

#[test]
fn test_inorder_traversal_is_strictly_increasing() {
    let (mut tree, mut sink) = new_tree();

    // deterministic shuffle: 0, 37, 74, ... mod 100
    let keys: Vec<String> = (0..100).map(|i| format!("k{:03}", (i * 37) % 100)).collect();
    for key in &keys {
        tree.insert(key, "x").unwrap();
        tree.flush(&mut sink).unwrap();
    }

    let collected: Vec<&str> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(collected.len(), 100);
    for pair in collected.windows(2) {
        assert!(pair[0] < pair[1], "{:?} not below {:?}", pair[0], pair[1]);
    }
    tree.verify().unwrap();
}

#[test]
fn test_search_finds_every_inserted_key() {
    let (mut tree, mut sink) = new_tree();
    let keys: Vec<String> = (0..60).map(|i| format!("k{:02}", (i * 23) % 60)).collect();
    for key in &keys {
        tree.insert(key, &format!("val-{}", key)).unwrap();
        tree.flush(&mut sink).unwrap();
    }
    for key in &keys {
        assert_eq!(tree.search(key), Some(format!("val-{}", key).as_str()));
    }
    assert!(tree.height() >= 2, "60 keys at fan-out 4 should stack nodes");
}

#[test]
fn test_range_scan_honors_bounds() {
    let (mut tree, mut sink) = new_tree();
    insert_all(&mut tree, &mut sink, &["a", "b", "c", "d", "e", "f", "g"]);

    let hits: Vec<(String, String)> = tree
        .range(Some("c"), Some("f"))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(
        hits.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
        vec!["c", "d", "e"]
    );

    let open: Vec<&str> = tree.range(None, Some("c")).map(|(k, _)| k).collect();
    assert_eq!(open, vec!["a", "b"]);

    let tail: Vec<&str> = tree.range(Some("f"), None).map(|(k, _)| k).collect();
    assert_eq!(tail, vec!["f", "g"]);

    assert!(tree.range(Some("x"), None).next().is_none());
}

// =============================================================================
// Duplicate Policy
// =============================================================================

#[test]
fn test_strict_insert_rejects_duplicates() {
    let (mut tree, mut sink) = new_tree();
    insert_all(&mut tree, &mut sink, &["a"]);

    let err = tree.insert("a", "other").unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey(key) if key == "a"));
    // the reject left the entry untouched
    assert_eq!(tree.search("a"), Some("v-a"));
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_put_replaces_in_place() {
    let (mut tree, mut sink) = new_tree();
    insert_all(&mut tree, &mut sink, &["a"]);

    let old = tree.put("a", "updated");
    tree.flush(&mut sink).unwrap();
    assert_eq!(old, Some("v-a".to_string()));
    assert_eq!(tree.search("a"), Some("updated"));
    assert_eq!(tree.len(), 1);

    assert_eq!(tree.put("b", "fresh"), None);
    assert_eq!(tree.len(), 2);
}

// =============================================================================
// Split Behavior
// =============================================================================

#[test]
fn test_fifth_insert_splits_the_root_leaf() {
    init_tracing();
    let mut tree = BTree::new("idx", &small_config());
    let mut sink = RecordingSink::default();

    for key in ["a", "b", "c", "d", "e"] {
        tree.insert(key, &format!("v-{}", key)).unwrap();
        tree.flush(&mut sink).unwrap();
    }

    // midpoint split: ["a","b"] and ["c","d","e"], one separator above
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.leaf_count(), 2);
    assert_eq!(tree.search("d"), Some("v-d"));
    tree.verify().unwrap();

    let left = sink.inner.get("idx/0").expect("left leaf in doc tree");
    assert_eq!(left.keys, vec!["a", "b"]);
    let right = sink.inner.get("idx/1").expect("sibling leaf in doc tree");
    assert_eq!(right.keys, vec!["c", "d", "e"]);
    let root = sink.inner.get("idx").expect("root node in doc tree");
    assert_eq!(root.keys, vec!["c"]);
    assert_eq!(root.values, vec!["0", "1"]);
}

#[test]
fn test_split_journal_has_one_create_and_one_rewrite_for_the_halves() {
    let mut tree = BTree::new("idx", &small_config());
    let mut sink = RecordingSink::default();

    for key in ["a", "b", "c", "d", "e"] {
        tree.insert(key, &format!("v-{}", key)).unwrap();
        tree.flush(&mut sink).unwrap();
    }

    // the batch for the overflowing insert carries the split
    let batch = sink.batches.last().unwrap();
    let creates: Vec<&JournalOp> = batch
        .iter()
        .filter(|op| matches!(op, JournalOp::Create { .. }))
        .collect();
    assert_eq!(creates.len(), 1, "exactly one create for the new sibling");
    match creates[0] {
        JournalOp::Create { path, keys, .. } => {
            assert_eq!(path, "idx/1");
            assert_eq!(keys, &vec!["c", "d", "e"]);
        }
        _ => unreachable!(),
    }

    let shrunk: Vec<&JournalOp> = batch
        .iter()
        .filter(|op| matches!(op, JournalOp::Rewrite { path, .. } if path == "idx/0"))
        .collect();
    assert_eq!(shrunk.len(), 1, "exactly one rewrite for the shrunk original");
    match shrunk[0] {
        JournalOp::Rewrite { keys, values, .. } => {
            assert_eq!(keys, &vec!["a", "b"]);
            assert_eq!(values, &vec!["v-a", "v-b"]);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_split_partitions_without_loss() {
    let (mut tree, mut sink) = new_tree();
    let keys = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"];
    insert_all(&mut tree, &mut sink, &keys);

    // every key survives, in order, across however many splits happened
    let collected: Vec<&str> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(collected, keys.to_vec());
    tree.verify().unwrap();
}

// =============================================================================
// Delete and Rebalancing
// =============================================================================

#[test]
fn test_delete_missing_key_is_not_found() {
    let (mut tree, mut sink) = new_tree();
    insert_all(&mut tree, &mut sink, &["a"]);
    assert!(matches!(tree.delete("z"), Err(StoreError::NotFound(_))));
}

#[test]
fn test_delete_returns_the_value() {
    let (mut tree, mut sink) = new_tree();
    insert_all(&mut tree, &mut sink, &["a", "b"]);
    assert_eq!(tree.delete("a").unwrap(), "v-a");
    tree.flush(&mut sink).unwrap();
    assert_eq!(tree.search("a"), None);
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_underflow_borrows_from_a_richer_sibling() {
    let (mut tree, mut sink) = new_tree();
    // ["a","b"] | ["c","d","e"] after the split
    insert_all(&mut tree, &mut sink, &["a", "b", "c", "d", "e"]);

    // left leaf drops to one entry; the sibling can spare one
    tree.delete("a").unwrap();
    tree.flush(&mut sink).unwrap();

    assert_eq!(tree.leaf_count(), 2);
    let collected: Vec<&str> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(collected, vec!["b", "c", "d", "e"]);
    tree.verify().unwrap();
}

#[test]
fn test_underflow_merges_when_siblings_are_at_minimum() {
    let mut tree = BTree::new("idx", &small_config());
    let mut sink = RecordingSink::default();
    for key in ["a", "b", "c", "d", "e"] {
        tree.insert(key, &format!("v-{}", key)).unwrap();
        tree.flush(&mut sink).unwrap();
    }

    // ["a","b"] | ["c","d"] once "e" is gone; both leaves at minimum fill
    tree.delete("e").unwrap();
    tree.flush(&mut sink).unwrap();
    // left underflows, merge collapses the tree back to a root leaf
    tree.delete("a").unwrap();
    tree.flush(&mut sink).unwrap();

    assert_eq!(tree.height(), 0);
    let collected: Vec<&str> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(collected, vec!["b", "c", "d"]);
    tree.verify().unwrap();

    // the absorbed and collapsed pages are gone from the doc tree too
    assert!(sink.inner.get("idx/0").is_none());
    assert!(sink.inner.get("idx/1").is_none());
    assert_eq!(sink.inner.get("idx").unwrap().keys, vec!["b", "c", "d"]);

    let batch = sink.batches.last().unwrap();
    let removes = batch
        .iter()
        .filter(|op| matches!(op, JournalOp::Remove { .. }))
        .count();
    assert_eq!(removes, 2, "merged sibling and collapsed child removed");
}

#[test]
fn test_drain_the_whole_tree() {
    init_tracing();
    let (mut tree, mut sink) = new_tree();
    let keys: Vec<String> = (0..50).map(|i| format!("k{:02}", i)).collect();
    for key in &keys {
        tree.insert(key, "x").unwrap();
        tree.flush(&mut sink).unwrap();
    }

    // evens ascending, then odds descending: exercises both borrow
    // directions, merges, and the final root collapses
    let mut odds: Vec<&String> = keys.iter().skip(1).step_by(2).collect();
    odds.reverse();
    let order: Vec<&String> = keys.iter().step_by(2).chain(odds).collect();
    for key in order {
        tree.delete(key).unwrap();
        tree.flush(&mut sink).unwrap();
        tree.verify().unwrap();
    }

    assert_eq!(tree.len(), 0);
    assert_eq!(tree.height(), 0);
    assert!(tree.iter().next().is_none());
}

// =============================================================================
// Flush Failure
// =============================================================================

#[test]
fn test_failed_flush_discards_the_batch_and_marks_desync() {
    let mut tree = BTree::new("idx", &small_config());
    let mut failing = FailingSink;

    tree.insert("a", "1").unwrap();
    let err = tree.flush(&mut failing).unwrap_err();
    assert!(matches!(err, StoreError::Flush(_)));
    assert!(tree.is_desynced());
    assert!(tree.pending().is_empty(), "whole batch discarded, not retried");

    // the next successful flush clears the flag
    let mut sink = MemoryTreeStore::new();
    tree.insert("b", "2").unwrap();
    tree.flush(&mut sink).unwrap();
    assert!(!tree.is_desynced());
}
