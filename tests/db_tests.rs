//! End-to-end tests for the Db orchestrator
//!
//! These tests verify:
//! - Index operations through the single-writer surface
//! - Commit flow: records first, head last
//! - Parent chaining across revisions
//! - Structural sharing: unchanged trees re-commit to the same root
//! - Durable operation over the file backend

use revstore::{Config, Db, StoreError, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn small_db() -> Db<revstore::MemoryBackend> {
    let config = Config::builder().max_page_entries(4).build().unwrap();
    Db::in_memory(config).unwrap()
}

// =============================================================================
// Index Surface
// =============================================================================

#[test]
fn test_insert_get_delete() {
    let db = small_db();
    db.insert("user:1", "ada").unwrap();
    db.insert("user:2", "grace").unwrap();

    assert_eq!(db.get("user:1"), Some("ada".to_string()));
    assert_eq!(db.get("user:3"), None);
    assert_eq!(db.len(), 2);

    assert_eq!(db.delete("user:1").unwrap(), "ada");
    assert_eq!(db.get("user:1"), None);
    assert!(matches!(db.delete("user:1"), Err(StoreError::NotFound(_))));
}

#[test]
fn test_duplicate_policy_is_explicit() {
    let db = small_db();
    db.insert("k", "v1").unwrap();
    assert!(matches!(
        db.insert("k", "v2"),
        Err(StoreError::DuplicateKey(_))
    ));
    assert_eq!(db.put("k", "v2").unwrap(), Some("v1".to_string()));
    assert_eq!(db.get("k"), Some("v2".to_string()));
}

#[test]
fn test_range_over_split_pages() {
    let db = small_db();
    for key in ["a", "b", "c", "d", "e", "f", "g", "h"] {
        db.insert(key, &format!("v-{}", key)).unwrap();
    }
    db.verify().unwrap();

    let hits = db.range(Some("c"), Some("g"));
    let keys: Vec<&str> = hits.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["c", "d", "e", "f"]);
}

#[test]
fn test_mutations_reach_the_document_tree() {
    let db = small_db();
    for key in ["a", "b", "c", "d", "e"] {
        db.insert(key, "x").unwrap();
    }
    // after the split: a root node plus two leaves
    db.with_doctree(|tree| {
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get("index").unwrap().keys, vec!["c"]);
    });
}

// =============================================================================
// Revisions
// =============================================================================

#[test]
fn test_head_is_none_before_first_commit() {
    let db = small_db();
    assert_eq!(db.head().unwrap(), None);
}

#[test]
fn test_commit_advances_head_and_is_readable() {
    let db = small_db();
    db.insert("a", "1").unwrap();

    let id = db.commit("first").unwrap();
    assert_eq!(db.head().unwrap(), Some(id));

    let commit = db.store().read_commit(&id).unwrap();
    assert_eq!(commit.parent, None);
    assert_eq!(commit.message, "first");

    // the root node the commit references is itself readable
    let root_id = revstore::Id::from_hex(&commit.root).unwrap();
    let root = db.store().read_node(&root_id).unwrap();
    assert!(root.child_map.is_some());
}

#[test]
fn test_commits_chain_through_parent_ids() {
    let db = small_db();
    db.insert("a", "1").unwrap();
    let first = db.commit("first").unwrap();

    db.insert("b", "2").unwrap();
    let second = db.commit("second").unwrap();

    assert_ne!(first, second);
    let commit = db.store().read_commit(&second).unwrap();
    assert_eq!(commit.parent, Some(first.to_hex()));
}

#[test]
fn test_unchanged_tree_recommits_to_the_same_root() {
    let db = small_db();
    db.insert("a", "1").unwrap();

    let first = db.commit("first").unwrap();
    let second = db.commit("second").unwrap();

    let c1 = db.store().read_commit(&first).unwrap();
    let c2 = db.store().read_commit(&second).unwrap();
    // node records deduplicated: both revisions share the same root id
    assert_eq!(c1.root, c2.root);
}

#[test]
fn test_commit_then_resolve_a_page_through_records() {
    let db = small_db();
    for key in ["a", "b", "c", "d", "e"] {
        db.insert(key, &format!("v-{}", key)).unwrap();
    }
    let id = db.commit("split state").unwrap();

    // walk head -> commit -> root -> "index" child
    let commit = db.store().read_commit(&id).unwrap();
    let root_id = revstore::Id::from_hex(&commit.root).unwrap();
    let root = db.store().read_node(&root_id).unwrap();
    let map_id = revstore::Id::from_hex(&root.child_map.unwrap()).unwrap();
    let children = db.store().read_child_map(&map_id).unwrap();
    assert!(children.entries.contains_key("index"));

    let index_id = revstore::Id::from_hex(&children.entries["index"]).unwrap();
    let index = db.store().read_node(&index_id).unwrap();
    assert_eq!(index.properties["keys"], r#"["c"]"#);
    assert_eq!(index.properties["values"], r#"["0","1"]"#);
}

// =============================================================================
// Durable Backend
// =============================================================================

#[test]
fn test_file_backed_db_persists_revisions() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .sync(SyncStrategy::EveryWrite)
        .max_page_entries(4)
        .build()
        .unwrap();

    let id = {
        let db = Db::open(config.clone()).unwrap();
        db.insert("a", "1").unwrap();
        db.insert("b", "2").unwrap();
        db.commit("durable").unwrap()
    };

    // a fresh instance sees the committed revision through the store
    let db = Db::open(config).unwrap();
    assert_eq!(db.head().unwrap(), Some(id));
    let commit = db.store().read_commit(&id).unwrap();
    assert_eq!(commit.message, "durable");
}
