//! B-Tree Index Module
//!
//! A B-tree whose pages live in a hierarchical document-tree namespace and
//! whose every structural mutation is buffered as a replayable journal op.
//!
//! ## Node Types
//!
//! - **Leaf pages**: parallel sorted `keys`/`values` arrays holding the
//!   indexed entries directly.
//! - **Internal pages**: separator keys plus child references; separator
//!   `keys[i]` is the smallest key reachable under child `i + 1`, so a page
//!   with `n` separators has `n + 1` children.
//!
//! ## Page Addressing
//!
//! Every page has a name (path segment) under its parent; the root page's
//! name is empty. Joining ancestor names yields the page's path inside the
//! tree, and prefixing the tree's own name yields the absolute path used in
//! journal entries. Fresh pages are named from a monotonically increasing
//! counter, never reused.
//!
//! ## Split and Fill Policy
//!
//! A page splits when it exceeds the configured maximum fan-out; the split
//! point is the midpoint of the overflowing array, chosen by the tree (the
//! page itself is a pure mechanical participant). Leaf splits copy the
//! sibling's first key up as the separator; internal splits promote the
//! median. Non-root pages below the minimum fill factor borrow from a richer
//! adjacent sibling or merge with one; only a single-child root collapses,
//! so the tree stays height-balanced and shrinks only at the root.
//!
//! ## Journal Protocol
//!
//! Mutations mark pages dirty (idempotently); splits and merges buffer
//! Create/Remove/Move records immediately. `flush` turns the dirty set into
//! Rewrite records, deduplicated against the buffered ops, and submits the
//! whole batch as one atomic diff.

mod page;
mod tree;

pub use page::{Page, PageContent, PageId};
pub use tree::{BTree, RangeIter};
