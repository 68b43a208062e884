//! Journal Module
//!
//! Buffered operation log for structural index mutations.
//!
//! ## Responsibilities
//! - Buffer every page mutation as a tagged, replayable record
//! - Flush one atomic batch per logical tree operation
//! - Encode batches into the line-delimited diff format
//!
//! ## Diff Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ +"idx/1":{"keys":["c","d"],"values":["3","4"]}           │  create node
//! │ ^"idx/0":{"keys":["a","b"],"values":["1","2"]}           │  rewrite arrays
//! │ -"idx/2"                                                 │  remove node
//! │ >"idx/3/5":"idx/4/5"                                     │  move subtree
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Paths are absolute: the owning tree's name joined with the page's
//! relative path. One line per operation, string payloads JSON-escaped.

mod entry;
mod log;

pub(crate) use entry::array;
pub use entry::{join_path, JournalOp};
pub use log::OperationLog;

use crate::error::Result;

/// Consumer of journal batches: the document-tree side of the diff boundary.
///
/// `apply` receives the whole buffered batch for one logical tree operation
/// and must apply it atomically: either every op becomes visible or the
/// error propagates and the tree treats the batch as failed.
pub trait DiffSink {
    fn apply(&mut self, ops: &[JournalOp]) -> Result<()>;
}
