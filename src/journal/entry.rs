//! Journal operation records
//!
//! Defines the tagged mutation records buffered by the index and their
//! textual diff encoding.

use serde::{Deserialize, Serialize};

/// A single buffered mutation against the document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Create a node with `keys`/`values` array properties.
    /// Fails at the sink if the path already exists.
    Create {
        path: String,
        keys: Vec<String>,
        values: Vec<String>,
    },

    /// Rewrite both array properties of a node.
    /// Upsert semantics: the node is created if absent, which is what lets
    /// a root split address the shrunk original page at its new path.
    Rewrite {
        path: String,
        keys: Vec<String>,
        values: Vec<String>,
    },

    /// Remove a node (merges, root collapse)
    Remove { path: String },

    /// Relocate a node and its subtree (internal-node splits and merges)
    Move { from: String, to: String },
}

impl JournalOp {
    /// The path this op writes to, if it targets a single node's arrays
    pub fn target(&self) -> Option<&str> {
        match self {
            JournalOp::Create { path, .. } | JournalOp::Rewrite { path, .. } => Some(path),
            JournalOp::Remove { .. } | JournalOp::Move { .. } => None,
        }
    }

    /// Encode this op as one diff line (without trailing newline)
    pub fn encode(&self) -> String {
        match self {
            JournalOp::Create { path, keys, values } => {
                format!(
                    "+{}:{{\"keys\":{},\"values\":{}}}",
                    quote(path),
                    array(keys),
                    array(values)
                )
            }
            JournalOp::Rewrite { path, keys, values } => {
                format!(
                    "^{}:{{\"keys\":{},\"values\":{}}}",
                    quote(path),
                    array(keys),
                    array(values)
                )
            }
            JournalOp::Remove { path } => format!("-{}", quote(path)),
            JournalOp::Move { from, to } => format!(">{}:{}", quote(from), quote(to)),
        }
    }
}

/// Join two path segments, treating the empty string as "no segment"
pub fn join_path(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{}/{}", a, b)
    }
}

/// Quote a string with JSON-style escaping
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Encode a string array as `["a","b"]`
pub(crate) fn array(items: &[String]) -> String {
    let mut out = String::from("[");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote(item));
    }
    out.push(']');
    out
}
