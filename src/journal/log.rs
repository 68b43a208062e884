//! Operation log buffer
//!
//! Accumulates journal ops for one logical tree operation and hands them
//! off as a single batch at flush time. The buffer is append-only while a
//! transaction is open and is always cleared as a whole.

use super::JournalOp;

/// In-memory buffer of pending journal operations
#[derive(Debug, Default)]
pub struct OperationLog {
    ops: Vec<JournalOp>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an op to the pending batch
    pub fn push(&mut self, op: JournalOp) {
        self.ops.push(op);
    }

    /// The pending batch, in buffer order
    pub fn ops(&self) -> &[JournalOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether a buffered Create/Rewrite already targets `path`
    pub fn touches(&self, path: &str) -> bool {
        self.ops.iter().any(|op| op.target() == Some(path))
    }

    /// Update the arrays of the latest buffered op targeting `path`.
    ///
    /// Returns false when no such op exists, in which case the caller
    /// appends a fresh Rewrite instead. Keeps a page that was both split
    /// and mutated again before the flush down to one journal entry.
    pub fn refresh(&mut self, path: &str, keys: &[String], values: &[String]) -> bool {
        for op in self.ops.iter_mut().rev() {
            match op {
                JournalOp::Create {
                    path: p,
                    keys: k,
                    values: v,
                }
                | JournalOp::Rewrite {
                    path: p,
                    keys: k,
                    values: v,
                } if p.as_str() == path => {
                    *k = keys.to_vec();
                    *v = values.to_vec();
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Take the whole pending batch, leaving the buffer empty
    pub fn take(&mut self) -> Vec<JournalOp> {
        std::mem::take(&mut self.ops)
    }

    /// Encode the pending batch as a newline-delimited diff
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            out.push_str(&op.encode());
            out.push('\n');
        }
        out
    }
}
