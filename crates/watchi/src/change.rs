//! Change records and the undo log.
//!
//! Every applied operation is reported as a [`Change`]: the target path plus
//! the state at that path from before the write. A [`ChangeLog`] collects
//! changes in mutation order; replaying it in reverse restores prior state.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The state at a path before a mutation.
///
/// `Absent` distinguishes "the key did not exist" from "the key held null",
/// so reverting a freshly created property removes it instead of leaving a
/// null behind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Previous {
    /// The path held this value.
    Existing(Value),
    /// The path did not exist.
    Absent,
}

impl Previous {
    /// Get the previous value if the path existed.
    #[inline]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Previous::Existing(v) => Some(v),
            Previous::Absent => None,
        }
    }
}

impl From<Option<Value>> for Previous {
    fn from(v: Option<Value>) -> Self {
        match v {
            Some(v) => Previous::Existing(v),
            None => Previous::Absent,
        }
    }
}

/// One observed mutation: the path it landed on and what was there before.
///
/// For element-level array operations (append, insert, remove, splice) the
/// path addresses the array and `previous` holds the whole prior array, so a
/// single replay restores element count and order. A write that creates
/// structure records the shallowest created segment instead of the leaf, so
/// a single replay removes the whole created subtree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Path the mutation targeted. Empty exactly when the mutation was a
    /// whole-root structural change.
    pub path: Path,
    /// State at the path before the mutation.
    pub previous: Previous,
}

impl Change {
    /// Create a change record.
    #[inline]
    pub fn new(path: Path, previous: Previous) -> Self {
        Self { path, previous }
    }
}

/// Append-ordered log of changes recorded during a session.
///
/// Append order is mutation order. Replay order is always the logical
/// reverse of record order: replaying out of order can resurrect an
/// already-superseded value.
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    entries: Vec<Change>,
}

impl ChangeLog {
    /// Create an empty log.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change in mutation order.
    #[inline]
    pub fn push(&mut self, change: Change) {
        self.entries.push(change);
    }

    /// Pop the most recent change (replay order).
    #[inline]
    pub fn pop(&mut self) -> Option<Change> {
        self.entries.pop()
    }

    /// Number of recorded changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// View the recorded changes in append order.
    #[inline]
    pub fn as_slice(&self) -> &[Change] {
        &self.entries
    }
}
