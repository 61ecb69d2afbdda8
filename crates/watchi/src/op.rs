//! Mutation operations on an observed document.
//!
//! Callers mutate a store by applying operations instead of raw property
//! writes; each operation is intercepted by the change observer, which
//! records the previous state at the target path before the write lands.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A numeric amount for increment/decrement operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
}

impl Number {
    /// Convert to f64.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v as i64)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// A single mutation of the observed document.
///
/// Each operation targets a path and performs one write. The observer
/// reports every applied operation as a [`Change`](crate::Change) carrying
/// the target path and the previous value at that path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Assign a value at the path, creating intermediate objects as needed.
    Set {
        /// Target path.
        path: Path,
        /// Value to assign.
        value: Value,
    },

    /// Remove the value at the path. No-op if the path does not exist.
    Delete {
        /// Target path.
        path: Path,
    },

    /// Push a value onto the array at the path, creating it if absent.
    Append {
        /// Target path (must be an array or non-existent).
        path: Path,
        /// Value to push.
        value: Value,
    },

    /// Insert a value at an index of the array at the path, shifting
    /// later elements right.
    Insert {
        /// Target path (must be an array).
        path: Path,
        /// Index to insert at.
        index: usize,
        /// Value to insert.
        value: Value,
    },

    /// Remove the first occurrence of a value from the array at the path.
    /// No-op if the value is not present.
    Remove {
        /// Target path (must be an array).
        path: Path,
        /// Value to remove.
        value: Value,
    },

    /// Replace the entire contents of the array at the path in place.
    ///
    /// With an empty path this is the whole-root structural change: the
    /// root array keeps its identity while its elements are swapped out.
    Splice {
        /// Target path (must be an array).
        path: Path,
        /// Replacement elements.
        items: Vec<Value>,
    },

    /// Add an amount to the number at the path.
    Increment {
        /// Target path (must be a number).
        path: Path,
        /// Amount to add.
        amount: Number,
    },

    /// Subtract an amount from the number at the path.
    Decrement {
        /// Target path (must be a number).
        path: Path,
        /// Amount to subtract.
        amount: Number,
    },
}

impl Op {
    /// Create a Set operation.
    #[inline]
    pub fn set(path: Path, value: impl Into<Value>) -> Self {
        Op::Set {
            path,
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    #[inline]
    pub fn delete(path: Path) -> Self {
        Op::Delete { path }
    }

    /// Create an Append operation.
    #[inline]
    pub fn append(path: Path, value: impl Into<Value>) -> Self {
        Op::Append {
            path,
            value: value.into(),
        }
    }

    /// Create an Insert operation.
    #[inline]
    pub fn insert(path: Path, index: usize, value: impl Into<Value>) -> Self {
        Op::Insert {
            path,
            index,
            value: value.into(),
        }
    }

    /// Create a Remove operation.
    #[inline]
    pub fn remove(path: Path, value: impl Into<Value>) -> Self {
        Op::Remove {
            path,
            value: value.into(),
        }
    }

    /// Create a Splice operation.
    #[inline]
    pub fn splice(path: Path, items: Vec<Value>) -> Self {
        Op::Splice { path, items }
    }

    /// Create an Increment operation.
    #[inline]
    pub fn increment(path: Path, amount: impl Into<Number>) -> Self {
        Op::Increment {
            path,
            amount: amount.into(),
        }
    }

    /// Create a Decrement operation.
    #[inline]
    pub fn decrement(path: Path, amount: impl Into<Number>) -> Self {
        Op::Decrement {
            path,
            amount: amount.into(),
        }
    }

    /// Get the path this operation targets.
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Op::Set { path, .. } => path,
            Op::Delete { path } => path,
            Op::Append { path, .. } => path,
            Op::Insert { path, .. } => path,
            Op::Remove { path, .. } => path,
            Op::Splice { path, .. } => path,
            Op::Increment { path, .. } => path,
            Op::Decrement { path, .. } => path,
        }
    }

    /// Get the operation name.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Op::Set { .. } => "set",
            Op::Delete { .. } => "delete",
            Op::Append { .. } => "append",
            Op::Insert { .. } => "insert",
            Op::Remove { .. } => "remove",
            Op::Splice { .. } => "splice",
            Op::Increment { .. } => "increment",
            Op::Decrement { .. } => "decrement",
        }
    }
}
