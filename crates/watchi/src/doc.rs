//! Shared mutable document for write-through state access.
//!
//! `DocCell` wraps a `Mutex<Value>` so that operations applied through a
//! store or session immediately update the document and subsequent reads see
//! the latest values. Undo replay goes through [`DocCell::restore`], which
//! bypasses observation entirely: replaying through the observed route would
//! re-trigger recording and corrupt the change log.

use crate::apply::{apply_op, apply_previous, get_at_path};
use crate::{Change, Op, Path, Previous, WatchiResult};
use serde_json::Value;
use std::sync::Mutex;

/// Shared mutable document cell.
pub(crate) struct DocCell(Mutex<Value>);

impl DocCell {
    /// Create a new `DocCell` with the given initial value.
    pub fn new(value: Value) -> Self {
        Self(Mutex::new(value))
    }

    /// Apply an operation in place and report it as a [`Change`].
    ///
    /// A poisoned lock panics, as it does for every accessor here: nothing
    /// inside the lock can fail partway, so poison means a bug in this
    /// crate, not a recoverable document state.
    pub fn apply(&self, op: &Op) -> WatchiResult<Change> {
        let mut guard = self.0.lock().unwrap();
        apply_op(&mut guard, op)
    }

    /// Restore a recorded previous value at a path (undo direction).
    ///
    /// Operates on the raw document; no observation fires.
    pub fn restore(&self, path: &Path, previous: &Previous) -> WatchiResult<()> {
        let mut guard = self.0.lock().unwrap();
        apply_previous(&mut guard, path, previous)
    }

    /// Replace the whole document, returning the orphaned previous root.
    ///
    /// The old root is handed back by value, so nothing can mutate it in a
    /// way the store would observe.
    pub fn replace(&self, value: Value) -> Value {
        let mut guard = self.0.lock().unwrap();
        std::mem::replace(&mut guard, value)
    }

    /// Clone the current document value.
    pub fn snapshot(&self) -> Value {
        self.0.lock().unwrap().clone()
    }

    /// Clone the value at a path, if present.
    pub fn value_at(&self, path: &Path) -> Option<Value> {
        let guard = self.0.lock().unwrap();
        get_at_path(&guard, path).cloned()
    }
}

impl std::fmt::Debug for DocCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DocCell").field(&"<Value>").finish()
    }
}
