//! Scoped recording sessions with revert.
//!
//! A session wraps a store with a fresh recording subscription: every
//! mutation applied through the session handle appends an undo entry to a
//! private change log. [`Revert::revert`] replays the log in strict LIFO
//! order against the raw document and closes the session, so a session is
//! single-use: once reverted, nothing further is recorded.
//!
//! Global sessions record through the store's listener list instead, so
//! mutations performed by *other* code paths against the same store are
//! captured too. Listener registration is symmetric on every exit path: the
//! guard removes the listener on drop even when the action fails early.

use crate::store::Store;
use crate::{Change, ChangeLog, Number, Op, Path, WatchiResult};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Which mutation route a session's handle uses.
///
/// `Observed` is the live root: every mutation feeds global listeners and
/// notifies subscribers as it lands. `Silent` is the unwrapped root used by
/// transactions: nothing is observed until the transaction commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    Observed,
    Silent,
}

/// State shared between a session's handle, its revert closure, and (for
/// global sessions) its store listener.
pub(crate) struct SessionShared {
    log: Mutex<ChangeLog>,
    closed: AtomicBool,
}

impl SessionShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(ChangeLog::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Append an undo entry unless the session has been closed.
    pub(crate) fn record(&self, change: Change) {
        if !self.closed.load(Ordering::Acquire) {
            self.log.lock().unwrap().push(change);
        }
    }
}

/// Removes a global-capture listener from the store when dropped.
pub(crate) struct ListenerGuard {
    store: Store,
    id: u64,
}

impl ListenerGuard {
    pub(crate) fn new(store: Store, id: u64) -> Self {
        Self { store, id }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.store.remove_listener(self.id);
    }
}

/// The store handle passed to a session's action.
///
/// Mutations applied through this handle are recorded in the session's
/// change log (directly, or via the store listener for global sessions) and
/// can be undone through the paired [`Revert`].
#[derive(Clone)]
pub struct SessionStore {
    store: Store,
    shared: Arc<SessionShared>,
    route: Route,
    record_local: bool,
}

impl SessionStore {
    pub(crate) fn new(
        store: Store,
        shared: Arc<SessionShared>,
        route: Route,
        record_local: bool,
    ) -> Self {
        Self {
            store,
            shared,
            route,
            record_local,
        }
    }

    /// Apply one operation through this session.
    pub fn apply(&self, op: &Op) -> WatchiResult<()> {
        let change = match self.route {
            Route::Observed => self.store.apply_observed(op)?,
            Route::Silent => self.store.apply_silent(op)?,
        };
        if self.record_local {
            self.shared.record(change);
        }
        Ok(())
    }

    /// Assign a value at a path.
    pub fn set(&self, path: Path, value: impl Into<Value>) -> WatchiResult<()> {
        self.apply(&Op::set(path, value))
    }

    /// Remove the value at a path.
    pub fn delete(&self, path: Path) -> WatchiResult<()> {
        self.apply(&Op::delete(path))
    }

    /// Push a value onto the array at a path.
    pub fn append(&self, path: Path, value: impl Into<Value>) -> WatchiResult<()> {
        self.apply(&Op::append(path, value))
    }

    /// Insert a value at an index of the array at a path.
    pub fn insert(&self, path: Path, index: usize, value: impl Into<Value>) -> WatchiResult<()> {
        self.apply(&Op::insert(path, index, value))
    }

    /// Remove the first occurrence of a value from the array at a path.
    pub fn remove(&self, path: Path, value: impl Into<Value>) -> WatchiResult<()> {
        self.apply(&Op::remove(path, value))
    }

    /// Replace the entire contents of the array at a path in place.
    pub fn splice(&self, path: Path, items: Vec<Value>) -> WatchiResult<()> {
        self.apply(&Op::splice(path, items))
    }

    /// Add an amount to the number at a path.
    pub fn increment(&self, path: Path, amount: impl Into<Number>) -> WatchiResult<()> {
        self.apply(&Op::increment(path, amount))
    }

    /// Subtract an amount from the number at a path.
    pub fn decrement(&self, path: Path, amount: impl Into<Number>) -> WatchiResult<()> {
        self.apply(&Op::decrement(path, amount))
    }

    /// Clone the value at a path, if present.
    pub fn value_at(&self, path: &Path) -> Option<Value> {
        self.store.value_at(path)
    }

    /// Clone the whole document.
    pub fn snapshot(&self) -> Value {
        self.store.target()
    }

    /// The underlying store.
    ///
    /// In a global session, mutations made through the store itself are
    /// captured by the session; in a direct session they are not.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("store", &self.store.id())
            .field("route", &self.route)
            .finish()
    }
}

/// Replays a session's change log to restore prior state.
#[derive(Clone)]
pub struct Revert {
    store: Store,
    shared: Arc<SessionShared>,
}

impl Revert {
    pub(crate) fn new(store: Store, shared: Arc<SessionShared>) -> Self {
        Self { store, shared }
    }

    /// Restore every recorded mutation, most recent first.
    ///
    /// Closes the session: recording stops and the log is drained, so a
    /// second call is a no-op. Replay applies each entry to the raw
    /// document, never back through the observed route. A replay failure
    /// propagates and leaves the log partially drained; that session's
    /// state is unrecoverable.
    pub fn revert(&self) -> WatchiResult<()> {
        self.shared.closed.store(true, Ordering::Release);

        let mut log = self.shared.log.lock().unwrap();
        tracing::debug!(
            store = self.store.id(),
            entries = log.len(),
            "reverting recorded changes"
        );
        while let Some(change) = log.pop() {
            self.store.restore(&change.path, &change.previous)?;
        }
        Ok(())
    }

    /// Number of undo entries currently recorded.
    pub fn recorded(&self) -> usize {
        self.shared.log.lock().unwrap().len()
    }
}

impl std::fmt::Debug for Revert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revert")
            .field("store", &self.store.id())
            .field("recorded", &self.recorded())
            .finish()
    }
}
