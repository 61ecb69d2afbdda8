//! The store: one observed root value plus its notification channel.
//!
//! A store owns a single document, wires mutations to subscriber
//! notification, and exposes the transactional operation set built on the
//! change log and revert engine:
//!
//! - [`revertable`](Store::revertable) hands the action a recording handle
//!   and a revert closure; the caller decides whether to roll back.
//! - [`transaction`](Store::transaction) runs the action against the
//!   unwrapped root, notifies once on success, and reverts and re-raises on
//!   failure.
//! - [`revert_on_error`](Store::revert_on_error) reverts on failure and
//!   re-raises unless an error handler consumes the error.
//! - The `_global` variants capture mutations made through any handle of the
//!   store, not just the action's own handle.
//!
//! Asynchronous variants accept suspending actions; recording stays live
//! across `.await` points. Overlapping asynchronous sessions against one
//! store are serialized through a session gate, so their change logs never
//! interleave. Synchronous sessions nest on the call stack (LIFO) and take
//! no gate.

use crate::bus::{Bus, WatchHandle};
use crate::doc::DocCell;
use crate::session::{ListenerGuard, Revert, Route, SessionShared, SessionStore};
use crate::{Change, Op, Path, Previous, TransactionError, WatchiResult};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) type ChangeListener = Arc<dyn Fn(&Change) + Send + Sync>;

/// Store-level handler that consumes action errors when no explicit
/// `on_error` callback was supplied.
pub type DefaultErrorHandler = Arc<dyn Fn(&(dyn std::error::Error + 'static)) + Send + Sync>;

pub(crate) struct StoreInner {
    id: u64,
    channel: String,
    bus: Arc<Bus>,
    root: DocCell,
    // Global-capture listeners; empty outside active global sessions.
    listeners: Mutex<Vec<(u64, ChangeListener)>>,
    next_listener_id: AtomicU64,
    default_error_handler: Mutex<Option<DefaultErrorHandler>>,
    // Serializes asynchronous sessions; see module docs.
    session_gate: tokio::sync::Mutex<()>,
}

/// Owner of one observed root value and its notification channel.
///
/// Cloning a store is cheap and yields another handle to the same root;
/// constructed via [`Registry`](crate::Registry).
///
/// # Examples
///
/// ```
/// use watchi::{path, Op, Registry};
/// use serde_json::json;
///
/// let registry = Registry::new();
/// let store = registry.store(json!({"count": 0}));
///
/// store.apply(&Op::set(path!("count"), json!(1))).unwrap();
/// assert_eq!(store.value_at(&path!("count")), Some(json!(1)));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub(crate) fn new(id: u64, channel: String, bus: Arc<Bus>, initial: Value) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id,
                channel,
                bus,
                root: DocCell::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                default_error_handler: Mutex::new(None),
                session_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Process-unique id, monotonically increasing across all stores.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Notification channel this store publishes on.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    // ===== Mutation routes =====

    /// Apply an operation through the observed root: global listeners see
    /// the change and subscribers are notified.
    pub(crate) fn apply_observed(&self, op: &Op) -> WatchiResult<Change> {
        let change = self.inner.root.apply(op)?;

        let listeners: Vec<ChangeListener> = {
            let guard = self.inner.listeners.lock().unwrap();
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(&change);
        }

        self.inner.bus.notify(&self.inner.channel);
        Ok(change)
    }

    /// Apply an operation to the raw root: no listeners, no notification.
    pub(crate) fn apply_silent(&self, op: &Op) -> WatchiResult<Change> {
        self.inner.root.apply(op)
    }

    /// Restore a previous value at a path on the raw root (undo replay).
    pub(crate) fn restore(&self, path: &Path, previous: &Previous) -> WatchiResult<()> {
        self.inner.root.restore(path, previous)
    }

    /// Apply a mutation to the store.
    ///
    /// This is the observed route: the change feeds any active global
    /// session and all subscribers are notified before this returns.
    pub fn apply(&self, op: &Op) -> WatchiResult<()> {
        self.apply_observed(op).map(|_| ())
    }

    // ===== Root replacement =====

    /// Replace the root value wholesale and notify subscribers.
    ///
    /// The previous root is detached first, so stale holders of the old
    /// value can never feed notifications again.
    pub fn set(&self, value: Value) {
        self.replace_root(value);
        self.trigger();
    }

    /// Replace the root value wholesale without notifying.
    pub fn set_silent(&self, value: Value) {
        self.replace_root(value);
    }

    fn replace_root(&self, value: Value) {
        tracing::debug!(store = self.inner.id, "root replaced");
        let _orphaned = self.inner.root.replace(value);
    }

    // ===== Reads =====

    /// Snapshot of the raw, unobserved document. Pure lookup.
    pub fn target(&self) -> Value {
        self.inner.root.snapshot()
    }

    /// Clone the value at a path, if present.
    pub fn value_at(&self, path: &Path) -> Option<Value> {
        self.inner.root.value_at(path)
    }

    // ===== Notification =====

    /// Notify all current subscribers of this store, synchronously and with
    /// no payload. Subscribers re-read state themselves.
    pub fn trigger(&self) {
        self.inner.bus.notify(&self.inner.channel);
    }

    /// Register a callback for this store's change notifications.
    ///
    /// The returned handle's `unsubscribe` removes exactly this
    /// registration and is safe to call more than once. Notification order
    /// follows registration order but is not part of the contract.
    pub fn watch(&self, callback: impl Fn() + Send + Sync + 'static) -> WatchHandle {
        let id = self
            .inner
            .bus
            .subscribe(&self.inner.channel, Arc::new(callback));
        WatchHandle::new(Arc::clone(&self.inner.bus), self.inner.channel.clone(), id)
    }

    // ===== Global-capture listeners =====

    pub(crate) fn add_listener(&self, listener: ChangeListener) -> u64 {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().unwrap().push((id, listener));
        id
    }

    pub(crate) fn remove_listener(&self, id: u64) {
        let mut listeners = self.inner.listeners.lock().unwrap();
        if let Some(pos) = listeners.iter().position(|(l_id, _)| *l_id == id) {
            listeners.remove(pos);
        }
    }

    // ===== Default error handler =====

    /// Configure a store-level handler that consumes action errors from
    /// `revert_on_error` when no explicit `on_error` callback is given.
    pub fn set_default_error_handler(
        &self,
        handler: impl Fn(&(dyn std::error::Error + 'static)) + Send + Sync + 'static,
    ) {
        *self.inner.default_error_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Remove the store-level default error handler.
    pub fn clear_default_error_handler(&self) {
        *self.inner.default_error_handler.lock().unwrap() = None;
    }

    fn default_error_handler(&self) -> Option<DefaultErrorHandler> {
        self.inner.default_error_handler.lock().unwrap().clone()
    }

    // ===== Sessions =====

    fn open_session(
        &self,
        route: Route,
        global: bool,
    ) -> (SessionStore, Revert, Option<ListenerGuard>) {
        let shared = SessionShared::new();
        tracing::debug!(store = self.inner.id, ?route, global, "session opened");

        // A global session records through the store listener, so its own
        // handle must not also record locally: every handle mutation routes
        // through the observed root and would be captured twice.
        let guard = if global {
            let capture = Arc::clone(&shared);
            let id = self.add_listener(Arc::new(move |change: &Change| {
                capture.record(change.clone());
            }));
            Some(ListenerGuard::new(self.clone(), id))
        } else {
            None
        };

        let handle = SessionStore::new(self.clone(), Arc::clone(&shared), route, !global);
        let revert = Revert::new(self.clone(), shared);
        (handle, revert, guard)
    }

    /// Perform a revertable action on the store.
    ///
    /// The action receives a recording handle and a revert closure; nothing
    /// is reverted or notified automatically (mutations through the handle
    /// notify as they land, as any observed mutation does). Mutations made
    /// through other handles of the store are not recorded; use
    /// [`revertable_global`](Store::revertable_global) for that.
    pub fn revertable<T>(&self, action: impl FnOnce(&SessionStore, &Revert) -> T) -> T {
        let (handle, revert, _capture) = self.open_session(Route::Observed, false);
        action(&handle, &revert)
    }

    /// [`revertable`](Store::revertable) over global capture: mutations
    /// performed through *any* handle of this store during the action are
    /// recorded and revertible.
    pub fn revertable_global<T>(&self, action: impl FnOnce(&SessionStore, &Revert) -> T) -> T {
        let (handle, revert, _capture) = self.open_session(Route::Observed, true);
        action(&handle, &revert)
    }

    /// Run an action as a transaction: changes are observed only when it
    /// finishes successfully.
    ///
    /// The action mutates the unwrapped root, so no notifications fire
    /// while it runs. On success the store notifies once; on failure every
    /// recorded mutation is reverted and the action's error is re-raised as
    /// [`TransactionError::Aborted`].
    pub fn transaction<T, E>(
        &self,
        action: impl FnOnce(&SessionStore) -> Result<T, E>,
    ) -> Result<T, TransactionError<E>> {
        let (handle, revert, _capture) = self.open_session(Route::Silent, false);
        match action(&handle) {
            Ok(value) => {
                self.trigger();
                Ok(value)
            }
            Err(err) => {
                revert.revert()?;
                Err(TransactionError::Aborted(err))
            }
        }
    }

    /// Run a revertable action, rolling back if it fails.
    ///
    /// On failure the recorded mutations are reverted, then the error is
    /// re-raised — unless a store-level default error handler is
    /// configured, in which case the handler consumes the error and
    /// `Ok(None)` is returned.
    pub fn revert_on_error<T, E>(
        &self,
        action: impl FnOnce(&SessionStore) -> Result<T, E>,
    ) -> Result<Option<T>, TransactionError<E>>
    where
        E: std::error::Error + 'static,
    {
        let (handle, revert, _capture) = self.open_session(Route::Observed, false);
        self.finish_revert_on_error(action(&handle), &revert)
    }

    /// [`revert_on_error`](Store::revert_on_error) over global capture.
    pub fn revert_on_error_global<T, E>(
        &self,
        action: impl FnOnce(&SessionStore) -> Result<T, E>,
    ) -> Result<Option<T>, TransactionError<E>>
    where
        E: std::error::Error + 'static,
    {
        let (handle, revert, _capture) = self.open_session(Route::Observed, true);
        self.finish_revert_on_error(action(&handle), &revert)
    }

    /// Run a revertable action with an explicit error callback.
    ///
    /// On failure, `on_error` decides whether to revert (`true` reverts);
    /// the error is consumed either way and `Ok(None)` is returned.
    pub fn revert_on_error_with<T, E>(
        &self,
        action: impl FnOnce(&SessionStore) -> Result<T, E>,
        on_error: impl FnOnce(&E) -> bool,
    ) -> Result<Option<T>, crate::WatchiError> {
        let (handle, revert, _capture) = self.open_session(Route::Observed, false);
        self.finish_revert_on_error_with(action(&handle), &revert, on_error)
    }

    /// [`revert_on_error_with`](Store::revert_on_error_with) over global
    /// capture.
    pub fn revert_on_error_global_with<T, E>(
        &self,
        action: impl FnOnce(&SessionStore) -> Result<T, E>,
        on_error: impl FnOnce(&E) -> bool,
    ) -> Result<Option<T>, crate::WatchiError> {
        let (handle, revert, _capture) = self.open_session(Route::Observed, true);
        self.finish_revert_on_error_with(action(&handle), &revert, on_error)
    }

    fn finish_revert_on_error<T, E>(
        &self,
        outcome: Result<T, E>,
        revert: &Revert,
    ) -> Result<Option<T>, TransactionError<E>>
    where
        E: std::error::Error + 'static,
    {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                revert.revert()?;
                match self.default_error_handler() {
                    Some(handler) => {
                        handler(&err);
                        Ok(None)
                    }
                    None => Err(TransactionError::Aborted(err)),
                }
            }
        }
    }

    fn finish_revert_on_error_with<T, E>(
        &self,
        outcome: Result<T, E>,
        revert: &Revert,
        on_error: impl FnOnce(&E) -> bool,
    ) -> Result<Option<T>, crate::WatchiError> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                if on_error(&err) {
                    revert.revert()?;
                }
                Ok(None)
            }
        }
    }

    // ===== Asynchronous sessions =====

    /// Asynchronous [`transaction`](Store::transaction).
    ///
    /// Recording stays live across `.await` points; overlapping
    /// asynchronous sessions on this store queue behind the session gate.
    pub async fn transaction_async<T, E, F, Fut>(&self, action: F) -> Result<T, TransactionError<E>>
    where
        F: FnOnce(SessionStore) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _gate = self.inner.session_gate.lock().await;
        let (handle, revert, _capture) = self.open_session(Route::Silent, false);
        match action(handle).await {
            Ok(value) => {
                self.trigger();
                Ok(value)
            }
            Err(err) => {
                revert.revert()?;
                Err(TransactionError::Aborted(err))
            }
        }
    }

    /// Asynchronous [`revertable`](Store::revertable).
    pub async fn revertable_async<T, F, Fut>(&self, action: F) -> T
    where
        F: FnOnce(SessionStore, Revert) -> Fut,
        Fut: Future<Output = T>,
    {
        let _gate = self.inner.session_gate.lock().await;
        let (handle, revert, _capture) = self.open_session(Route::Observed, false);
        action(handle, revert).await
    }

    /// Asynchronous [`revertable_global`](Store::revertable_global).
    pub async fn revertable_global_async<T, F, Fut>(&self, action: F) -> T
    where
        F: FnOnce(SessionStore, Revert) -> Fut,
        Fut: Future<Output = T>,
    {
        let _gate = self.inner.session_gate.lock().await;
        let (handle, revert, _capture) = self.open_session(Route::Observed, true);
        action(handle, revert).await
    }

    /// Asynchronous [`revert_on_error`](Store::revert_on_error).
    pub async fn revert_on_error_async<T, E, F, Fut>(
        &self,
        action: F,
    ) -> Result<Option<T>, TransactionError<E>>
    where
        F: FnOnce(SessionStore) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let _gate = self.inner.session_gate.lock().await;
        let (handle, revert, _capture) = self.open_session(Route::Observed, false);
        let outcome = action(handle).await;
        self.finish_revert_on_error(outcome, &revert)
    }

    /// Asynchronous [`revert_on_error_global`](Store::revert_on_error_global).
    pub async fn revert_on_error_global_async<T, E, F, Fut>(
        &self,
        action: F,
    ) -> Result<Option<T>, TransactionError<E>>
    where
        F: FnOnce(SessionStore) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let _gate = self.inner.session_gate.lock().await;
        let (handle, revert, _capture) = self.open_session(Route::Observed, true);
        let outcome = action(handle).await;
        self.finish_revert_on_error(outcome, &revert)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("channel", &self.inner.channel)
            .finish()
    }
}
