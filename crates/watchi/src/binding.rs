//! View bindings: derived values that follow a store.
//!
//! A binding subscribes to a store once and re-evaluates a selector on every
//! notification. [`ValueBinding`] asks its [`RenderHost`] to re-render when
//! the derived value changes per its [`UpdatePolicy`]; [`RefBinding`] keeps a
//! cell current without ever requesting a render, for side-channel reads.
//!
//! The live selector and policy sit behind a shared slot, so
//! [`set_select`](ValueBinding::set_select) swaps them without resubscribing
//! and in-flight notifications always see the latest selector. Dropping a
//! binding unsubscribes it.

use crate::bus::WatchHandle;
use crate::store::Store;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Host-framework capability consumed by [`ValueBinding`]: schedule a
/// re-render of whatever view reads the binding.
pub trait RenderHost: Send + Sync {
    fn request_render(&self);
}

/// Derives a binding's value from the store document.
pub type Selector<T> = Arc<dyn Fn(&Value) -> T + Send + Sync>;

/// Decides whether a newly derived value replaces the current one (and, for
/// [`ValueBinding`], whether a render is requested).
pub enum UpdatePolicy<T> {
    /// Every notification updates and renders.
    Always,
    /// Update only when the predicate, given `(current, next)`, returns true.
    If(Arc<dyn Fn(&T, &T) -> bool + Send + Sync>),
}

impl<T> UpdatePolicy<T> {
    /// Update when the derived value compares unequal to the current one.
    pub fn value_changed() -> Self
    where
        T: PartialEq + Send + Sync + 'static,
    {
        Self::If(Arc::new(|current, next| current != next))
    }

    fn should_update(&self, current: &T, next: &T) -> bool {
        match self {
            Self::Always => true,
            Self::If(predicate) => predicate(current, next),
        }
    }
}

impl<T> Clone for UpdatePolicy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Always => Self::Always,
            Self::If(predicate) => Self::If(Arc::clone(predicate)),
        }
    }
}

impl<T> std::fmt::Debug for UpdatePolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::If(_) => f.write_str("If(..)"),
        }
    }
}

/// The slot shared between a binding and its notification callback.
///
/// Callbacks registered at subscription time read the selector and policy
/// through this slot, so swapping either never leaves a notification running
/// against a stale closure.
struct BindingState<T> {
    select: Mutex<Selector<T>>,
    policy: Mutex<UpdatePolicy<T>>,
    current: Mutex<T>,
}

impl<T> BindingState<T> {
    fn refresh(&self, store: &Store) -> bool {
        let snapshot = store.target();
        let next = {
            let select = self.select.lock().unwrap();
            select(&snapshot)
        };
        let mut current = self.current.lock().unwrap();
        let update = self.policy.lock().unwrap().should_update(&current, &next);
        if update {
            *current = next;
        }
        update
    }
}

/// A derived value that follows a store and requests re-renders.
///
/// # Examples
///
/// ```
/// use watchi::{path, Op, Registry, UpdatePolicy, ValueBinding};
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// struct NoopHost;
/// impl watchi::RenderHost for NoopHost {
///     fn request_render(&self) {}
/// }
///
/// let store = Registry::new().store(json!({"count": 1}));
/// let binding = ValueBinding::new(
///     &store,
///     Arc::new(NoopHost),
///     Arc::new(|doc: &Value| doc["count"].as_i64().unwrap_or(0)),
///     UpdatePolicy::value_changed(),
/// );
///
/// store.apply(&Op::set(path!("count"), json!(2))).unwrap();
/// assert_eq!(binding.get(), 2);
/// ```
pub struct ValueBinding<T> {
    store: Store,
    state: Arc<BindingState<T>>,
    handle: WatchHandle,
}

impl<T: Send + Sync + 'static> ValueBinding<T> {
    /// Derive the initial value and subscribe to the store.
    pub fn new(
        store: &Store,
        host: Arc<dyn RenderHost>,
        select: Selector<T>,
        policy: UpdatePolicy<T>,
    ) -> Self {
        let initial = select(&store.target());
        let state = Arc::new(BindingState {
            select: Mutex::new(select),
            policy: Mutex::new(policy),
            current: Mutex::new(initial),
        });

        let watch_store = store.clone();
        let watch_state = Arc::clone(&state);
        let handle = store.watch(move || {
            if watch_state.refresh(&watch_store) {
                host.request_render();
            }
        });

        Self {
            store: store.clone(),
            state,
            handle,
        }
    }

    /// Clone the current derived value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.state.current.lock().unwrap().clone()
    }

    /// Swap the selector without resubscribing and re-derive immediately.
    ///
    /// The policy still decides whether the re-derived value is published.
    pub fn set_select(&self, select: Selector<T>) {
        *self.state.select.lock().unwrap() = select;
        self.state.refresh(&self.store);
    }

    /// Swap the update policy without resubscribing.
    pub fn set_policy(&self, policy: UpdatePolicy<T>) {
        *self.state.policy.lock().unwrap() = policy;
    }

    /// Whether the binding is still subscribed.
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

impl<T> Drop for ValueBinding<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

impl<T> std::fmt::Debug for ValueBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueBinding")
            .field("store", &self.store.id())
            .field("active", &self.handle.is_active())
            .finish()
    }
}

/// A derived cell that follows a store without requesting renders.
pub struct RefBinding<T> {
    store: Store,
    state: Arc<BindingState<T>>,
    handle: WatchHandle,
}

impl<T: Send + Sync + 'static> RefBinding<T> {
    /// Derive the initial value and subscribe to the store.
    ///
    /// Every notification re-derives unconditionally; there is no render to
    /// suppress, so no policy applies.
    pub fn new(store: &Store, select: Selector<T>) -> Self {
        let initial = select(&store.target());
        let state = Arc::new(BindingState {
            select: Mutex::new(select),
            policy: Mutex::new(UpdatePolicy::Always),
            current: Mutex::new(initial),
        });

        let watch_store = store.clone();
        let watch_state = Arc::clone(&state);
        let handle = store.watch(move || {
            watch_state.refresh(&watch_store);
        });

        Self {
            store: store.clone(),
            state,
            handle,
        }
    }

    /// Clone the current derived value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.state.current.lock().unwrap().clone()
    }

    /// Swap the selector without resubscribing and re-derive immediately.
    pub fn set_select(&self, select: Selector<T>) {
        *self.state.select.lock().unwrap() = select;
        self.state.refresh(&self.store);
    }

    /// Whether the binding is still subscribed.
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

impl<T> Drop for RefBinding<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

impl<T> std::fmt::Debug for RefBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefBinding")
            .field("store", &self.store.id())
            .field("active", &self.handle.is_active())
            .finish()
    }
}
