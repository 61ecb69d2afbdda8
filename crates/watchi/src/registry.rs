//! Store construction and registration bookkeeping.
//!
//! A `Registry` owns the notification bus and the set of registered store
//! names. It is an explicit object rather than module-global state, so tests
//! can construct isolated registries and let them drop.

use crate::bus::Bus;
use crate::store::Store;
use crate::{WatchiError, WatchiResult};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Store ids are unique and monotonically increasing across the whole
/// process, independent of which registry allocated them.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_store_id() -> u64 {
    NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)
}

struct RegistryInner {
    bus: Arc<Bus>,
    // Uppercased names; lookup is case-insensitive.
    names: Mutex<HashSet<String>>,
}

/// Owner of a notification bus and the store names registered on it.
///
/// # Examples
///
/// ```
/// use watchi::Registry;
/// use serde_json::json;
///
/// let registry = Registry::new();
/// let store = registry.store(json!({"count": 0}));
/// assert_eq!(store.target(), json!({"count": 0}));
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create an empty registry with its own bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                bus: Arc::new(Bus::new()),
                names: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Create a store keyed by its auto-assigned id.
    ///
    /// Ids never collide, so this construction cannot fail.
    pub fn store(&self, initial: Value) -> Store {
        let id = next_store_id();
        let channel = format!("STORE_{id}_WATCHI_UPDATE");
        tracing::debug!(id, channel = %channel, "store created");
        Store::new(id, channel, Arc::clone(&self.inner.bus), initial)
    }

    /// Create a store with a process-unique name.
    ///
    /// Names are compared case-insensitively; a collision fails construction
    /// with [`WatchiError::DuplicateStoreName`].
    pub fn named_store(&self, initial: Value, name: &str) -> WatchiResult<Store> {
        let upper = name.to_uppercase();
        {
            let mut names = self.inner.names.lock().unwrap();
            if !names.insert(upper.clone()) {
                return Err(WatchiError::duplicate_store_name(name));
            }
        }

        let id = next_store_id();
        let channel = format!("{upper}_WATCHI_UPDATE");
        tracing::debug!(id, channel = %channel, "named store created");
        Ok(Store::new(id, channel, Arc::clone(&self.inner.bus), initial))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.inner.names.lock().unwrap();
        f.debug_struct("Registry")
            .field("stores", &names.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_monotonic() {
        let registry = Registry::new();
        let a = registry.store(json!({}));
        let b = registry.store(json!({}));
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_duplicate_name_rejected_case_insensitive() {
        let registry = Registry::new();
        registry.named_store(json!({}), "App").unwrap();

        let err = registry.named_store(json!({}), "APP").unwrap_err();
        assert!(matches!(err, WatchiError::DuplicateStoreName { .. }));
    }

    #[test]
    fn test_separate_registries_do_not_share_names() {
        let a = Registry::new();
        let b = Registry::new();
        a.named_store(json!({}), "app").unwrap();
        b.named_store(json!({}), "app").unwrap();
    }
}
