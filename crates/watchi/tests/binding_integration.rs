//! View-binding integration: derived values, render suppression, tear-down.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use watchi::{path, Op, Registry, RefBinding, RenderHost, Selector, UpdatePolicy, ValueBinding};

struct CountingHost(AtomicUsize);

impl CountingHost {
    fn new() -> Arc<Self> {
        Arc::new(Self(AtomicUsize::new(0)))
    }

    fn renders(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

impl RenderHost for CountingHost {
    fn request_render(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

fn name_selector() -> Selector<String> {
    Arc::new(|doc: &Value| doc["user"]["name"].as_str().unwrap_or_default().to_owned())
}

// ============================================================================
// Re-render suppression
// ============================================================================

#[test]
fn test_unchanged_derived_value_suppresses_render() {
    let store = Registry::new().store(json!({
        "user": {"name": "Alice"},
        "unrelated": 0
    }));
    let host = CountingHost::new();
    let binding = ValueBinding::new(
        &store,
        host.clone(),
        name_selector(),
        UpdatePolicy::value_changed(),
    );

    // Mutations that leave the derived value identical request no render.
    store.apply(&Op::set(path!("unrelated"), json!(1))).unwrap();
    store.apply(&Op::set(path!("unrelated"), json!(2))).unwrap();
    assert_eq!(host.renders(), 0);

    store
        .apply(&Op::set(path!("user", "name"), json!("Bob")))
        .unwrap();
    assert_eq!(host.renders(), 1);
    assert_eq!(binding.get(), "Bob");
}

#[test]
fn test_always_policy_renders_regardless() {
    let store = Registry::new().store(json!({"user": {"name": "Alice"}, "unrelated": 0}));
    let host = CountingHost::new();
    let _binding = ValueBinding::new(&store, host.clone(), name_selector(), UpdatePolicy::Always);

    store.apply(&Op::set(path!("unrelated"), json!(1))).unwrap();
    assert_eq!(host.renders(), 1);
}

#[test]
fn test_custom_predicate_policy() {
    let store = Registry::new().store(json!({"count": 0}));
    let host = CountingHost::new();
    let _binding = ValueBinding::new(
        &store,
        host.clone(),
        Arc::new(|doc: &Value| doc["count"].as_i64().unwrap_or(0)),
        // Only even values are worth a render.
        UpdatePolicy::If(Arc::new(|_current, next| next % 2 == 0)),
    );

    store.apply(&Op::set(path!("count"), json!(1))).unwrap();
    assert_eq!(host.renders(), 0);

    store.apply(&Op::set(path!("count"), json!(2))).unwrap();
    assert_eq!(host.renders(), 1);
}

// ============================================================================
// Selector replacement without resubscribing
// ============================================================================

#[test]
fn test_set_select_keeps_single_subscription() {
    let store = Registry::new().store(json!({"a": 1, "b": 2}));
    let host = CountingHost::new();
    let binding = ValueBinding::new(
        &store,
        host.clone(),
        Arc::new(|doc: &Value| doc["a"].as_i64().unwrap_or(0)),
        UpdatePolicy::value_changed(),
    );

    binding.set_select(Arc::new(|doc: &Value| doc["b"].as_i64().unwrap_or(0)));
    assert_eq!(binding.get(), 2);

    // One notification, one render: the old selector no longer runs.
    store.apply(&Op::set(path!("b"), json!(3))).unwrap();
    assert_eq!(binding.get(), 3);
    assert_eq!(host.renders(), 1);
}

// ============================================================================
// Tear-down
// ============================================================================

#[test]
fn test_dropped_binding_stops_following() {
    let store = Registry::new().store(json!({"count": 0}));
    let host = CountingHost::new();
    let binding = ValueBinding::new(
        &store,
        host.clone(),
        Arc::new(|doc: &Value| doc["count"].as_i64().unwrap_or(0)),
        UpdatePolicy::value_changed(),
    );
    assert!(binding.is_active());
    drop(binding);

    store.apply(&Op::set(path!("count"), json!(5))).unwrap();
    assert_eq!(host.renders(), 0);
}

// ============================================================================
// RefBinding
// ============================================================================

#[test]
fn test_ref_binding_stays_current_without_renders() {
    let store = Registry::new().store(json!({"session": {"token": "t0"}}));
    let binding = RefBinding::new(
        &store,
        Arc::new(|doc: &Value| {
            doc["session"]["token"]
                .as_str()
                .unwrap_or_default()
                .to_owned()
        }),
    );
    assert_eq!(binding.get(), "t0");

    store
        .apply(&Op::set(path!("session", "token"), json!("t1")))
        .unwrap();
    assert_eq!(binding.get(), "t1");
}

#[test]
fn test_ref_binding_drop_unsubscribes() {
    let store = Registry::new().store(json!({"v": 0}));
    let binding = RefBinding::new(&store, Arc::new(|doc: &Value| doc["v"].clone()));
    assert!(binding.is_active());
    drop(binding);

    // No way to observe a dangling callback directly; a fresh binding still
    // sees a consistent document.
    store.apply(&Op::set(path!("v"), json!(1))).unwrap();
    let fresh = RefBinding::new(&store, Arc::new(|doc: &Value| doc["v"].clone()));
    assert_eq!(fresh.get(), json!(1));
}

// ============================================================================
// Bindings during sessions
// ============================================================================

#[test]
fn test_binding_sees_committed_transaction_once() {
    let store = Registry::new().store(json!({"count": 0}));
    let host = CountingHost::new();
    let binding = ValueBinding::new(
        &store,
        host.clone(),
        Arc::new(|doc: &Value| doc["count"].as_i64().unwrap_or(0)),
        UpdatePolicy::value_changed(),
    );

    let result: Result<(), watchi::TransactionError<watchi::WatchiError>> =
        store.transaction(|s| {
            s.set(path!("count"), json!(1))?;
            s.set(path!("count"), json!(2))?;
            Ok(())
        });
    assert!(result.is_ok());

    assert_eq!(binding.get(), 2);
    assert_eq!(host.renders(), 1);
}

#[test]
fn test_binding_unaffected_by_aborted_transaction() {
    let store = Registry::new().store(json!({"count": 0}));
    let host = CountingHost::new();
    let binding = ValueBinding::new(
        &store,
        host.clone(),
        Arc::new(|doc: &Value| doc["count"].as_i64().unwrap_or(0)),
        UpdatePolicy::value_changed(),
    );

    let _ = store.transaction(|s| {
        s.set(path!("count"), json!(9)).unwrap();
        Err::<(), _>(std::io::Error::other("boom"))
    });

    assert_eq!(binding.get(), 0);
    assert_eq!(host.renders(), 0);
}
