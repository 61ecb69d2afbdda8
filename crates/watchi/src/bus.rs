//! Subscription and notification dispatch.
//!
//! One [`Bus`] is shared by all stores of a registry. Each store publishes on
//! its own channel, so cross-store notifications never collide. Notification
//! is synchronous fire-and-forget with no payload: subscribers re-read store
//! state themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Shared dispatch surface keyed by channel name.
#[derive(Default)]
pub(crate) struct Bus {
    channels: Mutex<HashMap<String, Vec<(u64, Callback)>>>,
    next_id: AtomicU64,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback on a channel; returns its subscription id.
    pub fn subscribe(&self, channel: &str, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_owned())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove exactly one registration. Returns whether it was present.
    pub fn unsubscribe(&self, channel: &str, id: u64) -> bool {
        let mut channels = self.channels.lock().unwrap();
        if let Some(subs) = channels.get_mut(channel) {
            if let Some(pos) = subs.iter().position(|(sub_id, _)| *sub_id == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    /// Run all callbacks registered on a channel, in registration order,
    /// before returning.
    ///
    /// The subscriber list is cloned out of the lock first, so callbacks may
    /// themselves subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, channel: &str) {
        let callbacks: Vec<Callback> = {
            let channels = self.channels.lock().unwrap();
            match channels.get(channel) {
                Some(subs) => subs.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return,
            }
        };

        tracing::trace!(channel, subscribers = callbacks.len(), "notify");
        for cb in callbacks {
            cb();
        }
    }

    /// Number of live registrations on a channel.
    #[cfg(test)]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(channel)
            .map_or(0, |subs| subs.len())
    }
}

/// Handle to one `watch` registration.
///
/// [`unsubscribe`](WatchHandle::unsubscribe) removes exactly this
/// registration and is safe to call more than once. Dropping the handle does
/// **not** unsubscribe; a subscription outlives a discarded handle.
pub struct WatchHandle {
    bus: Arc<Bus>,
    channel: String,
    id: u64,
    active: AtomicBool,
}

impl WatchHandle {
    pub(crate) fn new(bus: Arc<Bus>, channel: String, id: u64) -> Self {
        Self {
            bus,
            channel,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Remove this registration. No-op after the first call.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.bus.unsubscribe(&self.channel, self.id);
        }
    }

    /// Whether this registration is still live.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_runs_in_registration_order() {
        let bus = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe("ch", Arc::new(move || order.lock().unwrap().push(tag)));
        }

        bus.notify("ch");
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_channels_do_not_collide() {
        let bus = Bus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        bus.subscribe("a", Arc::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        bus.notify("b");
        assert_eq!(count.load(Ordering::Relaxed), 0);

        bus.notify("a");
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unsubscribe_removes_one_registration() {
        let bus = Bus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let id1 = bus.subscribe("ch", Arc::new(move || {
            c1.fetch_add(1, Ordering::Relaxed);
        }));
        let c2 = Arc::clone(&count);
        bus.subscribe("ch", Arc::new(move || {
            c2.fetch_add(1, Ordering::Relaxed);
        }));

        assert!(bus.unsubscribe("ch", id1));
        assert!(!bus.unsubscribe("ch", id1));

        bus.notify("ch");
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_watch_handle_unsubscribe_is_idempotent() {
        let bus = Arc::new(Bus::new());
        let id = bus.subscribe("ch", Arc::new(|| {}));
        let handle = WatchHandle::new(Arc::clone(&bus), "ch".into(), id);

        assert!(handle.is_active());
        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        assert_eq!(bus.subscriber_count("ch"), 0);
    }

    #[test]
    fn test_dropping_handle_keeps_subscription() {
        let bus = Arc::new(Bus::new());
        let id = bus.subscribe("ch", Arc::new(|| {}));
        drop(WatchHandle::new(Arc::clone(&bus), "ch".into(), id));
        assert_eq!(bus.subscriber_count("ch"), 1);
    }
}
