//! In-process publish/subscribe event bus
//!
//! Features never import one another directly: producers emit named
//! events and consumers subscribe by name. The bus owns the subscriber
//! table; pods create subscriptions and the loader bulk-destroys them
//! with [`EventBus::unsubscribe_all`] at unload.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::error::BusError;
use crate::event::{PodEvent, SubscriptionId};

/// Handler invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&PodEvent) + Send + Sync>;

/// Default per-handler timeout for the async dispatch path.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// One live subscription in the table.
#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    owner: String,
    handler: EventHandler,
}

/// Process-wide publish/subscribe dispatcher.
///
/// Subscribers to the same event name are invoked in subscription order
/// within one emission; ordering across distinct emissions is
/// unspecified. A throwing handler never breaks another: each handler
/// runs under panic isolation and failures are logged, not propagated.
pub struct EventBus {
    /// Subscriber table, keyed by event name. The only shared state.
    subscribers: RwLock<HashMap<String, Vec<Subscription>>>,
    /// Per-handler timeout applied by [`EventBus::emit`]
    handler_timeout: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default handler timeout
    pub fn new() -> Self {
        Self::with_handler_timeout(DEFAULT_HANDLER_TIMEOUT)
    }

    /// Create a bus with an explicit per-handler timeout for async dispatch
    pub fn with_handler_timeout(handler_timeout: Duration) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            handler_timeout,
        }
    }

    /// Subscribe `handler` to `event_name` on behalf of `owner`.
    ///
    /// The handler sees only events emitted after this call returns
    /// (no replay). The returned id can be passed to
    /// [`EventBus::unsubscribe`]; all of an owner's subscriptions go away
    /// together via [`EventBus::unsubscribe_all`].
    pub fn subscribe<F>(
        &self,
        event_name: &str,
        owner: &str,
        handler: F,
    ) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&PodEvent) + Send + Sync + 'static,
    {
        if event_name.is_empty() {
            return Err(BusError::EmptyEventName);
        }

        let id = Uuid::new_v4();
        let subscription = Subscription {
            id,
            owner: owner.to_string(),
            handler: Arc::new(handler),
        };

        let mut table = self.subscribers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        table
            .entry(event_name.to_string())
            .or_default()
            .push(subscription);

        tracing::debug!(event = %event_name, owner = %owner, subscription = %id, "Subscribed");
        Ok(id)
    }

    /// Remove a single subscription. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.subscribers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut found = false;
        for subs in table.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            if subs.len() != before {
                found = true;
            }
        }
        table.retain(|_, subs| !subs.is_empty());
        found
    }

    /// Remove every subscription owned by `owner`. Returns the number removed.
    ///
    /// Called by the loader at pod shutdown/unload so no dangling handler
    /// from an unloaded feature remains callable.
    pub fn unsubscribe_all(&self, owner: &str) -> usize {
        let mut table = self.subscribers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut removed = 0;
        for subs in table.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.owner != owner);
            removed += before - subs.len();
        }
        table.retain(|_, subs| !subs.is_empty());
        if removed > 0 {
            tracing::debug!(owner = %owner, removed, "Unsubscribed all");
        }
        removed
    }

    /// Invoke all current subscribers of `event_name` synchronously, in
    /// subscription order.
    ///
    /// A panicking handler is caught and logged (subscription id, event,
    /// source) and dispatch continues with the remaining handlers.
    /// Emitting to zero subscribers is a no-op, not an error. Returns the
    /// number of handlers invoked.
    pub fn emit_sync(&self, event_name: &str, payload: Value, source: &str) -> usize {
        let event = PodEvent::new(event_name, payload, source);
        let snapshot = self.snapshot(event_name);

        let mut invoked = 0;
        for sub in snapshot {
            invoked += 1;
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(&event)));
            if result.is_err() {
                tracing::error!(
                    subscription = %sub.id,
                    owner = %sub.owner,
                    event = %event_name,
                    source = %source,
                    "Event handler panicked"
                );
            }
        }
        invoked
    }

    /// Schedule each subscriber of `event_name` as an independent task.
    ///
    /// Resolves once every handler has completed or individually exceeded
    /// the bus handler timeout. Timed-out handlers are abandoned, not
    /// cancelled; isolation is per-task, so a panicking or slow handler
    /// never affects another. Returns the number of handlers scheduled.
    pub async fn emit(&self, event_name: &str, payload: Value, source: &str) -> usize {
        let event = PodEvent::new(event_name, payload, source);
        let snapshot = self.snapshot(event_name);
        let scheduled = snapshot.len();

        let mut handles = Vec::with_capacity(scheduled);
        for sub in snapshot {
            let event = event.clone();
            let handler = Arc::clone(&sub.handler);
            let handle = tokio::task::spawn_blocking(move || handler(&event));
            handles.push((sub.id, sub.owner, handle));
        }

        for (id, owner, handle) in handles {
            match tokio::time::timeout(self.handler_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) if join_err.is_panic() => {
                    tracing::error!(
                        subscription = %id,
                        owner = %owner,
                        event = %event_name,
                        source = %source,
                        "Event handler panicked"
                    );
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::error!(
                        subscription = %id,
                        owner = %owner,
                        event = %event_name,
                        timeout = ?self.handler_timeout,
                        "Event handler timed out"
                    );
                }
            }
        }
        scheduled
    }

    /// Number of subscribers currently registered for `event_name`
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(event_name)
            .map_or(0, Vec::len)
    }

    /// Total number of live subscriptions across all event names
    pub fn subscription_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Clone the current subscriber list for one event, releasing the
    /// lock before any handler runs.
    fn snapshot(&self, event_name: &str) -> Vec<Subscription> {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_requires_event_name() {
        let bus = EventBus::new();
        let result = bus.subscribe("", "owner", |_| {});
        assert!(matches!(result, Err(BusError::EmptyEventName)));
    }

    #[test]
    fn test_emit_sync_invokes_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe("tick", "owner", move |_| {
                order.lock().unwrap().push(tag);
            })
            .unwrap();
        }

        let invoked = bus.emit_sync("tick", json!({}), "test");
        assert_eq!(invoked, 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_emit_sync_zero_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.emit_sync("nobody.listens", json!(null), "test"), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_break_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        bus.subscribe("boom", "a", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        bus.subscribe("boom", "b", |_| panic!("handler failure"))
            .unwrap();
        let h = Arc::clone(&hits);
        bus.subscribe("boom", "c", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let invoked = bus.emit_sync("boom", json!({}), "test");
        assert_eq!(invoked, 3);
        // first and third each fired exactly once
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_receives_payload_and_source() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(None));

        let s = Arc::clone(&seen);
        bus.subscribe("loot.dropped", "inventory-system", move |event| {
            *s.lock().unwrap() = Some((event.payload.clone(), event.source.clone()));
        })
        .unwrap();

        bus.emit_sync("loot.dropped", json!({"item": "flask"}), "combat-system");

        let seen = seen.lock().unwrap();
        let (payload, source) = seen.as_ref().unwrap();
        assert_eq!(payload["item"], "flask");
        assert_eq!(source, "combat-system");
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let bus = EventBus::new();
        bus.emit_sync("early", json!({}), "test");

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe("early", "late-owner", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.emit_sync("early", json!({}), "test");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_single() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let id = bus
            .subscribe("tick", "owner", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.emit_sync("tick", json!({}), "test");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_all_silences_owner() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for event in ["a", "b", "c"] {
            let h = Arc::clone(&hits);
            bus.subscribe(event, "doomed", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        let h = Arc::clone(&hits);
        bus.subscribe("a", "survivor", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(bus.unsubscribe_all("doomed"), 3);

        bus.emit_sync("a", json!({}), "test");
        bus.emit_sync("b", json!({}), "test");
        bus.emit_sync("c", json!({}), "test");

        // only the survivor's handler fired
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscription_count(), 1);
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count("tick"), 0);
        bus.subscribe("tick", "a", |_| {}).unwrap();
        bus.subscribe("tick", "b", |_| {}).unwrap();
        bus.subscribe("tock", "a", |_| {}).unwrap();
        assert_eq!(bus.subscriber_count("tick"), 2);
        assert_eq!(bus.subscription_count(), 3);
    }

    #[tokio::test]
    async fn test_emit_async_runs_all_handlers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for owner in ["a", "b", "c"] {
            let h = Arc::clone(&hits);
            bus.subscribe("tick", owner, move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let scheduled = bus.emit("tick", json!({}), "test").await;
        assert_eq!(scheduled, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_emit_async_times_out_slow_handler() {
        let bus = EventBus::with_handler_timeout(Duration::from_millis(20));
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe("tick", "slow", |_| {
            std::thread::sleep(Duration::from_millis(500));
        })
        .unwrap();
        let h = Arc::clone(&hits);
        bus.subscribe("tick", "fast", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // resolves despite the slow handler, and the fast one still ran
        let scheduled = bus.emit("tick", json!({}), "test").await;
        assert_eq!(scheduled, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_async_isolates_panics() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe("tick", "bad", |_| panic!("handler failure"))
            .unwrap();
        let h = Arc::clone(&hits);
        bus.subscribe("tick", "good", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        bus.emit("tick", json!({}), "test").await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
