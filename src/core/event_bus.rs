//! Pub/Sub event bus with scoped subscriptions.
//!
//! Architecture:
//! - Every viewport owns one bus; listeners subscribe per event type
//! - emit() invokes callbacks immediately, in subscription order (FIFO)
//! - subscribe() returns a `Subscription`; releasing it (explicitly or on drop)
//!   removes exactly that callback, exactly once
//!
//! Callbacks run with no bus lock held: a callback may subscribe, release or
//! emit on the same bus. Propagation echoes rely on this.
//!
//! A callback released while an emit is in flight is not invoked afterwards,
//! even if that emit already snapshotted it.

use log::trace;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

// Blanket impl for all qualifying types
impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Type-erased callback
type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// One registered callback plus its liveness flag.
struct Listener {
    id: u64,
    active: AtomicBool,
    callback: Callback,
}

type SubscriberMap = HashMap<TypeId, Vec<Arc<Listener>>>;

struct BusInner {
    subscribers: RwLock<SubscriberMap>,
    next_id: AtomicU64,
}

/// Per-viewport event bus.
///
/// Cloning shares the same subscriber table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscriber_types",
                &self.inner.subscribers.read().map(|s| s.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to events of type E.
    ///
    /// The callback stays registered for as long as the returned
    /// `Subscription` is alive.
    ///
    /// # Example
    /// ```ignore
    /// let sub = viewport.events().subscribe::<CameraModifiedEvent, _>(move |e| {
    ///     println!("camera changed on {}", e.viewport);
    /// });
    /// // ...
    /// sub.release();
    /// ```
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<E, F>(&self, callback: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<E>();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        let listener = Arc::new(Listener {
            id,
            active: AtomicBool::new(true),
            callback: wrapped,
        });
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(type_id)
            .or_default()
            .push(listener);

        let event = std::any::type_name::<E>();
        trace!("EventBus: +{} #{}", event, id);
        Subscription {
            bus: Arc::downgrade(&self.inner),
            type_id,
            id,
            event,
            released: false,
        }
    }

    /// Emit event: invoke all live callbacks for its type.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit<E: Event>(&self, event: E) -> usize {
        let type_id = TypeId::of::<E>();

        // Snapshot, then call without the lock
        let listeners: Vec<Arc<Listener>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
            .map(|list| list.to_vec())
            .unwrap_or_default();

        let mut invoked = 0;
        for listener in &listeners {
            if listener.active.load(Ordering::Acquire) {
                (listener.callback)(event.as_any());
                invoked += 1;
            }
        }
        invoked
    }

    /// Drop every subscriber. Outstanding `Subscription`s become inert.
    pub fn clear(&self) {
        let removed: SubscriberMap = std::mem::take(
            &mut *self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner()),
        );
        for listener in removed.values().flatten() {
            listener.active.store(false, Ordering::Release);
        }
    }

    /// Check if there are subscribers for event type E
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscriber_count::<E>() > 0
    }

    /// Number of live subscribers for event type E
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

/// Release handle for one subscribed callback.
///
/// Released exactly once: by [`release`](Self::release) or on drop,
/// whichever comes first. Releasing after the bus is gone is a no-op.
pub struct Subscription {
    bus: Weak<BusInner>,
    type_id: TypeId,
    id: u64,
    event: &'static str,
    released: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("released", &self.released)
            .finish()
    }
}

impl Subscription {
    /// Unsubscribe now.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// True while the callback is still registered on a live bus.
    pub fn is_active(&self) -> bool {
        if self.released {
            return false;
        }
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let subscribers = bus.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers
            .get(&self.type_id)
            .is_some_and(|list| list.iter().any(|l| l.id == self.id))
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let Some(bus) = self.bus.upgrade() else {
            return;
        };

        // Removed listeners are dropped after the lock is gone
        let removed: Vec<Arc<Listener>> = {
            let mut subscribers = bus.subscribers.write().unwrap_or_else(|e| e.into_inner());
            let Some(list) = subscribers.get_mut(&self.type_id) else {
                return;
            };
            let (gone, kept): (Vec<_>, Vec<_>) =
                list.drain(..).partition(|l| l.id == self.id);
            *list = kept;
            if list.is_empty() {
                subscribers.remove(&self.type_id);
            }
            gone
        };
        for listener in &removed {
            listener.active.store(false, Ordering::Release);
        }
        if !removed.is_empty() {
            trace!("EventBus: -{} #{}", self.event, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicI32;

    #[derive(Clone, Debug)]
    struct TestEvent {
        value: i32,
    }

    #[derive(Clone, Debug)]
    struct OtherEvent;

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);

        let _sub = bus.subscribe::<TestEvent, _>(move |e| {
            c.fetch_add(e.value, Ordering::SeqCst);
        });

        assert_eq!(bus.emit(TestEvent { value: 10 }), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 10);

        bus.emit(TestEvent { value: 5 });
        assert_eq!(counter.load(Ordering::SeqCst), 15);

        // Other event types don't reach this callback
        assert_eq!(bus.emit(OtherEvent), 0);
    }

    #[test]
    fn test_multiple_subscribers_fifo() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let _s1 = bus.subscribe::<TestEvent, _>(move |_| o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        let _s2 = bus.subscribe::<TestEvent, _>(move |_| o2.lock().unwrap().push(2));

        bus.emit(TestEvent { value: 0 });
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert_eq!(bus.subscriber_count::<TestEvent>(), 2);
    }

    #[test]
    fn test_release_and_drop_unsubscribe() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));

        let c = Arc::clone(&counter);
        let sub = bus.subscribe::<TestEvent, _>(move |e| {
            c.fetch_add(e.value, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.release();
        bus.emit(TestEvent { value: 10 });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!bus.has_subscribers::<TestEvent>());

        {
            let c = Arc::clone(&counter);
            let _scoped = bus.subscribe::<TestEvent, _>(move |e| {
                c.fetch_add(e.value, Ordering::SeqCst);
            });
            bus.emit(TestEvent { value: 1 });
        }
        bus.emit(TestEvent { value: 1 });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_only_removes_own_callback() {
        let bus = EventBus::new();
        let s1 = bus.subscribe::<TestEvent, _>(|_| {});
        let s2 = bus.subscribe::<TestEvent, _>(|_| {});
        s1.release();
        assert_eq!(bus.subscriber_count::<TestEvent>(), 1);
        assert!(s2.is_active());
    }

    #[test]
    fn test_release_after_bus_dropped() {
        let bus = EventBus::new();
        let sub = bus.subscribe::<TestEvent, _>(|_| {});
        drop(bus);
        assert!(!sub.is_active());
        sub.release();
    }

    #[test]
    fn test_callback_can_release_sibling_mid_emit() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let s = Arc::clone(&slot);
        let _first = bus.subscribe::<TestEvent, _>(move |_| {
            if let Some(sub) = s.lock().unwrap().take() {
                sub.release();
            }
        });
        let c = Arc::clone(&counter);
        let second = bus.subscribe::<TestEvent, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        *slot.lock().unwrap() = Some(second);

        // First callback releases the second before it runs
        assert_eq!(bus.emit(TestEvent { value: 0 }), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_can_emit_reentrantly() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let inner_bus = bus.clone();
        let _relay = bus.subscribe::<TestEvent, _>(move |e| {
            if e.value > 0 {
                inner_bus.emit(TestEvent { value: e.value - 1 });
            }
        });
        let c = Arc::clone(&counter);
        let _count = bus.subscribe::<TestEvent, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(TestEvent { value: 2 });
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_clear_makes_subscriptions_inert() {
        let bus = EventBus::new();
        let sub = bus.subscribe::<TestEvent, _>(|_| {});
        bus.clear();
        assert!(!sub.is_active());
        assert_eq!(bus.emit(TestEvent { value: 1 }), 0);
        drop(sub);
    }
}
