//! Event bus for inbound hook events
//!
//! Each subscribable hook kind gets its own bus. Dispatch works on a snapshot
//! of the subscriber list, so callbacks may subscribe or unsubscribe without
//! affecting the dispatch in progress.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifies one registered callback on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered list of callbacks for one event type
pub struct EventBus<T> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback; it runs after every callback registered before it
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Invoke every callback once, in registration order
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, event: &T) -> usize {
        // Lock is released before any callback runs
        let snapshot: Vec<Callback<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in &snapshot {
            callback(event);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispatch_in_registration_order() {
        let bus = EventBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.subscribe(move |value: &u32| seen.lock().push(format!("{}{}", tag, value)));
        }

        assert_eq!(bus.dispatch(&1), 3);
        assert_eq!(*seen.lock(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.dispatch(&());
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.dispatch(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_subscribe_during_dispatch_applies_to_next_dispatch() {
        let bus = Arc::new(EventBus::<()>::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let inner_calls = late_calls.clone();
        bus.subscribe(move |_| {
            let calls = inner_calls.clone();
            inner_bus.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        });

        // Adds a late subscriber but must not call it
        assert_eq!(bus.dispatch(&()), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.len(), 2);

        // Second dispatch calls the first late subscriber and adds another
        assert_eq!(bus.dispatch(&()), 2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_applies_to_next_dispatch() {
        let bus = Arc::new(EventBus::<()>::new());
        let second_calls = Arc::new(AtomicUsize::new(0));
        let second_id = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let target = second_id.clone();
        bus.subscribe(move |_| {
            if let Some(id) = *target.lock() {
                inner_bus.unsubscribe(id);
            }
        });
        let calls = second_calls.clone();
        *second_id.lock() = Some(bus.subscribe(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));

        // Snapshot still includes the second subscriber
        bus.dispatch(&());
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);

        bus.dispatch(&());
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }
}
