// ── Observer fan-out ──
//
// Observers are plain callbacks. They run on the connection's driver task,
// in registration order, outside the lock, so an observer may subscribe or
// unsubscribe from inside its own callback.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crate::model::HubEvent;

pub type Observer = Arc<dyn Fn(&HubEvent) + Send + Sync>;

#[derive(Default)]
struct Inner {
    next_id: u64,
    observers: BTreeMap<u64, Observer>,
}

/// Shared set of observers for one connection.
#[derive(Clone, Default)]
pub struct ObserverSet {
    inner: Arc<Mutex<Inner>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`; it stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(&self, observer: Observer) -> Subscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.insert(id, observer);
        Subscription {
            id,
            set: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every observer registered right now.
    pub fn notify(&self, event: &HubEvent) {
        let observers: Vec<Observer> = lock(&self.inner).observers.values().cloned().collect();
        tracing::trace!(kind = event.kind(), observers = observers.len(), "notifying observers");
        for observer in observers {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(inner: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    // A panicking observer never runs under the lock, so poisoning only
    // means a panic elsewhere; the map itself is still consistent.
    inner
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    set: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Remove the observer now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the observer registered for the lifetime of the connection.
    pub fn detach(mut self) {
        self.set = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.set.upgrade() {
            lock(&inner).observers.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Observer) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer: Observer = Arc::new(move |_: &HubEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, observer)
    }

    #[test]
    fn every_observer_sees_every_event() {
        let set = ObserverSet::new();
        let (a, obs_a) = counter();
        let (b, obs_b) = counter();
        let _sub_a = set.subscribe(obs_a);
        let _sub_b = set.subscribe(obs_b);

        set.notify(&HubEvent::Connected);
        set.notify(&HubEvent::Disconnected);
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_and_drop_remove() {
        let set = ObserverSet::new();
        let (a, obs_a) = counter();
        let (b, obs_b) = counter();
        let sub_a = set.subscribe(obs_a);
        let sub_b = set.subscribe(obs_b);
        assert_eq!(set.len(), 2);

        sub_a.unsubscribe();
        drop(sub_b);
        assert!(set.is_empty());

        set.notify(&HubEvent::Connected);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detached_subscription_stays() {
        let set = ObserverSet::new();
        let (a, obs_a) = counter();
        set.subscribe(obs_a).detach();
        set.notify(&HubEvent::Connected);
        assert_eq!(a.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observer_may_subscribe_during_notify() {
        let set = ObserverSet::new();
        let inner_set = set.clone();
        let _sub = set.subscribe(Arc::new(move |_: &HubEvent| {
            inner_set.subscribe(Arc::new(|_: &HubEvent| {})).detach();
        }));
        set.notify(&HubEvent::Connected);
        assert_eq!(set.len(), 2);
    }
}
