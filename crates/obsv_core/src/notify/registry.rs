//! Observer registration and fan-out.

use crate::types::SubscriptionId;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// A registered observer callback.
pub type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A handle to an observer registration.
///
/// Dropping the handle cancels the registration. Use [`Subscription::detach`]
/// to keep the observer registered for the lifetime of its source.
#[must_use = "dropping a Subscription unsubscribes its observer"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` when unsubscribed.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Combines several subscriptions into one that cancels all of them.
    pub fn combine(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || drop(subscriptions))
    }

    /// Cancels the registration now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keeps the observer registered without holding the handle.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    /// Returns true if dropping this handle would cancel something.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

struct RegistryInner<E> {
    observers: RwLock<Vec<(SubscriptionId, Observer<E>)>>,
}

/// A registry of observers for one event type.
///
/// Dispatch works on a snapshot of the registered observers, so an observer
/// may subscribe or unsubscribe (itself or others) while being notified.
pub struct ObserverRegistry<E> {
    inner: Arc<RegistryInner<E>>,
}

impl<E: 'static> ObserverRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Registers an observer.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId::generate();
        self.inner.observers.write().push((id, Arc::new(observer)));

        let weak: Weak<RegistryInner<E>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.write().retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    /// Delivers an event to every registered observer.
    ///
    /// Returns the number of observers notified.
    pub fn emit(&self, event: &E) -> usize {
        let observers: Vec<Observer<E>> = self
            .inner
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in &observers {
            observer(event);
        }
        observers.len()
    }

    /// Returns the number of registered observers.
    pub fn len(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Returns true if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.observers.read().is_empty()
    }
}

impl<E: 'static> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ObserverRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.inner.observers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_every_observer() {
        let registry = ObserverRegistry::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&total);
        let _s1 = registry.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = Arc::clone(&total);
        let _s2 = registry.subscribe(move |v| {
            t2.fetch_add(*v as usize * 10, Ordering::SeqCst);
        });

        assert_eq!(registry.emit(&2), 2);
        assert_eq!(total.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn drop_unsubscribes() {
        let registry = ObserverRegistry::<()>::new();
        let sub = registry.subscribe(|_| {});
        assert_eq!(registry.len(), 1);

        drop(sub);
        assert!(registry.is_empty());
        assert_eq!(registry.emit(&()), 0);
    }

    #[test]
    fn unsubscribe_leaves_others() {
        let registry = ObserverRegistry::<()>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&seen);
        let keep = registry.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let gone = registry.subscribe(|_| panic!("should have been removed"));

        gone.unsubscribe();
        registry.emit(&());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(keep.is_active());
    }

    #[test]
    fn detach_keeps_registration() {
        let registry = ObserverRegistry::<()>::new();
        registry.subscribe(|_| {}).detach();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn observer_can_unsubscribe_during_dispatch() {
        let registry = Arc::new(ObserverRegistry::<()>::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot_clone = Arc::clone(&slot);
        let sub = registry.subscribe(move |_| {
            slot_clone.lock().take();
        });
        *slot.lock() = Some(sub);

        registry.emit(&());
        assert!(registry.is_empty());
    }

    #[test]
    fn combined_subscription_cancels_all() {
        let registry = ObserverRegistry::<()>::new();
        let combined = Subscription::combine(vec![
            registry.subscribe(|_| {}),
            registry.subscribe(|_| {}),
        ]);
        assert_eq!(registry.len(), 2);

        combined.unsubscribe();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = ObserverRegistry::<()>::new();
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.unsubscribe();
    }
}
