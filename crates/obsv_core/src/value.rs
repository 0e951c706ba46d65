//! Observable values.

use crate::notify::{ObserverRegistry, Subscription};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An opaque, shareable reason for a change.
///
/// Callers attach a cause when they open a transaction; it travels with the
/// session and with value events so observers can tell who triggered them.
#[derive(Clone)]
pub struct Cause(Arc<dyn Any + Send + Sync>);

impl Cause {
    /// Wraps any value as a cause.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the wrapped value if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if the wrapped value has type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Returns true if both causes wrap the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Cause) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<&'static str>() {
            write!(f, "Cause({s:?})")
        } else if let Some(s) = self.downcast_ref::<String>() {
            write!(f, "Cause({s:?})")
        } else {
            f.write_str("Cause(..)")
        }
    }
}

/// A change to an observable value.
#[derive(Debug, Clone)]
pub struct ValueEvent<T> {
    /// Value before the change.
    pub old: T,
    /// Value after the change.
    pub new: T,
    /// What caused the change, if known.
    pub cause: Option<Cause>,
}

/// A value that can be read and watched.
pub trait ObservableValue<T> {
    /// Returns the current value.
    fn get(&self) -> T;

    /// Registers an observer for future changes.
    ///
    /// The observer is not called with the current value.
    fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ValueEvent<T>) + Send + Sync + 'static;
}

/// A single settable value slot with observers.
pub struct ObservableCell<T> {
    value: RwLock<T>,
    observers: ObserverRegistry<ValueEvent<T>>,
}

impl<T: Clone + Send + Sync + 'static> ObservableCell<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            observers: ObserverRegistry::new(),
        }
    }

    /// Replaces the value, notifies observers and returns the previous value.
    ///
    /// Observers are called after the internal lock is released.
    pub fn set(&self, value: T, cause: Option<Cause>) -> T {
        let old = std::mem::replace(&mut *self.value.write(), value.clone());
        self.observers.emit(&ValueEvent {
            old: old.clone(),
            new: value,
            cause,
        });
        old
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableValue<T> for ObservableCell<T> {
    fn get(&self) -> T {
        self.value.read().clone()
    }

    fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ValueEvent<T>) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &*self.value.read())
            .finish_non_exhaustive()
    }
}
