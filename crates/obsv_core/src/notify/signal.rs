//! Session-coalesced change signal.

use super::registry::{ObserverRegistry, Subscription};
use crate::transaction::Session;
use std::sync::atomic::{AtomicBool, Ordering};

/// A "something changed" signal that folds a whole session into one firing.
///
/// A change reported outside any session fires immediately. A change made
/// while a session is open only marks the signal dirty; it fires once when
/// the session ends, and not at all if nothing changed during it.
#[derive(Debug, Default)]
pub struct ChangeSignal {
    dirty: AtomicBool,
    observers: ObserverRegistry<()>,
}

impl ChangeSignal {
    /// Creates a clean signal with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a change made under `session`.
    pub fn touch(&self, session: Option<&Session>) {
        if session.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        } else {
            self.observers.emit(&());
        }
    }

    /// Reports that the session that was open has ended.
    pub fn session_ended(&self) {
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.observers.emit(&());
        }
    }

    /// Registers an observer for coalesced changes.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.subscribe(move |_| observer())
    }
}
