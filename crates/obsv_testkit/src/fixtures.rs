//! Recording fixtures.
//!
//! Observers in obsv are closures, so most tests end up writing the same
//! "push into an `Arc<Mutex<Vec<_>>>`" boilerplate. These fixtures do that
//! once and keep the subscription alive for as long as the fixture lives.

use obsv_core::{Session, Subscription, Transactable, ValueEvent};
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber for tests, once per process.
///
/// The filter is read from `RUST_LOG` and defaults to `warn`; run with
/// `RUST_LOG=obsv_core=trace` to see session and entry activity.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Collects every event an observer receives.
pub struct EventLog<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: Clone + Send + 'static> EventLog<E> {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns an observer that appends to this log.
    pub fn observer(&self) -> impl Fn(&E) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &E| events.lock().push(event.clone())
    }

    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<E: Clone + Send + 'static> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// One observed session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    /// A session was opened.
    Begin(Session),
    /// A session was closed.
    End(Session),
}

/// Records session begin and end for one structure.
pub struct SessionRecorder {
    log: EventLog<SessionTransition>,
    _subscription: Subscription,
}

impl SessionRecorder {
    /// Starts recording the sessions of `target`.
    pub fn attach<T: Transactable>(target: &T) -> Self {
        let log = EventLog::new();
        let record = log.observer();
        let subscription = target
            .guard()
            .subscribe_sessions(move |event: &ValueEvent<Option<Session>>| {
                match (&event.old, &event.new) {
                    (None, Some(session)) => record(&SessionTransition::Begin(session.clone())),
                    (Some(session), None) => record(&SessionTransition::End(session.clone())),
                    _ => {}
                }
            });
        Self {
            log,
            _subscription: subscription,
        }
    }

    /// Returns every recorded transition in order.
    pub fn transitions(&self) -> Vec<SessionTransition> {
        self.log.events()
    }

    /// Returns the number of sessions opened.
    pub fn begins(&self) -> usize {
        self.count(|t| matches!(t, SessionTransition::Begin(_)))
    }

    /// Returns the number of sessions closed.
    pub fn ends(&self) -> usize {
        self.count(|t| matches!(t, SessionTransition::End(_)))
    }

    /// Returns true if every begin is followed by the matching end before
    /// the next begin.
    pub fn is_balanced(&self) -> bool {
        let mut open: Option<Session> = None;
        for transition in self.transitions() {
            match transition {
                SessionTransition::Begin(session) => {
                    if open.replace(session).is_some() {
                        return false;
                    }
                }
                SessionTransition::End(session) => {
                    if open.take().as_ref() != Some(&session) {
                        return false;
                    }
                }
            }
        }
        open.is_none()
    }

    fn count(&self, pred: impl Fn(&SessionTransition) -> bool) -> usize {
        self.transitions().iter().filter(|t| pred(t)).count()
    }
}
