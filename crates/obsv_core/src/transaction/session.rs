//! Session tokens.

use crate::notify::Subscription;
use crate::value::{Cause, ObservableValue, ValueEvent};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::guard::TransactionGuard;

/// Unique identifier for a session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_uuid())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

struct SessionInner {
    id: SessionId,
    cause: Option<Cause>,
}

/// A token meaning "a unit of work is open".
///
/// Sessions are compared by identity: every outermost transaction creates a
/// fresh one, and all nested transactions share it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(cause: Option<Cause>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                cause,
            }),
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the cause the outermost transaction was opened with.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause> {
        self.inner.cause.as_ref()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Session {}

impl std::hash::Hash for Session {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("cause", &self.inner.cause)
            .finish()
    }
}

/// The observable "current session" of a guard.
///
/// Holds `Some` only while a transaction is open. Observers see
/// `(None, Some(session))` when a session begins and `(Some(session), None)`
/// when it ends.
#[derive(Clone, Debug)]
pub struct SessionValue {
    guard: TransactionGuard,
}

impl SessionValue {
    pub(crate) fn new(guard: TransactionGuard) -> Self {
        Self { guard }
    }
}

impl ObservableValue<Option<Session>> for SessionValue {
    fn get(&self) -> Option<Session> {
        self.guard.current_session()
    }

    fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ValueEvent<Option<Session>>) + Send + Sync + 'static,
    {
        self.guard.subscribe_sessions(observer)
    }
}
