//! Reentrant read/write guard with session tracking.

use super::session::{Session, SessionValue};
use crate::notify::{ObserverRegistry, Subscription};
use crate::stats::GuardStats;
use crate::value::{Cause, ValueEvent};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

/// Lock bookkeeping, protected by the guard's mutex.
#[derive(Debug, Default)]
struct LockState {
    /// Thread holding the write lock.
    writer: Option<ThreadId>,
    /// Nesting depth of the write lock.
    write_holds: usize,
    /// Threads blocked waiting for the write lock.
    waiting_writers: usize,
    /// Read holds per reading thread.
    readers: HashMap<ThreadId, usize>,
    /// The open session, if any.
    session: Option<Session>,
    /// Value of `write_holds` when the open session was created.
    session_depth: usize,
}

struct GuardShared {
    state: Mutex<LockState>,
    released: Condvar,
    session_observers: ObserverRegistry<ValueEvent<Option<Session>>>,
    stats: GuardStats,
    label: Option<String>,
}

/// Coordinates all mutation of one top-level structure.
///
/// The guard is a read/write lock with an explicit hold count:
/// - Writers are serialized; readers run concurrently while no writer holds
///   the lock.
/// - The thread holding the write lock may acquire it again (and may take
///   read locks) without blocking.
/// - Waiting writers are preferred over new readers.
///
/// On top of the lock it tracks the *session*: the outermost
/// [`start_transaction`](Self::start_transaction) opens one, nested
/// acquisitions share it, and it ends when that outermost transaction is
/// released. Session observers therefore see exactly one begin and one end
/// per unit of work, however deeply the mutations inside it nest.
///
/// Handles are released on drop and must be released in reverse order of
/// acquisition. A transaction handle may be dropped on another thread; the
/// session end is then delivered on that thread.
#[derive(Clone)]
pub struct TransactionGuard {
    shared: Arc<GuardShared>,
}

impl TransactionGuard {
    /// Creates an unlocked guard.
    pub fn new() -> Self {
        Self::with_label(None)
    }

    /// Creates an unlocked guard whose tracing output carries `label`.
    pub fn with_label(label: Option<String>) -> Self {
        Self {
            shared: Arc::new(GuardShared {
                state: Mutex::new(LockState::default()),
                released: Condvar::new(),
                session_observers: ObserverRegistry::new(),
                stats: GuardStats::new(),
                label,
            }),
        }
    }

    /// Acquires the write lock and opens (or joins) a session.
    ///
    /// Blocks until the write lock is available unless the calling thread
    /// already holds it. When no session is open, a new one tagged with
    /// `cause` is created and session observers are notified.
    pub fn start_transaction(&self, cause: Option<Cause>) -> Transaction {
        let depth = self.acquire_write();

        let (session, opened) = {
            let mut state = self.shared.state.lock();
            match &state.session {
                Some(session) => (session.clone(), false),
                None => {
                    let session = Session::new(cause);
                    state.session = Some(session.clone());
                    state.session_depth = depth;
                    (session, true)
                }
            }
        };

        let transaction = Transaction {
            guard: self.clone(),
            session: session.clone(),
        };
        if opened {
            self.shared.stats.record_session_start();
            debug!(label = ?self.shared.label, session = %session.id(), "session opened");
            self.shared.session_observers.emit(&ValueEvent {
                old: None,
                new: Some(session.clone()),
                cause: session.cause().cloned(),
            });
        }
        transaction
    }

    /// Acquires the write lock without opening a session.
    ///
    /// Events fired while only this lock is held carry whatever session the
    /// caller already has open, or none.
    pub fn lock_write(&self) -> WriteLock {
        self.acquire_write();
        WriteLock { guard: self.clone() }
    }

    /// Acquires shared read access.
    ///
    /// A thread that holds the write lock, or already holds a read lock, is
    /// granted access immediately.
    pub fn lock_read(&self) -> ReadLock {
        let me = thread::current().id();
        let mut state = self.shared.state.lock();
        self.shared.stats.record_read();

        if state.writer == Some(me) {
            return ReadLock {
                guard: self.clone(),
                holder: None,
            };
        }
        if let Some(count) = state.readers.get_mut(&me) {
            *count += 1;
            return ReadLock {
                guard: self.clone(),
                holder: Some(me),
            };
        }

        while state.writer.is_some() || state.waiting_writers > 0 {
            self.shared.released.wait(&mut state);
        }
        state.readers.insert(me, 1);
        ReadLock {
            guard: self.clone(),
            holder: Some(me),
        }
    }

    /// Returns the open session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.shared.state.lock().session.clone()
    }

    /// Returns the observable view of the current session.
    pub fn session(&self) -> SessionValue {
        SessionValue::new(self.clone())
    }

    /// Registers an observer for session begin and end.
    pub fn subscribe_sessions<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ValueEvent<Option<Session>>) + Send + Sync + 'static,
    {
        self.shared.session_observers.subscribe(observer)
    }

    /// Returns true if any thread holds the write lock.
    pub fn is_write_locked(&self) -> bool {
        self.shared.state.lock().writer.is_some()
    }

    /// Returns the write hold count of the calling thread (0 if it is not the writer).
    pub fn hold_count(&self) -> usize {
        let state = self.shared.state.lock();
        if state.writer == Some(thread::current().id()) {
            state.write_holds
        } else {
            0
        }
    }

    /// Returns the guard's statistics.
    pub fn stats(&self) -> &GuardStats {
        &self.shared.stats
    }

    /// Returns the tracing label.
    pub fn label(&self) -> Option<&str> {
        self.shared.label.as_deref()
    }

    /// Returns true if both handles refer to the same guard.
    pub fn same_guard(&self, other: &TransactionGuard) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn acquire_write(&self) -> usize {
        let me = thread::current().id();
        let mut state = self.shared.state.lock();

        if state.writer == Some(me) {
            state.write_holds += 1;
            self.shared.stats.record_write(true);
            trace!(label = ?self.shared.label, depth = state.write_holds, "write lock re-entered");
            return state.write_holds;
        }

        assert!(
            !state.readers.contains_key(&me),
            "cannot acquire the write lock while holding a read lock on the same guard"
        );

        state.waiting_writers += 1;
        while state.writer.is_some() || !state.readers.is_empty() {
            self.shared.released.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer = Some(me);
        state.write_holds = 1;
        self.shared.stats.record_write(false);
        1
    }

    fn release_write(&self) {
        let ended = {
            let mut state = self.shared.state.lock();
            assert!(
                state.write_holds > 0,
                "write lock released more times than it was acquired"
            );
            if state.session.is_some() && state.session_depth == state.write_holds {
                state.session_depth = 0;
                state.session.take()
            } else {
                None
            }
        };

        // The hold is dropped even if a session observer panics.
        let _release = WriteRelease { guard: self };
        if let Some(session) = ended {
            self.shared.stats.record_session_end();
            debug!(label = ?self.shared.label, session = %session.id(), "session closed");
            self.shared.session_observers.emit(&ValueEvent {
                old: Some(session.clone()),
                new: None,
                cause: session.cause().cloned(),
            });
        }
    }

    fn release_read(&self, holder: ThreadId) {
        let mut state = self.shared.state.lock();
        let remaining = match state.readers.get_mut(&holder) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => panic!("read lock released more times than it was acquired"),
        };
        if remaining == 0 {
            state.readers.remove(&holder);
            if state.readers.is_empty() {
                self.shared.released.notify_all();
            }
        }
    }
}

impl Default for TransactionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TransactionGuard")
            .field("label", &self.shared.label)
            .field("write_holds", &state.write_holds)
            .field("readers", &state.readers.len())
            .field("session", &state.session)
            .finish_non_exhaustive()
    }
}

struct WriteRelease<'a> {
    guard: &'a TransactionGuard,
}

impl Drop for WriteRelease<'_> {
    fn drop(&mut self) {
        let shared = &self.guard.shared;
        let mut state = shared.state.lock();
        state.write_holds -= 1;
        if state.write_holds == 0 {
            state.writer = None;
            drop(state);
            shared.released.notify_all();
        }
    }
}

/// An open transaction. The session ends when the outermost handle drops.
#[must_use = "the transaction is released as soon as this handle is dropped"]
pub struct Transaction {
    guard: TransactionGuard,
    session: Session,
}

impl Transaction {
    /// Returns the session this transaction belongs to.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Releases the transaction.
    pub fn close(self) {}
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.guard.release_write();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Exclusive write access without a session of its own.
#[must_use = "the lock is released as soon as this handle is dropped"]
pub struct WriteLock {
    guard: TransactionGuard,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        self.guard.release_write();
    }
}

impl std::fmt::Debug for WriteLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLock").finish_non_exhaustive()
    }
}

/// Shared read access.
#[must_use = "the lock is released as soon as this handle is dropped"]
pub struct ReadLock {
    guard: TransactionGuard,
    /// Reading thread, or `None` when granted under the thread's own write lock.
    holder: Option<ThreadId>,
}

impl Drop for ReadLock {
    fn drop(&mut self) {
        if let Some(holder) = self.holder {
            self.guard.release_read(holder);
        }
    }
}

impl std::fmt::Debug for ReadLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadLock")
            .field("under_write", &self.holder.is_none())
            .finish_non_exhaustive()
    }
}
