//! Transaction coordination.
//!
//! Each top-level structure owns one [`TransactionGuard`]. It provides:
//! - **Mutual exclusion**: one writer at a time, concurrent readers
//! - **Reentrancy**: nested acquisitions on the writer thread never deadlock
//! - **Sessions**: one begin/end pair per outermost transaction

mod guard;
mod session;

pub use guard::{ReadLock, Transaction, TransactionGuard, WriteLock};
pub use session::{Session, SessionId, SessionValue};

use crate::value::Cause;

/// A structure whose mutation is coordinated by a [`TransactionGuard`].
pub trait Transactable {
    /// Returns the structure's guard.
    fn guard(&self) -> &TransactionGuard;

    /// Opens (or joins) a session; see [`TransactionGuard::start_transaction`].
    fn start_transaction(&self, cause: Option<Cause>) -> Transaction {
        self.guard().start_transaction(cause)
    }

    /// Takes the write lock without opening a session.
    fn lock_write(&self) -> WriteLock {
        self.guard().lock_write()
    }

    /// Takes shared read access.
    fn lock_read(&self) -> ReadLock {
        self.guard().lock_read()
    }

    /// Returns the observable current session.
    fn session(&self) -> SessionValue {
        self.guard().session()
    }
}

impl Transactable for TransactionGuard {
    fn guard(&self) -> &TransactionGuard {
        self
    }
}
