//! Coordination statistics.
//!
//! Every [`TransactionGuard`](crate::TransactionGuard) keeps a set of
//! counters describing how it has been used: how many sessions were opened
//! and closed, how often the write and read locks were taken, how many of
//! the write acquisitions were reentrant, and how many change events were
//! dispatched while it was held.
//!
//! # Usage
//!
//! ```rust,ignore
//! use obsv_core::ObservableGraph;
//!
//! let graph = ObservableGraph::<&str, u32>::new();
//! let a = graph.add_node("a");
//!
//! let stats = graph.stats().snapshot();
//! println!("Events: {}", stats.events_emitted);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Guard statistics.
///
/// All counters are atomic and can be read while operations are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct GuardStats {
    // Session counters
    /// Total number of sessions opened.
    sessions_started: AtomicU64,
    /// Total number of sessions closed.
    sessions_ended: AtomicU64,

    // Lock counters
    /// Total number of write lock acquisitions (outermost and nested).
    write_acquisitions: AtomicU64,
    /// Write acquisitions that re-entered a lock already held by the thread.
    reentrant_acquisitions: AtomicU64,
    /// Total number of read lock acquisitions.
    read_acquisitions: AtomicU64,

    // Event counters
    /// Total number of change events dispatched.
    events_emitted: AtomicU64,
}

impl GuardStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_session_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_end(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, reentrant: bool) {
        self.write_acquisitions.fetch_add(1, Ordering::Relaxed);
        if reentrant {
            self.reentrant_acquisitions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_read(&self) {
        self.read_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the total number of sessions opened.
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    /// Returns the total number of sessions closed.
    pub fn sessions_ended(&self) -> u64 {
        self.sessions_ended.load(Ordering::Relaxed)
    }

    /// Returns the total number of write lock acquisitions.
    pub fn write_acquisitions(&self) -> u64 {
        self.write_acquisitions.load(Ordering::Relaxed)
    }

    /// Returns the number of write acquisitions that were reentrant.
    pub fn reentrant_acquisitions(&self) -> u64 {
        self.reentrant_acquisitions.load(Ordering::Relaxed)
    }

    /// Returns the total number of read lock acquisitions.
    pub fn read_acquisitions(&self) -> u64 {
        self.read_acquisitions.load(Ordering::Relaxed)
    }

    /// Returns the total number of change events dispatched.
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started(),
            sessions_ended: self.sessions_ended(),
            write_acquisitions: self.write_acquisitions(),
            reentrant_acquisitions: self.reentrant_acquisitions(),
            read_acquisitions: self.read_acquisitions(),
            events_emitted: self.events_emitted(),
        }
    }
}

/// A point-in-time snapshot of guard statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total number of sessions opened.
    pub sessions_started: u64,
    /// Total number of sessions closed.
    pub sessions_ended: u64,
    /// Total number of write lock acquisitions.
    pub write_acquisitions: u64,
    /// Write acquisitions that were reentrant.
    pub reentrant_acquisitions: u64,
    /// Total number of read lock acquisitions.
    pub read_acquisitions: u64,
    /// Total number of change events dispatched.
    pub events_emitted: u64,
}
