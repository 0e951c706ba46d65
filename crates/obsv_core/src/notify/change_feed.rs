//! Change feed for channel-based consumers.
//!
//! Callback observers run synchronously on the mutating thread. The change
//! feed is the alternative for consumers living on other threads: every
//! event is stamped with a sequence number, sent to each channel subscriber
//! and kept in a bounded history for catch-up polling.
//!
//! # Usage
//!
//! ```rust,ignore
//! use obsv_core::ObservableMap;
//!
//! let map = ObservableMap::<String, u32>::new();
//! let receiver = map.subscribe_channel();
//!
//! std::thread::spawn(move || {
//!     while let Ok(change) = receiver.recv() {
//!         println!("#{}: {:?}", change.sequence, change.event);
//!     }
//! });
//!
//! map.put("answer".to_string(), 42);
//! ```

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// An event stamped with its position in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequenced<E> {
    /// Sequence number, starting at 1 and increasing by one per event.
    pub sequence: u64,
    /// The event itself.
    pub event: E,
}

/// A change feed that distributes events to channel subscribers.
///
/// The change feed:
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Drops subscribers whose receiver has gone away
/// - Is thread-safe
pub struct ChangeFeed<E> {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<Sequenced<E>>>>,
    /// History of recent events for polling.
    history: RwLock<Vec<Sequenced<E>>>,
    /// Maximum history size.
    max_history: usize,
    /// Last sequence number handed out.
    sequence: AtomicU64,
}

impl<E: Clone + Send> ChangeFeed<E> {
    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            sequence: AtomicU64::new(0),
        }
    }

    /// Subscribes to the change feed.
    ///
    /// Returns a receiver that will receive all future events.
    /// The receiver should be drained regularly to avoid unbounded memory growth.
    pub fn subscribe(&self) -> Receiver<Sequenced<E>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers and returns its sequence number.
    pub fn emit(&self, event: E) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let stamped = Sequenced { sequence, event };

        if self.max_history > 0 {
            let mut history = self.history.write();
            history.push(stamped.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        let mut subscribers = self.subscribers.write();
        if !subscribers.is_empty() {
            subscribers.retain(|tx| tx.send(stamped.clone()).is_ok());
        }
        sequence
    }

    /// Polls events from a sequence cursor.
    ///
    /// Returns retained events with sequence > cursor, up to limit.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<Sequenced<E>> {
        let history = self.history.read();
        history
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the sequence number of the last emitted event (0 if none).
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Clears history older than the given sequence.
    pub fn truncate_history(&self, min_sequence: u64) {
        let mut history = self.history.write();
        history.retain(|e| e.sequence >= min_sequence);
    }
}

impl<E> std::fmt::Debug for ChangeFeed<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .field("subscribers", &self.subscribers.read().len())
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}
