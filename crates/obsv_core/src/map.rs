//! Observable map.

use crate::collection::{
    ChangeKind, CollectionEvent, Derivation, DerivedView, ListView, ObservableList, ViewObserver,
};
use crate::config::Config;
use crate::notify::{ChangeFeed, ChangeSignal, ObserverRegistry, Sequenced, Subscription};
use crate::stats::GuardStats;
use crate::transaction::{Session, Transactable, TransactionGuard};
use crate::value::{Cause, ObservableCell, ObservableValue, ValueEvent};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::trace;

struct EntryRecord<K, V> {
    key: K,
    slot: ObservableCell<Option<V>>,
}

/// One key of an [`ObservableMap`] with its observable value slot.
///
/// Entries compare and hash by key only. An entry stays valid after it has
/// been removed from its map; its slot then holds `None`.
pub struct MapEntry<K, V> {
    record: Arc<EntryRecord<K, V>>,
}

impl<K, V> MapEntry<K, V>
where
    K: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(key: K, value: V) -> Self {
        Self {
            record: Arc::new(EntryRecord {
                key,
                slot: ObservableCell::new(Some(value)),
            }),
        }
    }

    /// Returns the entry's key.
    pub fn key(&self) -> &K {
        &self.record.key
    }

    /// Returns the current value, or `None` once the entry was removed.
    pub fn value(&self) -> Option<V> {
        self.record.slot.get()
    }

    fn assign(&self, value: Option<V>, cause: Option<Cause>) -> Option<V> {
        self.record.slot.set(value, cause)
    }
}

impl<K, V> ObservableValue<Option<V>> for MapEntry<K, V>
where
    K: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Option<V> {
        self.value()
    }

    fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ValueEvent<Option<V>>) + Send + Sync + 'static,
    {
        self.record.slot.subscribe(observer)
    }
}

impl<K, V> Clone for MapEntry<K, V> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<K: PartialEq, V> PartialEq for MapEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key
    }
}

impl<K: Eq, V> Eq for MapEntry<K, V> {}

impl<K: std::hash::Hash, V> std::hash::Hash for MapEntry<K, V> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.record.key.hash(state);
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for MapEntry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapEntry")
            .field("key", &self.record.key)
            .field("slot", &self.record.slot)
            .finish()
    }
}

/// A change to one key of a map.
///
/// `old` is `None` when the key was added and `new` is `None` when it was
/// removed.
#[derive(Debug, Clone)]
pub struct MapEvent<K, V> {
    /// The affected key.
    pub key: K,
    /// Value before the change.
    pub old: Option<V>,
    /// Value after the change.
    pub new: Option<V>,
    /// The session open when the change was made.
    pub session: Option<Session>,
}

struct MapInner<K, V> {
    guard: TransactionGuard,
    entries: ObservableList<MapEntry<K, V>>,
    observers: ObserverRegistry<MapEvent<K, V>>,
    feed: ChangeFeed<MapEvent<K, V>>,
    signal: Arc<ChangeSignal>,
    _session_end: Subscription,
}

/// An insertion-ordered map whose keys are independently observable.
///
/// Lookups are linear scans over the entry list, so keys need only
/// `PartialEq`.
pub struct ObservableMap<K, V> {
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> Clone for ObservableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ObservableMap<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty map with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty map with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let guard = TransactionGuard::with_label(config.label);
        let signal = Arc::new(ChangeSignal::new());
        let s = Arc::clone(&signal);
        let session_end = guard.subscribe_sessions(move |event| {
            if event.new.is_none() {
                s.session_ended();
            }
        });

        Self {
            inner: Arc::new(MapInner {
                entries: ObservableList::new(guard.clone()),
                guard,
                observers: ObserverRegistry::new(),
                feed: ChangeFeed::with_max_history(config.history_limit),
                signal,
                _session_end: session_end,
            }),
        }
    }

    // === Mutation ===

    /// Associates `value` with `key` and returns the previous value.
    ///
    /// An existing entry is reassigned in place; otherwise a new entry is
    /// appended.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let _lock = self.inner.guard.lock_write();
        match self.entry(&key) {
            Some(entry) => {
                let old = entry.assign(Some(value.clone()), self.current_cause());
                self.emit(key, old.clone(), Some(value));
                old
            }
            None => {
                self.inner
                    .entries
                    .push(MapEntry::new(key.clone(), value.clone()));
                trace!(label = ?self.inner.guard.label(), "map entry created");
                self.emit(key, None, Some(value));
                None
            }
        }
    }

    /// Removes `key` and returns its value.
    ///
    /// The removed entry's slot is cleared, so observers of the entry itself
    /// see the value go to `None`.
    pub fn remove(&self, key: &K) -> Option<V> {
        let _lock = self.inner.guard.lock_write();
        let index = self.inner.entries.position(|entry| entry.key() == key)?;
        let entry = self.inner.entries.remove_at(index)?;
        let old = entry.assign(None, self.current_cause());
        trace!(label = ?self.inner.guard.label(), "map entry removed");
        self.emit(key.clone(), old.clone(), None);
        old
    }

    /// Puts every pair within one transaction.
    pub fn put_all<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let _txn = self.inner.guard.start_transaction(None);
        for (key, value) in pairs {
            self.put(key, value);
        }
    }

    /// Removes every entry within one transaction. Returns how many were
    /// removed.
    pub fn clear(&self) -> usize {
        let _lock = self.inner.guard.lock_write();
        let keys = self.keys();
        if keys.is_empty() {
            return 0;
        }
        let _txn = self.inner.guard.start_transaction(None);
        let mut removed = 0;
        for key in keys.iter().rev() {
            if self.remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    // === Queries ===

    /// Returns the value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entry(key).and_then(|entry| entry.value())
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entry(key).is_some()
    }

    /// Returns the entry for `key`.
    pub fn entry(&self, key: &K) -> Option<MapEntry<K, V>> {
        self.inner.entries.find(|entry| entry.key() == key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.observe_keys().snapshot()
    }

    /// Returns the values in key insertion order.
    pub fn values(&self) -> Vec<V> {
        self.observe_values().snapshot()
    }

    /// Returns a live view of the keys in insertion order.
    pub fn observe_keys(&self) -> DerivedView<K> {
        self.inner.entries.map(|entry| entry.key().clone())
    }

    /// Returns a live view of the values in key insertion order.
    ///
    /// Reassigning a present key is reported as a `Set` at the key's
    /// position.
    pub fn observe_values(&self) -> DerivedView<V> {
        DerivedView::from_derivation(Arc::new(MapValues { map: self.clone() }))
    }

    /// Returns the entry list.
    pub fn entries(&self) -> ListView<MapEntry<K, V>> {
        self.inner.entries.read_only()
    }

    // === Observation ===

    /// Registers an observer for every key change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&MapEvent<K, V>) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(observer)
    }

    /// Returns an observable value tracking `key`, whether or not it is
    /// currently present.
    pub fn observe(&self, key: K) -> KeyValue<K, V> {
        KeyValue {
            map: self.clone(),
            key,
        }
    }

    /// Registers an observer called once per change outside a session, or
    /// once at the end of a session in which anything changed.
    pub fn subscribe_changes<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.signal.subscribe(observer)
    }

    /// Returns a channel receiving every change with its sequence number.
    pub fn subscribe_channel(&self) -> Receiver<Sequenced<MapEvent<K, V>>> {
        self.inner.feed.subscribe()
    }

    /// Returns retained changes with a sequence number above `cursor`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<Sequenced<MapEvent<K, V>>> {
        self.inner.feed.poll(cursor, limit)
    }

    /// Returns the sequence number of the latest change (0 if none).
    pub fn latest_sequence(&self) -> u64 {
        self.inner.feed.latest_sequence()
    }

    /// Returns lock and session statistics.
    pub fn stats(&self) -> &GuardStats {
        self.inner.guard.stats()
    }

    fn current_cause(&self) -> Option<Cause> {
        self.inner
            .guard
            .current_session()
            .and_then(|session| session.cause().cloned())
    }

    fn emit(&self, key: K, old: Option<V>, new: Option<V>) {
        let event = MapEvent {
            key,
            old,
            new,
            session: self.inner.guard.current_session(),
        };
        self.inner.guard.stats().record_event();
        self.inner.signal.touch(event.session.as_ref());
        self.inner.observers.emit(&event);
        self.inner.feed.emit(event);
    }
}

impl<K, V> Default for ObservableMap<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Transactable for ObservableMap<K, V> {
    fn guard(&self) -> &TransactionGuard {
        &self.inner.guard
    }
}

impl<K, V> std::fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableMap")
            .field("guard", &self.inner.guard)
            .field("feed", &self.inner.feed)
            .finish_non_exhaustive()
    }
}

/// Values of a map, positioned by their entries.
struct MapValues<K, V> {
    map: ObservableMap<K, V>,
}

impl<K, V> Derivation<V> for MapValues<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> Vec<V> {
        let _read = self.map.inner.guard.lock_read();
        self.map
            .inner
            .entries
            .snapshot()
            .iter()
            .filter_map(MapEntry::value)
            .collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn subscribe(&self, observer: ViewObserver<V>) -> Subscription {
        let observer: Arc<dyn Fn(&CollectionEvent<V>) + Send + Sync> = Arc::from(observer);

        // Entries leave the list before their slot is cleared, so both
        // membership events still carry the value.
        let o = Arc::clone(&observer);
        let membership = self.map.inner.entries.subscribe(move |event| {
            o(&CollectionEvent {
                kind: event.kind,
                index: event.index,
                old: event.old.as_ref().and_then(MapEntry::value),
                new: event.new.as_ref().and_then(MapEntry::value),
                session: event.session.clone(),
            });
        });

        let entries = self.map.inner.entries.downgrade();
        let reassignment = self.map.subscribe(move |event| {
            let (Some(old), Some(new)) = (&event.old, &event.new) else {
                return;
            };
            let Some(index) = entries
                .upgrade()
                .and_then(|entries| entries.position(|entry| entry.key() == &event.key))
            else {
                return;
            };
            observer(&CollectionEvent {
                kind: ChangeKind::Set,
                index,
                old: Some(old.clone()),
                new: Some(new.clone()),
                session: event.session.clone(),
            });
        });

        Subscription::combine(vec![membership, reassignment])
    }
}

/// The value of one key of a map, observable across removal and re-insertion.
pub struct KeyValue<K, V> {
    map: ObservableMap<K, V>,
    key: K,
}

impl<K, V> KeyValue<K, V> {
    /// Returns the tracked key.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K, V> ObservableValue<Option<V>> for KeyValue<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Option<V> {
        self.map.get(&self.key)
    }

    fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ValueEvent<Option<V>>) + Send + Sync + 'static,
    {
        let key = self.key.clone();
        self.map.subscribe(move |event| {
            if event.key == key {
                observer(&ValueEvent {
                    old: event.old.clone(),
                    new: event.new.clone(),
                    cause: event
                        .session
                        .as_ref()
                        .and_then(|session| session.cause().cloned()),
                });
            }
        })
    }
}
