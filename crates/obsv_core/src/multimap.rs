//! Observable multi-map.

use crate::collection::{ChangeKind, CollectionEvent, DerivedView, ObservableList};
use crate::config::{Config, ValueKind};
use crate::notify::{ChangeFeed, ChangeSignal, ObserverRegistry, Sequenced, Subscription};
use crate::stats::GuardStats;
use crate::transaction::{Session, Transactable, TransactionGuard};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::trace;

/// A change to the values held under one key.
#[derive(Debug, Clone)]
pub struct MultiMapEvent<K, V> {
    /// The affected key.
    pub key: K,
    /// What happened to the value.
    pub kind: ChangeKind,
    /// Position of the value within the key's values.
    pub index: usize,
    /// The removed or replaced value.
    pub old: Option<V>,
    /// The added or replacing value.
    pub new: Option<V>,
    /// The session open when the change was made.
    pub session: Option<Session>,
}

/// Fan-out shared by every entry of one multi-map.
struct Hub<K, V> {
    observers: ObserverRegistry<MultiMapEvent<K, V>>,
    feed: ChangeFeed<MultiMapEvent<K, V>>,
    signal: ChangeSignal,
}

impl<K: Clone + Send + 'static, V: Clone + Send + 'static> Hub<K, V> {
    fn publish(&self, key: &K, change: &CollectionEvent<V>) {
        let event = MultiMapEvent {
            key: key.clone(),
            kind: change.kind,
            index: change.index,
            old: change.old.clone(),
            new: change.new.clone(),
            session: change.session.clone(),
        };
        self.signal.touch(event.session.as_ref());
        self.observers.emit(&event);
        self.feed.emit(event);
    }
}

struct SlotRecord<K, V> {
    key: K,
    values: ObservableList<V>,
    _forward: Subscription,
}

/// The stored entry for one key. Compares by key.
struct Slot<K, V> {
    record: Arc<SlotRecord<K, V>>,
}

impl<K, V> Clone for Slot<K, V> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<K: PartialEq, V> PartialEq for Slot<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key
    }
}

struct MultiInner<K, V> {
    guard: TransactionGuard,
    slots: ObservableList<Slot<K, V>>,
    hub: Arc<Hub<K, V>>,
    value_kind: ValueKind,
    _session_end: Subscription,
}

/// A map from keys to ordered collections of values.
///
/// Each key's values live in their own observable list, created on the
/// first [`add`](Self::add) for that key. A key whose values run out is
/// removed from the map in the same step, so a present key always has at
/// least one value.
pub struct ObservableMultiMap<K, V> {
    inner: Arc<MultiInner<K, V>>,
}

impl<K, V> Clone for ObservableMultiMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ObservableMultiMap<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates an empty multi-map with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty multi-map with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let guard = TransactionGuard::with_label(config.label);
        let hub = Arc::new(Hub {
            observers: ObserverRegistry::new(),
            feed: ChangeFeed::with_max_history(config.history_limit),
            signal: ChangeSignal::new(),
        });
        let h = Arc::clone(&hub);
        let session_end = guard.subscribe_sessions(move |event| {
            if event.new.is_none() {
                h.signal.session_ended();
            }
        });

        Self {
            inner: Arc::new(MultiInner {
                slots: ObservableList::new(guard.clone()),
                guard,
                hub,
                value_kind: config.value_kind,
                _session_end: session_end,
            }),
        }
    }

    /// Returns the duplicate policy for values.
    pub fn value_kind(&self) -> ValueKind {
        self.inner.value_kind
    }

    // === Mutation ===

    /// Adds `value` under `key`, creating the key if needed.
    ///
    /// Returns false only when the value kind rejects duplicates and the key
    /// already holds an equal value.
    pub fn add(&self, key: K, value: V) -> bool {
        let _lock = self.inner.guard.lock_write();
        let slot = match self.slot(&key) {
            Some(slot) => slot,
            None => self.create_slot(key),
        };
        let values = &slot.record.values;
        if self.inner.value_kind.is_distinct() && values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// Adds every value under `key` within one transaction. Returns true if
    /// anything was added.
    pub fn add_all<I>(&self, key: K, values: I) -> bool
    where
        I: IntoIterator<Item = V>,
    {
        let _txn = self.inner.guard.start_transaction(None);
        let mut changed = false;
        for value in values {
            changed |= self.add(key.clone(), value);
        }
        changed
    }

    /// Removes one occurrence of `value` from `key`.
    ///
    /// When `value` is the key's only value, the key itself is removed.
    /// Returns false if the key is absent or does not hold `value`.
    pub fn remove(&self, key: &K, value: &V) -> bool {
        let _lock = self.inner.guard.lock_write();
        let Some(slot) = self.slot(key) else {
            return false;
        };
        let values = &slot.record.values;
        match values.len() {
            0 => false,
            1 => {
                if values.get(0).as_ref() != Some(value) {
                    return false;
                }
                self.retire(&slot);
                true
            }
            _ => values.remove(value),
        }
    }

    /// Removes `key` with all its values. Returns true if the key was
    /// present with at least one value.
    pub fn remove_all(&self, key: &K) -> bool {
        let _lock = self.inner.guard.lock_write();
        let Some(slot) = self.slot(key) else {
            return false;
        };
        let had_values = !slot.record.values.is_empty();
        self.retire(&slot);
        had_values
    }

    // === Queries ===

    /// Returns a view of `key` that reads and writes through this map.
    pub fn entry(&self, key: K) -> MultiEntry<K, V> {
        MultiEntry {
            map: self.clone(),
            key,
        }
    }

    /// Returns the values under `key`, or an empty vector.
    pub fn get(&self, key: &K) -> Vec<V> {
        self.slot(key)
            .map(|slot| slot.record.values.snapshot())
            .unwrap_or_default()
    }

    /// Returns true if `key` has values.
    pub fn contains_key(&self, key: &K) -> bool {
        self.slot(key).is_some()
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.observe_keys().snapshot()
    }

    /// Returns every value, grouped by key in key insertion order.
    pub fn values(&self) -> Vec<V> {
        self.observe_values().snapshot()
    }

    /// Returns a live view of the keys in insertion order.
    ///
    /// A key is added when its first value arrives and removed when its
    /// entry is retired.
    pub fn observe_keys(&self) -> DerivedView<K> {
        self.inner.slots.map(|slot| slot.record.key.clone())
    }

    /// Returns a live view of every value, grouped by key in key insertion
    /// order. Changes are reported at their position in that sequence.
    pub fn observe_values(&self) -> DerivedView<V> {
        self.inner.slots.flatten(|slot| slot.record.values.clone())
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    /// Returns true if no key is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total number of values across all keys.
    pub fn value_count(&self) -> usize {
        let _read = self.inner.guard.lock_read();
        self.inner
            .slots
            .snapshot()
            .iter()
            .map(|slot| slot.record.values.len())
            .sum()
    }

    // === Observation ===

    /// Registers an observer for every value change under any key.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&MultiMapEvent<K, V>) + Send + Sync + 'static,
    {
        self.inner.hub.observers.subscribe(observer)
    }

    /// Registers an observer called once per change outside a session, or
    /// once at the end of a session in which anything changed.
    pub fn subscribe_changes<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.hub.signal.subscribe(observer)
    }

    /// Returns a channel receiving every change with its sequence number.
    pub fn subscribe_channel(&self) -> Receiver<Sequenced<MultiMapEvent<K, V>>> {
        self.inner.hub.feed.subscribe()
    }

    /// Returns retained changes with a sequence number above `cursor`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<Sequenced<MultiMapEvent<K, V>>> {
        self.inner.hub.feed.poll(cursor, limit)
    }

    /// Returns the sequence number of the latest change (0 if none).
    pub fn latest_sequence(&self) -> u64 {
        self.inner.hub.feed.latest_sequence()
    }

    /// Returns lock and session statistics.
    pub fn stats(&self) -> &GuardStats {
        self.inner.guard.stats()
    }

    fn slot(&self, key: &K) -> Option<Slot<K, V>> {
        self.inner.slots.find(|slot| slot.record.key == *key)
    }

    fn create_slot(&self, key: K) -> Slot<K, V> {
        let values = ObservableList::new(self.inner.guard.clone());
        let hub = Arc::clone(&self.inner.hub);
        let forward_key = key.clone();
        let forward = values.subscribe(move |change| hub.publish(&forward_key, change));

        let slot = Slot {
            record: Arc::new(SlotRecord {
                key,
                values,
                _forward: forward,
            }),
        };
        self.inner.slots.push(slot.clone());
        trace!(label = ?self.inner.guard.label(), "multi-map entry created");
        slot
    }

    /// Empties a slot and drops it from the map as one unit of work.
    fn retire(&self, slot: &Slot<K, V>) {
        let _txn = self.inner.guard.start_transaction(None);
        let dropped = slot.record.values.clear();
        self.inner.slots.remove(slot);
        trace!(
            label = ?self.inner.guard.label(),
            values = dropped,
            "multi-map entry retired"
        );
    }
}

impl<K, V> Default for ObservableMultiMap<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Transactable for ObservableMultiMap<K, V> {
    fn guard(&self) -> &TransactionGuard {
        &self.inner.guard
    }
}

impl<K, V> std::fmt::Debug for ObservableMultiMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableMultiMap")
            .field("guard", &self.inner.guard)
            .field("value_kind", &self.inner.value_kind)
            .finish_non_exhaustive()
    }
}

/// A live view of one key of a multi-map.
///
/// The view holds no values of its own. Reads see the map's current state
/// for the key and writes go through the map, so a view obtained before the
/// key existed (or after it was removed) stays usable.
pub struct MultiEntry<K, V> {
    map: ObservableMultiMap<K, V>,
    key: K,
}

impl<K: Clone, V> Clone for MultiEntry<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            key: self.key.clone(),
        }
    }
}

impl<K, V> MultiEntry<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Returns the key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the key's current values.
    pub fn values(&self) -> Vec<V> {
        self.map.get(&self.key)
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.map
            .slot(&self.key)
            .map_or(0, |slot| slot.record.values.len())
    }

    /// Returns true if the key holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the key holds `value`.
    pub fn contains(&self, value: &V) -> bool {
        self.map
            .slot(&self.key)
            .is_some_and(|slot| slot.record.values.contains(value))
    }

    /// Adds a value; see [`ObservableMultiMap::add`].
    pub fn add(&self, value: V) -> bool {
        self.map.add(self.key.clone(), value)
    }

    /// Removes a value; see [`ObservableMultiMap::remove`].
    pub fn remove(&self, value: &V) -> bool {
        self.map.remove(&self.key, value)
    }

    /// Removes every value; see [`ObservableMultiMap::remove_all`].
    pub fn clear(&self) -> bool {
        self.map.remove_all(&self.key)
    }

    /// Registers an observer for changes to this key's values.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&MultiMapEvent<K, V>) + Send + Sync + 'static,
    {
        let key = self.key.clone();
        self.map.subscribe(move |event| {
            if event.key == key {
                observer(event);
            }
        })
    }
}

impl<K: std::fmt::Debug, V> std::fmt::Debug for MultiEntry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiEntry")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Tags = ObservableMultiMap<&'static str, &'static str>;

    #[test]
    fn add_creates_keys_lazily() {
        let map = Tags::new();
        assert!(!map.contains_key(&"fruit"));

        assert!(map.add("fruit", "apple"));
        assert!(map.add("fruit", "pear"));
        assert!(map.add("veg", "leek"));

        assert_eq!(map.keys(), vec!["fruit", "veg"]);
        assert_eq!(map.get(&"fruit"), vec!["apple", "pear"]);
        assert_eq!(map.values(), vec!["apple", "pear", "leek"]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.value_count(), 3);
    }

    #[test]
    fn list_kind_allows_duplicates() {
        let map = Tags::new();
        assert!(map.add("k", "v"));
        assert!(map.add("k", "v"));
        assert_eq!(map.get(&"k").len(), 2);
    }

    #[test]
    fn set_kind_rejects_duplicates() {
        let map = Tags::with_config(Config::new().value_kind(ValueKind::Set));
        assert!(map.add("k", "v"));
        assert!(!map.add("k", "v"));
        assert!(map.add("k", "w"));
        assert_eq!(map.get(&"k"), vec!["v", "w"]);
    }

    #[test]
    fn removing_the_only_value_collapses_the_key() {
        let map = Tags::new();
        map.add("k", "v");

        assert!(map.remove(&"k", &"v"));
        assert!(!map.contains_key(&"k"));
        assert!(map.is_empty());
    }

    #[test]
    fn removing_one_of_many_keeps_the_key() {
        let map = Tags::new();
        map.add("k", "a");
        map.add("k", "b");

        assert!(map.remove(&"k", &"a"));
        assert_eq!(map.get(&"k"), vec!["b"]);
        assert!(!map.remove(&"k", &"zzz"));
    }

    #[test]
    fn removing_a_foreign_single_value_changes_nothing() {
        let map = Tags::new();
        map.add("k", "v");
        let events = Arc::new(Mutex::new(0));
        let e = Arc::clone(&events);
        let _sub = map.subscribe(move |_| *e.lock() += 1);

        assert!(!map.remove(&"k", &"other"));
        assert!(!map.remove(&"missing", &"v"));
        assert_eq!(map.get(&"k"), vec!["v"]);
        assert_eq!(*events.lock(), 0);
    }

    #[test]
    fn remove_all_reports_prior_contents() {
        let map = Tags::new();
        map.add_all("k", ["a", "b", "c"]);

        assert!(map.remove_all(&"k"));
        assert!(!map.contains_key(&"k"));
        assert!(!map.remove_all(&"k"));
    }

    #[test]
    fn events_carry_key_and_position() {
        let map = Tags::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _sub = map.subscribe(move |e| l.lock().push((e.key, e.kind, e.index)));

        map.add("a", "1");
        map.add("a", "2");
        map.add("b", "3");
        map.remove(&"a", &"1");
        map.remove(&"b", &"3");

        assert_eq!(
            *log.lock(),
            vec![
                ("a", ChangeKind::Add, 0),
                ("a", ChangeKind::Add, 1),
                ("b", ChangeKind::Add, 0),
                ("a", ChangeKind::Remove, 0),
                ("b", ChangeKind::Remove, 0),
            ]
        );
    }

    #[test]
    fn retiring_a_key_is_one_session() {
        let map = Tags::new();
        map.add_all("k", ["a", "b"]);
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&sessions);
        let _sub = map.subscribe(move |e| s.lock().push(e.session.clone()));

        map.remove_all(&"k");
        let sessions = sessions.lock();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].is_some());
        assert_eq!(sessions[0], sessions[1]);
    }

    #[test]
    fn add_all_is_one_session() {
        let map = Tags::new();
        let fired = Arc::new(Mutex::new(0));
        let f = Arc::clone(&fired);
        let _sub = map.subscribe_changes(move || *f.lock() += 1);

        assert!(map.add_all("k", ["a", "b", "c"]));
        assert_eq!(*fired.lock(), 1);
        assert_eq!(map.stats().sessions_started(), 1);
        assert_eq!(map.latest_sequence(), 3);
    }

    #[test]
    fn entry_view_reads_and_writes_through() {
        let map = Tags::new();
        let entry = map.entry("k");
        assert!(entry.is_empty());

        assert!(entry.add("a"));
        map.add("k", "b");
        assert_eq!(entry.values(), vec!["a", "b"]);
        assert!(entry.contains(&"b"));

        assert!(entry.remove(&"a"));
        assert_eq!(map.get(&"k"), vec!["b"]);

        assert!(entry.clear());
        assert!(!map.contains_key(&"k"));
        assert_eq!(entry.len(), 0);

        entry.add("c");
        assert_eq!(map.get(&"k"), vec!["c"]);
    }

    #[test]
    fn entry_view_observes_only_its_key() {
        let map = Tags::new();
        let entry = map.entry("k");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = entry.subscribe(move |e| s.lock().push(e.new));

        map.add("other", "x");
        map.add("k", "y");
        assert_eq!(*seen.lock(), vec![Some("y")]);
    }

    #[test]
    fn key_view_reports_creation_and_retirement() {
        let map = Tags::new();
        let keys = map.observe_keys();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _sub = keys.subscribe(move |e| l.lock().push((e.kind, e.index, e.old, e.new)));

        map.add("a", "1");
        map.add("a", "2");
        map.add("b", "3");
        map.remove(&"b", &"3");
        map.remove_all(&"a");

        assert!(keys.is_empty());
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Add, 0, None, Some("a")),
                (ChangeKind::Add, 1, None, Some("b")),
                (ChangeKind::Remove, 1, Some("b"), None),
                (ChangeKind::Remove, 0, Some("a"), None),
            ]
        );
    }

    #[test]
    fn value_view_positions_values_across_keys() {
        let map = Tags::new();
        map.add("a", "1");
        let values = map.observe_values();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _sub = values.subscribe(move |e| l.lock().push((e.kind, e.index, e.old, e.new)));

        map.add("b", "3");
        map.add("a", "2");
        map.remove(&"a", &"1");
        map.remove_all(&"a");
        map.add("c", "4");

        assert_eq!(values.snapshot(), vec!["3", "4"]);
        assert_eq!(values.len(), map.value_count());
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Add, 1, None, Some("3")),
                (ChangeKind::Add, 1, None, Some("2")),
                (ChangeKind::Remove, 0, Some("1"), None),
                (ChangeKind::Remove, 0, Some("2"), None),
                (ChangeKind::Add, 1, None, Some("4")),
            ]
        );
    }
}
