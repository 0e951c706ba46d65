//! Live views derived element-wise from observable lists.
//!
//! A [`DerivedView`] keeps no elements of its own. Reads recompute from the
//! source under the source's read lock, and observers receive the source's
//! events rewritten into the view's element type and positions.

use super::list::{ChangeKind, CollectionEvent, ObservableList, WeakList};
use crate::notify::Subscription;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub(crate) type ViewObserver<T> = Box<dyn Fn(&CollectionEvent<T>) + Send + Sync>;

/// What a [`DerivedView`] reads from and listens to.
pub(crate) trait Derivation<T>: Send + Sync {
    fn snapshot(&self) -> Vec<T>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.snapshot().into_iter().nth(index)
    }

    fn subscribe(&self, observer: ViewObserver<T>) -> Subscription;
}

/// A read-only, live view computed from one or more observable lists.
///
/// Returned by [`ObservableList::map`], [`ObservableList::flatten`] and by
/// the key and value views of the maps.
pub struct DerivedView<T> {
    source: Arc<dyn Derivation<T>>,
}

impl<T> Clone for DerivedView<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> DerivedView<T> {
    pub(crate) fn from_derivation(source: Arc<dyn Derivation<T>>) -> Self {
        Self { source }
    }

    /// Returns the current elements.
    pub fn snapshot(&self) -> Vec<T> {
        self.source.snapshot()
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.source.get(index)
    }

    /// Registers an observer for changes, reported at view positions.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        self.source.subscribe(Box::new(observer))
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DerivedView<T> {
    /// Returns true if an equal element is present.
    pub fn contains(&self, value: &T) -> bool {
        self.snapshot().contains(value)
    }

    /// Returns the position of the first equal element.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.snapshot().iter().position(|item| item == value)
    }
}

impl<T: std::fmt::Debug + Clone + Send + Sync + 'static> std::fmt::Debug for DerivedView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

// === Projection ===

/// One output element per source element, at the same position.
pub(crate) struct Projection<S, T> {
    source: ObservableList<S>,
    project: Arc<dyn Fn(&S) -> T + Send + Sync>,
}

impl<S, T> Projection<S, T> {
    pub(crate) fn new(
        source: ObservableList<S>,
        project: Arc<dyn Fn(&S) -> T + Send + Sync>,
    ) -> Self {
        Self { source, project }
    }
}

impl<S, T> Derivation<T> for Projection<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn snapshot(&self) -> Vec<T> {
        self.source
            .snapshot()
            .iter()
            .map(|item| (self.project)(item))
            .collect()
    }

    fn len(&self) -> usize {
        self.source.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.source.get(index).map(|item| (self.project)(&item))
    }

    fn subscribe(&self, observer: ViewObserver<T>) -> Subscription {
        let project = Arc::clone(&self.project);
        self.source.subscribe(move |event| {
            observer(&CollectionEvent {
                kind: event.kind,
                index: event.index,
                old: event.old.as_ref().map(|item| project(item)),
                new: event.new.as_ref().map(|item| project(item)),
                session: event.session.clone(),
            });
        })
    }
}

// === Flattening ===

type Inner<S, T> = Arc<dyn Fn(&S) -> ObservableList<T> + Send + Sync>;

/// The concatenation of the inner lists held by each source element.
pub(crate) struct Flattening<S, T> {
    source: ObservableList<S>,
    inner_of: Inner<S, T>,
}

impl<S, T> Flattening<S, T> {
    pub(crate) fn new(source: ObservableList<S>, inner_of: Inner<S, T>) -> Self {
        Self { source, inner_of }
    }
}

impl<S, T> Derivation<T> for Flattening<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> Vec<T> {
        let _read = self.source.guard().lock_read();
        self.source
            .snapshot()
            .iter()
            .flat_map(|item| (self.inner_of)(item).snapshot())
            .collect()
    }

    fn len(&self) -> usize {
        let _read = self.source.guard().lock_read();
        self.source
            .snapshot()
            .iter()
            .map(|item| (self.inner_of)(item).len())
            .sum()
    }

    fn subscribe(&self, observer: ViewObserver<T>) -> Subscription {
        // Attaching must not interleave with a mutation of the source.
        let _read = self.source.guard().lock_read();
        let relay = Arc::new(Relay {
            source: self.source.downgrade(),
            inner_of: Arc::clone(&self.inner_of),
            observer,
            attached: Mutex::new(Vec::new()),
        });
        for item in self.source.snapshot() {
            Relay::attach(&relay, (self.inner_of)(&item));
        }

        let r = Arc::clone(&relay);
        self.source.subscribe(move |event| r.outer_changed(event))
    }
}

/// Forwards inner-list events for one flattened subscription.
///
/// Inner subscriptions hold the relay weakly. The relay lives exactly as
/// long as the subscription on the source list.
struct Relay<S, T> {
    source: WeakList<S>,
    inner_of: Inner<S, T>,
    observer: ViewObserver<T>,
    attached: Mutex<Vec<(ObservableList<T>, Subscription)>>,
}

impl<S, T> Relay<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn attach(relay: &Arc<Self>, inner: ObservableList<T>) {
        let weak: Weak<Self> = Arc::downgrade(relay);
        let list = inner.downgrade();
        let sub = inner.subscribe(move |event| {
            let (Some(relay), Some(list)) = (weak.upgrade(), list.upgrade()) else {
                return;
            };
            relay.inner_changed(&list, event);
        });
        relay.attached.lock().push((inner, sub));
    }

    fn detach(&self, inner: &ObservableList<T>) {
        let detached = {
            let mut attached = self.attached.lock();
            attached
                .iter()
                .position(|(list, _)| list.same_list(inner))
                .map(|index| attached.remove(index))
        };
        drop(detached);
    }

    /// Number of flattened elements before the inner lists at `end` and on.
    fn offset_before(&self, end: usize) -> usize {
        let Some(source) = self.source.upgrade() else {
            return 0;
        };
        source
            .snapshot()
            .iter()
            .take(end)
            .map(|item| (self.inner_of)(item).len())
            .sum()
    }

    fn offset_of(&self, inner: &ObservableList<T>) -> Option<usize> {
        let source = self.source.upgrade()?;
        let mut offset = 0;
        for item in source.snapshot() {
            let list = (self.inner_of)(&item);
            if list.same_list(inner) {
                return Some(offset);
            }
            offset += list.len();
        }
        None
    }

    fn inner_changed(&self, inner: &ObservableList<T>, event: &CollectionEvent<T>) {
        let Some(offset) = self.offset_of(inner) else {
            return;
        };
        (self.observer)(&CollectionEvent {
            index: offset + event.index,
            ..event.clone()
        });
    }

    fn outer_changed(self: &Arc<Self>, event: &CollectionEvent<S>) {
        if let Some(old) = &event.old {
            let inner = (self.inner_of)(old);
            self.detach(&inner);
            let offset = self.offset_before(event.index);
            for (i, value) in inner.snapshot().into_iter().enumerate().rev() {
                self.emit(ChangeKind::Remove, offset + i, Some(value), None, event);
            }
        }
        if let Some(new) = &event.new {
            let inner = (self.inner_of)(new);
            let offset = self.offset_before(event.index);
            for (i, value) in inner.snapshot().into_iter().enumerate() {
                self.emit(ChangeKind::Add, offset + i, None, Some(value), event);
            }
            Self::attach(self, inner);
        }
    }

    fn emit(
        &self,
        kind: ChangeKind,
        index: usize,
        old: Option<T>,
        new: Option<T>,
        cause: &CollectionEvent<S>,
    ) {
        (self.observer)(&CollectionEvent {
            kind,
            index,
            old,
            new,
            session: cause.session.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionGuard;

    type Log<T> = Arc<Mutex<Vec<(ChangeKind, usize, Option<T>, Option<T>)>>>;

    fn record<T: Clone + Send + Sync + 'static>(view: &DerivedView<T>) -> (Log<T>, Subscription) {
        let log: Log<T> = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let sub = view.subscribe(move |e| {
            l.lock()
                .push((e.kind, e.index, e.old.clone(), e.new.clone()));
        });
        (log, sub)
    }

    #[test]
    fn mapped_view_follows_source() {
        let list = ObservableList::new(TransactionGuard::new());
        let lengths = list.map(|s: &&str| s.len());
        let (log, _sub) = record(&lengths);

        list.push("a");
        list.push("bcd");
        list.set(0, "ef").unwrap();
        list.remove_at(1);

        assert_eq!(lengths.snapshot(), vec![2]);
        assert_eq!(lengths.get(0), Some(2));
        assert!(lengths.contains(&2));
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Add, 0, None, Some(1)),
                (ChangeKind::Add, 1, None, Some(3)),
                (ChangeKind::Set, 0, Some(1), Some(2)),
                (ChangeKind::Remove, 1, Some(3), None),
            ]
        );
    }

    fn groups() -> (ObservableList<ObservableList<i32>>, TransactionGuard) {
        let guard = TransactionGuard::new();
        (ObservableList::new(guard.clone()), guard)
    }

    #[test]
    fn flattened_view_concatenates_inner_lists() {
        let (outer, guard) = groups();
        let first = ObservableList::new(guard.clone());
        let second = ObservableList::new(guard);
        first.push(1);
        first.push(2);
        second.push(3);
        outer.push(first);
        outer.push(second);

        let flat = outer.flatten(|inner| inner.clone());
        assert_eq!(flat.snapshot(), vec![1, 2, 3]);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat.get(2), Some(3));
    }

    #[test]
    fn flattened_events_are_offset_by_earlier_lists() {
        let (outer, guard) = groups();
        let first = ObservableList::new(guard.clone());
        first.push(1);
        outer.push(first.clone());
        let flat = outer.flatten(|inner| inner.clone());
        let (log, _sub) = record(&flat);

        let second = ObservableList::new(guard);
        second.push(10);
        outer.push(second.clone());
        second.push(11);
        first.push(2);
        second.remove_at(0);

        assert_eq!(flat.snapshot(), vec![1, 2, 11]);
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Add, 1, None, Some(10)),
                (ChangeKind::Add, 2, None, Some(11)),
                (ChangeKind::Add, 1, None, Some(2)),
                (ChangeKind::Remove, 2, Some(10), None),
            ]
        );
    }

    #[test]
    fn removed_inner_lists_are_reported_and_forgotten() {
        let (outer, guard) = groups();
        let first = ObservableList::new(guard.clone());
        let second = ObservableList::new(guard);
        first.push(1);
        second.push(2);
        second.push(3);
        outer.push(first);
        outer.push(second.clone());
        let flat = outer.flatten(|inner| inner.clone());
        let (log, _sub) = record(&flat);

        outer.remove_at(1);
        second.push(4);

        assert_eq!(flat.snapshot(), vec![1]);
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Remove, 2, Some(3), None),
                (ChangeKind::Remove, 1, Some(2), None),
            ]
        );
    }

    #[test]
    fn dropping_the_subscription_stops_inner_forwarding() {
        let (outer, guard) = groups();
        let inner = ObservableList::new(guard);
        outer.push(inner.clone());
        let flat = outer.flatten(|inner| inner.clone());
        let (log, sub) = record(&flat);

        inner.push(1);
        drop(sub);
        inner.push(2);
        assert_eq!(log.lock().len(), 1);
    }
}
