//! Insertion-ordered observable list.

use super::derived::{DerivedView, Flattening, Projection};
use super::filter::FilteredView;
use crate::error::{CollectionError, CollectionResult};
use crate::notify::{ObserverRegistry, Subscription};
use crate::transaction::{Session, TransactionGuard};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// An element was inserted.
    Add,
    /// An element was removed.
    Remove,
    /// An element was replaced in place.
    Set,
}

/// A single structural change to an observable collection.
#[derive(Debug, Clone)]
pub struct CollectionEvent<T> {
    /// What happened.
    pub kind: ChangeKind,
    /// Position of the element (before removal for `Remove`).
    pub index: usize,
    /// The removed or replaced element. `None` for `Add`.
    pub old: Option<T>,
    /// The added or replacing element. `None` for `Remove`.
    pub new: Option<T>,
    /// The session open when the change was made.
    pub session: Option<Session>,
}

impl<T> CollectionEvent<T> {
    /// Returns the element that entered the collection, if any.
    pub fn added(&self) -> Option<&T> {
        self.new.as_ref()
    }

    /// Returns the element that left the collection, if any.
    pub fn removed(&self) -> Option<&T> {
        self.old.as_ref()
    }
}

struct ListInner<T> {
    items: RwLock<Vec<T>>,
    observers: ObserverRegistry<CollectionEvent<T>>,
    guard: TransactionGuard,
}

/// An insertion-ordered, mutation-notifying list.
///
/// Every mutation takes the owning structure's write lock for its duration
/// and reports one [`CollectionEvent`] per element added, removed or
/// replaced, tagged with the session open at the time. Observers run after
/// the list's own data lock is released, on the mutating thread, while the
/// write lock is still held.
pub struct ObservableList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableList<T> {
    /// Creates an empty list coordinated by `guard`.
    pub fn new(guard: TransactionGuard) -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: RwLock::new(Vec::new()),
                observers: ObserverRegistry::new(),
                guard,
            }),
        }
    }

    /// Returns the guard coordinating this list.
    pub fn guard(&self) -> &TransactionGuard {
        &self.inner.guard
    }

    // === Reads ===

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        let _read = self.inner.guard.lock_read();
        self.inner.items.read().len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        let _read = self.inner.guard.lock_read();
        self.inner.items.read().get(index).cloned()
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        let _read = self.inner.guard.lock_read();
        self.inner.items.read().clone()
    }

    /// Returns the first element matching `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let _read = self.inner.guard.lock_read();
        self.inner.items.read().iter().find(|item| pred(item)).cloned()
    }

    /// Returns the position of the first element matching `pred`.
    pub fn position(&self, pred: impl Fn(&T) -> bool) -> Option<usize> {
        let _read = self.inner.guard.lock_read();
        self.inner.items.read().iter().position(pred)
    }

    /// Returns the number of elements matching `pred`.
    pub fn count_where(&self, pred: impl Fn(&T) -> bool) -> usize {
        let _read = self.inner.guard.lock_read();
        self.inner.items.read().iter().filter(|item| pred(item)).count()
    }

    /// Counts matching elements among the first `end` positions.
    pub(crate) fn count_prefix(&self, end: usize, pred: &dyn Fn(&T) -> bool) -> usize {
        let _read = self.inner.guard.lock_read();
        let items = self.inner.items.read();
        items[..end.min(items.len())]
            .iter()
            .filter(|item| pred(item))
            .count()
    }

    // === Writes ===

    /// Appends an element and returns its index.
    pub fn push(&self, value: T) -> usize {
        let _lock = self.inner.guard.lock_write();
        let index = {
            let mut items = self.inner.items.write();
            items.push(value.clone());
            items.len() - 1
        };
        self.emit(ChangeKind::Add, index, None, Some(value));
        index
    }

    /// Inserts an element at `index`, shifting later elements.
    pub fn insert(&self, index: usize, value: T) -> CollectionResult<()> {
        let _lock = self.inner.guard.lock_write();
        {
            let mut items = self.inner.items.write();
            if index > items.len() {
                return Err(CollectionError::index_out_of_bounds(index, items.len()));
            }
            items.insert(index, value.clone());
        }
        self.emit(ChangeKind::Add, index, None, Some(value));
        Ok(())
    }

    /// Replaces the element at `index` and returns the previous one.
    pub fn set(&self, index: usize, value: T) -> CollectionResult<T> {
        let _lock = self.inner.guard.lock_write();
        let old = {
            let mut items = self.inner.items.write();
            let len = items.len();
            match items.get_mut(index) {
                Some(slot) => std::mem::replace(slot, value.clone()),
                None => return Err(CollectionError::index_out_of_bounds(index, len)),
            }
        };
        self.emit(ChangeKind::Set, index, Some(old.clone()), Some(value));
        Ok(old)
    }

    /// Removes and returns the element at `index`.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        let _lock = self.inner.guard.lock_write();
        let old = {
            let mut items = self.inner.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.emit(ChangeKind::Remove, index, Some(old.clone()), None);
        Some(old)
    }

    /// Removes every element for which `keep` returns false, front to back.
    ///
    /// `keep` runs while the list's data lock is held and must not touch
    /// this list. Returns the number of removed elements.
    pub fn retain(&self, keep: impl Fn(&T) -> bool) -> usize {
        let _lock = self.inner.guard.lock_write();
        let mut index = 0;
        let mut removed = 0;
        loop {
            let taken = {
                let mut items = self.inner.items.write();
                let kept = match items.get(index) {
                    None => break,
                    Some(item) => keep(item),
                };
                (!kept).then(|| items.remove(index))
            };
            match taken {
                Some(old) => {
                    self.emit(ChangeKind::Remove, index, Some(old), None);
                    removed += 1;
                }
                None => index += 1,
            }
        }
        removed
    }

    /// Rewrites elements in place: wherever `rewrite` returns a value, that
    /// value replaces the element.
    ///
    /// `rewrite` runs while the list's data lock is held and must not touch
    /// this list. Returns the number of replaced elements.
    pub fn replace_each(&self, rewrite: impl Fn(&T) -> Option<T>) -> usize {
        let _lock = self.inner.guard.lock_write();
        let mut index = 0;
        let mut replaced = 0;
        loop {
            let swapped = {
                let mut items = self.inner.items.write();
                let Some(item) = items.get(index) else {
                    break;
                };
                rewrite(item).map(|new| (std::mem::replace(&mut items[index], new.clone()), new))
            };
            if let Some((old, new)) = swapped {
                self.emit(ChangeKind::Set, index, Some(old), Some(new));
                replaced += 1;
            }
            index += 1;
        }
        replaced
    }

    /// Removes every element, last to first. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let _lock = self.inner.guard.lock_write();
        let mut removed = 0;
        loop {
            let popped = {
                let mut items = self.inner.items.write();
                items.pop().map(|old| (items.len(), old))
            };
            let Some((index, old)) = popped else {
                break;
            };
            self.emit(ChangeKind::Remove, index, Some(old), None);
            removed += 1;
        }
        removed
    }

    // === Observation ===

    /// Registers an observer for every structural change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(observer)
    }

    /// Returns a read-only handle to this list.
    pub fn read_only(&self) -> ListView<T> {
        ListView { list: self.clone() }
    }

    /// Returns a live view of the elements matching `pred`.
    pub fn filter<P>(&self, pred: P) -> FilteredView<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        FilteredView::new(self.clone(), Arc::new(pred))
    }

    /// Returns a live view holding `project(element)` for every element.
    pub fn map<U, F>(&self, project: F) -> DerivedView<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        DerivedView::from_derivation(Arc::new(Projection::new(self.clone(), Arc::new(project))))
    }

    /// Returns a live view concatenating the list `inner_of` yields for each
    /// element, in element order.
    ///
    /// Inner lists must share this list's guard. Changes inside an inner
    /// list are reported at their position in the concatenation; adding or
    /// removing an element reports each of its inner values.
    pub fn flatten<U, F>(&self, inner_of: F) -> DerivedView<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> ObservableList<U> + Send + Sync + 'static,
    {
        DerivedView::from_derivation(Arc::new(Flattening::new(self.clone(), Arc::new(inner_of))))
    }

    pub(crate) fn same_list(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakList<T> {
        WeakList {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn emit(&self, kind: ChangeKind, index: usize, old: Option<T>, new: Option<T>) {
        let event = CollectionEvent {
            kind,
            index,
            old,
            new,
            session: self.inner.guard.current_session(),
        };
        self.inner.guard.stats().record_event();
        self.inner.observers.emit(&event);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ObservableList<T> {
    /// Returns true if an equal element is present.
    pub fn contains(&self, value: &T) -> bool {
        self.position(|item| item == value).is_some()
    }

    /// Returns the position of the first equal element.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.position(|item| item == value)
    }

    /// Removes the first equal element. Returns whether one was found.
    pub fn remove(&self, value: &T) -> bool {
        let _lock = self.inner.guard.lock_write();
        match self.index_of(value) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let _read = self.inner.guard.lock_read();
        f.debug_list().entries(self.inner.items.read().iter()).finish()
    }
}

/// A non-owning handle to a list, used by observers registered on it.
pub(crate) struct WeakList<T> {
    inner: Weak<ListInner<T>>,
}

impl<T> WeakList<T> {
    pub(crate) fn upgrade(&self) -> Option<ObservableList<T>> {
        self.inner.upgrade().map(|inner| ObservableList { inner })
    }
}

/// Read-only access to an [`ObservableList`].
///
/// Structures hand these out for their backing collections so that all
/// mutation goes through the structure's own operations.
pub struct ListView<T> {
    list: ObservableList<T>,
}

impl<T> Clone for ListView<T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ListView<T> {
    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.list.get(index)
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.list.snapshot()
    }

    /// Returns the first element matching `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.list.find(pred)
    }

    /// Registers an observer for every structural change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        self.list.subscribe(observer)
    }

    /// Returns a live view of the elements matching `pred`.
    pub fn filter<P>(&self, pred: P) -> FilteredView<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.list.filter(pred)
    }

    /// Returns a live view holding `project(element)` for every element.
    pub fn map<U, F>(&self, project: F) -> DerivedView<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.list.map(project)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ListView<T> {
    /// Returns true if an equal element is present.
    pub fn contains(&self, value: &T) -> bool {
        self.list.contains(value)
    }

    /// Returns the position of the first equal element.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.list.index_of(value)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ListView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.list, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    type Log = Arc<Mutex<Vec<(ChangeKind, usize, Option<i32>, Option<i32>)>>>;

    fn logged_list() -> (ObservableList<i32>, Log, Subscription) {
        let list = ObservableList::new(TransactionGuard::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let sub = list.subscribe(move |e| l.lock().push((e.kind, e.index, e.old, e.new)));
        (list, log, sub)
    }

    #[test]
    fn push_and_insert_report_positions() {
        let (list, log, _sub) = logged_list();
        assert_eq!(list.push(1), 0);
        assert_eq!(list.push(3), 1);
        list.insert(1, 2).unwrap();

        assert_eq!(list.snapshot(), vec![1, 2, 3]);
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Add, 0, None, Some(1)),
                (ChangeKind::Add, 1, None, Some(3)),
                (ChangeKind::Add, 1, None, Some(2)),
            ]
        );
    }

    #[test]
    fn out_of_bounds_is_rejected_without_events() {
        let (list, log, _sub) = logged_list();
        assert!(matches!(
            list.insert(1, 9),
            Err(CollectionError::IndexOutOfBounds { index: 1, len: 0 })
        ));
        assert!(list.set(0, 9).is_err());
        assert!(list.remove_at(0).is_none());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn set_and_remove() {
        let (list, log, _sub) = logged_list();
        list.push(1);
        list.push(2);

        assert_eq!(list.set(1, 20).unwrap(), 2);
        assert!(list.remove(&1));
        assert!(!list.remove(&1));

        assert_eq!(list.snapshot(), vec![20]);
        let log = log.lock();
        assert_eq!(log[2], (ChangeKind::Set, 1, Some(2), Some(20)));
        assert_eq!(log[3], (ChangeKind::Remove, 0, Some(1), None));
    }

    #[test]
    fn retain_reports_each_removal_at_its_current_index() {
        let (list, log, _sub) = logged_list();
        for i in 0..6 {
            list.push(i);
        }
        log.lock().clear();

        assert_eq!(list.retain(|v| v % 2 == 0), 3);
        assert_eq!(list.snapshot(), vec![0, 2, 4]);
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Remove, 1, Some(1), None),
                (ChangeKind::Remove, 2, Some(3), None),
                (ChangeKind::Remove, 3, Some(5), None),
            ]
        );
    }

    #[test]
    fn replace_each_rewrites_in_place() {
        let (list, log, _sub) = logged_list();
        for i in 0..4 {
            list.push(i);
        }
        log.lock().clear();

        let n = list.replace_each(|v| (*v >= 2).then(|| v * 10));
        assert_eq!(n, 2);
        assert_eq!(list.snapshot(), vec![0, 1, 20, 30]);
        assert_eq!(log.lock()[0], (ChangeKind::Set, 2, Some(2), Some(20)));
    }

    #[test]
    fn clear_removes_from_the_back() {
        let (list, log, _sub) = logged_list();
        list.push(1);
        list.push(2);
        log.lock().clear();

        assert_eq!(list.clear(), 2);
        assert!(list.is_empty());
        assert_eq!(
            *log.lock(),
            vec![
                (ChangeKind::Remove, 1, Some(2), None),
                (ChangeKind::Remove, 0, Some(1), None),
            ]
        );
    }

    #[test]
    fn events_carry_the_open_session() {
        let guard = TransactionGuard::new();
        let list = ObservableList::new(guard.clone());
        let sessions = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&sessions);
        let _sub = list.subscribe(move |e: &CollectionEvent<u8>| s.lock().push(e.session.clone()));

        list.push(1);
        let txn = guard.start_transaction(None);
        list.push(2);
        list.push(3);
        let session = txn.session().clone();
        drop(txn);

        let sessions = sessions.lock();
        assert!(sessions[0].is_none());
        assert_eq!(sessions[1].as_ref(), Some(&session));
        assert_eq!(sessions[2].as_ref(), Some(&session));
    }

    #[test]
    fn observer_may_read_the_list() {
        let list = ObservableList::new(TransactionGuard::new());
        let lens = Arc::new(Mutex::new(Vec::new()));

        let weak = list.downgrade();
        let l = Arc::clone(&lens);
        let _sub = list.subscribe(move |_: &CollectionEvent<u8>| {
            if let Some(list) = weak.upgrade() {
                l.lock().push(list.len());
            }
        });

        list.push(1);
        list.push(2);
        list.remove_at(0);
        assert_eq!(*lens.lock(), vec![1, 2, 1]);
    }

    #[test]
    fn read_only_view_sees_changes() {
        let list = ObservableList::new(TransactionGuard::new());
        let view = list.read_only();
        list.push("a");

        assert_eq!(view.len(), 1);
        assert!(view.contains(&"a"));
        assert_eq!(view.index_of(&"a"), Some(0));
    }

    #[test]
    fn debug_output_waits_for_the_writer() {
        let list = ObservableList::new(TransactionGuard::new());
        let (started, wait) = std::sync::mpsc::channel();
        let writer = {
            let list = list.clone();
            std::thread::spawn(move || {
                let _lock = list.guard().lock_write();
                list.push(1);
                started.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(50));
                list.push(2);
            })
        };

        wait.recv().unwrap();
        assert_eq!(format!("{list:?}"), "[1, 2]");
        assert_eq!(format!("{:?}", list.read_only()), "[1, 2]");
        writer.join().unwrap();
    }

    #[test]
    fn debug_output_inside_a_transaction() {
        let guard = TransactionGuard::new();
        let list = ObservableList::new(guard.clone());
        let _txn = guard.start_transaction(None);
        list.push("a");
        assert_eq!(format!("{list:?}"), "[\"a\"]");
    }

    proptest! {
        #[test]
        fn replaying_events_reproduces_contents(
            ops in prop::collection::vec((0u8..4, any::<i16>()), 0..64)
        ) {
            let list = ObservableList::new(TransactionGuard::new());
            let mirror = Arc::new(Mutex::new(Vec::<i16>::new()));

            let m = Arc::clone(&mirror);
            let _sub = list.subscribe(move |e: &CollectionEvent<i16>| {
                let mut m = m.lock();
                match e.kind {
                    ChangeKind::Add => m.insert(e.index, e.new.unwrap()),
                    ChangeKind::Remove => {
                        m.remove(e.index);
                    }
                    ChangeKind::Set => m[e.index] = e.new.unwrap(),
                }
            });

            for (op, value) in ops {
                let len = list.len();
                match op {
                    0 => {
                        list.push(value);
                    }
                    1 if len > 0 => {
                        list.remove_at(value.unsigned_abs() as usize % len);
                    }
                    2 if len > 0 => {
                        list.set(value.unsigned_abs() as usize % len, value).unwrap();
                    }
                    3 => {
                        list.retain(|v| v % 3 != 0);
                    }
                    _ => {}
                }
            }

            prop_assert_eq!(list.snapshot(), mirror.lock().clone());
        }
    }
}
