//! Live filtered views over observable lists.

use super::list::{ChangeKind, CollectionEvent, ObservableList};
use crate::notify::Subscription;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A read-only view of the elements of a list that match a predicate.
///
/// The view holds no copy of its own: every read re-evaluates the predicate
/// against the source, so it always reflects the source's current contents.
/// Observers receive the source's changes translated to positions within
/// the view; changes to non-matching elements are not reported.
pub struct FilteredView<T> {
    source: ObservableList<T>,
    predicate: Predicate<T>,
}

impl<T> Clone for FilteredView<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FilteredView<T> {
    pub(crate) fn new(source: ObservableList<T>, predicate: Predicate<T>) -> Self {
        Self { source, predicate }
    }

    /// Returns the matching elements in source order.
    pub fn snapshot(&self) -> Vec<T> {
        let pred = &self.predicate;
        self.source
            .snapshot()
            .into_iter()
            .filter(|item| pred(item))
            .collect()
    }

    /// Returns the number of matching elements.
    pub fn len(&self) -> usize {
        let pred = &self.predicate;
        self.source.count_where(|item| pred(item))
    }

    /// Returns true if no element matches.
    pub fn is_empty(&self) -> bool {
        let pred = &self.predicate;
        self.source.position(|item| pred(item)).is_none()
    }

    /// Returns the `index`-th matching element.
    pub fn get(&self, index: usize) -> Option<T> {
        self.snapshot().into_iter().nth(index)
    }

    /// Returns true if `value` satisfies the predicate.
    pub fn accepts(&self, value: &T) -> bool {
        (self.predicate)(value)
    }

    /// Registers an observer for changes that affect the view.
    ///
    /// An in-place replacement is reported as `Set` when both the old and
    /// new element match, as `Remove` when only the old one does and as
    /// `Add` when only the new one does.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        let source = self.source.downgrade();
        let pred = Arc::clone(&self.predicate);
        self.source.subscribe(move |event| {
            let Some(source) = source.upgrade() else {
                return;
            };
            if let Some(translated) = translate(&source, &*pred, event) {
                observer(&translated);
            }
        })
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> FilteredView<T> {
    /// Returns true if an equal element is present in the view.
    pub fn contains(&self, value: &T) -> bool {
        (self.predicate)(value) && self.source.contains(value)
    }
}

impl<T: std::fmt::Debug + Clone + Send + Sync + 'static> std::fmt::Debug for FilteredView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

/// Maps a source event onto the view. The source already reflects the
/// change, so matching elements before `event.index` are unaffected by it.
fn translate<T: Clone + Send + Sync + 'static>(
    source: &ObservableList<T>,
    pred: &(dyn Fn(&T) -> bool + Send + Sync),
    event: &CollectionEvent<T>,
) -> Option<CollectionEvent<T>> {
    let old_matches = event.old.as_ref().is_some_and(|v| pred(v));
    let new_matches = event.new.as_ref().is_some_and(|v| pred(v));

    let (kind, old, new) = match (event.kind, old_matches, new_matches) {
        (ChangeKind::Add, _, true) => (ChangeKind::Add, None, event.new.clone()),
        (ChangeKind::Remove, true, _) => (ChangeKind::Remove, event.old.clone(), None),
        (ChangeKind::Set, true, true) => (ChangeKind::Set, event.old.clone(), event.new.clone()),
        (ChangeKind::Set, true, false) => (ChangeKind::Remove, event.old.clone(), None),
        (ChangeKind::Set, false, true) => (ChangeKind::Add, None, event.new.clone()),
        _ => return None,
    };

    Some(CollectionEvent {
        kind,
        index: source.count_prefix(event.index, &|v: &T| pred(v)),
        old,
        new,
        session: event.session.clone(),
    })
}
