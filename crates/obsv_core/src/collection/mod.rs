//! Observable collections.
//!
//! [`ObservableList`] is the building block for every structure in the
//! crate: the graph keeps its nodes and edges in two of them, and each
//! multi-map entry holds its values in one. Lists report structural changes
//! as [`CollectionEvent`]s, can be narrowed with live [`FilteredView`]s and
//! projected or concatenated into [`DerivedView`]s.

mod derived;
mod filter;
mod list;

pub(crate) use derived::{Derivation, ViewObserver};
pub use derived::DerivedView;
pub use filter::FilteredView;
pub use list::{ChangeKind, CollectionEvent, ListView, ObservableList};
