//! # obsv core
//!
//! Observable collections with session-batched change notification.
//!
//! This crate provides:
//! - [`ObservableGraph`]: nodes and edges with cascading removal and
//!   in-place node replacement
//! - [`ObservableMap`]: insertion-ordered map with per-key observable entries
//! - [`ObservableMultiMap`]: keys to ordered value collections, with live
//!   per-key views
//! - [`TransactionGuard`]: the reentrant read/write guard every structure
//!   is built on, and the sessions it hands out
//!
//! ## Sessions
//!
//! Every structure owns one guard. Each mutation takes the guard's write
//! lock and reports its events tagged with the session open at the time.
//! Opening a transaction groups any number of mutations, however deeply
//! nested, into one session: observers of [`TransactionGuard::session`]
//! see exactly one begin and one end.
//!
//! ## Example
//!
//! ```rust
//! use obsv_core::{ObservableGraph, Transactable};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let graph: ObservableGraph<&str, u32> = ObservableGraph::new();
//! let a = graph.add_node("a");
//! let b = graph.add_node("b");
//! graph.add_edge(&a, &b, true, 1).unwrap();
//!
//! let changes = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&changes);
//! let _sub = graph.subscribe_changes(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! // Removes the edge and the node, reported as one change.
//! graph.remove_node(&a);
//! assert_eq!(graph.edge_count(), 0);
//! assert_eq!(changes.load(Ordering::SeqCst), 1);
//!
//! // Explicit transactions group unrelated mutations the same way.
//! {
//!     let _txn = graph.start_transaction(None);
//!     graph.add_node("c");
//!     graph.add_node("d");
//! }
//! assert_eq!(changes.load(Ordering::SeqCst), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
mod config;
mod error;
pub mod graph;
pub mod map;
pub mod multimap;
pub mod notify;
pub mod stats;
pub mod transaction;
mod types;
pub mod value;

pub use collection::{
    ChangeKind, CollectionEvent, DerivedView, FilteredView, ListView, ObservableList,
};
pub use config::{Config, ValueKind};
pub use error::{CollectionError, CollectionResult};
pub use graph::{Edge, FilteredGraph, GraphEvent, Node, ObservableGraph};
pub use map::{KeyValue, MapEntry, MapEvent, ObservableMap};
pub use multimap::{MultiEntry, MultiMapEvent, ObservableMultiMap};
pub use notify::{ChangeFeed, Sequenced, Subscription};
pub use stats::{GuardStats, StatsSnapshot};
pub use transaction::{Session, SessionId, SessionValue, Transactable, Transaction, TransactionGuard};
pub use types::{EdgeId, NodeId, SubscriptionId};
pub use value::{Cause, ObservableCell, ObservableValue, ValueEvent};
