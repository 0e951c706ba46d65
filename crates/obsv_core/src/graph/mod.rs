//! Observable graph.
//!
//! Nodes and edges live in two observable lists that share the graph's
//! transaction guard. Removing or replacing a node rewrites the edges that
//! reference it within the same session, so observers never see an edge
//! whose endpoint is gone.

mod element;
mod store;
mod view;

pub use element::{Edge, Node};
pub use store::{GraphEvent, ObservableGraph};
pub use view::FilteredGraph;
