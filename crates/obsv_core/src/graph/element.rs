//! Graph nodes and edges.

use crate::types::{EdgeId, NodeId};
use std::fmt;
use std::sync::Arc;

struct NodeRecord<N> {
    id: NodeId,
    value: N,
}

/// A node handle.
///
/// Handles are cheap to clone and compare by identity: two nodes holding
/// equal values are still different nodes. A handle stays readable after its
/// node has been removed from the graph.
pub struct Node<N> {
    record: Arc<NodeRecord<N>>,
}

impl<N> Node<N> {
    pub(crate) fn new(value: N) -> Self {
        Self {
            record: Arc::new(NodeRecord {
                id: NodeId::generate(),
                value,
            }),
        }
    }

    /// Returns the node's identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.record.id
    }

    /// Returns the node's value.
    #[must_use]
    pub fn value(&self) -> &N {
        &self.record.value
    }
}

impl<N> Clone for Node<N> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<N> PartialEq for Node<N> {
    fn eq(&self, other: &Self) -> bool {
        self.record.id == other.record.id
    }
}

impl<N> Eq for Node<N> {}

impl<N> std::hash::Hash for Node<N> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.record.id.hash(state);
    }
}

impl<N: fmt::Debug> fmt::Debug for Node<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.record.id)
            .field("value", &self.record.value)
            .finish()
    }
}

struct EdgeRecord<N, E> {
    id: EdgeId,
    start: Node<N>,
    end: Node<N>,
    directed: bool,
    value: Arc<E>,
}

/// An edge handle.
///
/// Like nodes, edges compare by identity. An edge never connects a node to
/// itself.
pub struct Edge<N, E> {
    record: Arc<EdgeRecord<N, E>>,
}

impl<N, E> Edge<N, E> {
    pub(crate) fn new(start: Node<N>, end: Node<N>, directed: bool, value: Arc<E>) -> Self {
        Self {
            record: Arc::new(EdgeRecord {
                id: EdgeId::generate(),
                start,
                end,
                directed,
                value,
            }),
        }
    }

    /// Returns the edge's identity.
    #[must_use]
    pub fn id(&self) -> EdgeId {
        self.record.id
    }

    /// Returns the start node.
    #[must_use]
    pub fn start(&self) -> &Node<N> {
        &self.record.start
    }

    /// Returns the end node.
    #[must_use]
    pub fn end(&self) -> &Node<N> {
        &self.record.end
    }

    /// Returns true if the edge points from start to end.
    #[must_use]
    pub fn is_directed(&self) -> bool {
        self.record.directed
    }

    /// Returns the edge's value.
    #[must_use]
    pub fn value(&self) -> &E {
        &self.record.value
    }

    /// Returns true if `node` is either endpoint.
    #[must_use]
    pub fn touches(&self, node: &Node<N>) -> bool {
        self.record.start == *node || self.record.end == *node
    }

    /// Returns the endpoint opposite `node`, or `None` if `node` is not an
    /// endpoint.
    #[must_use]
    pub fn other_end(&self, node: &Node<N>) -> Option<&Node<N>> {
        if self.record.start == *node {
            Some(&self.record.end)
        } else if self.record.end == *node {
            Some(&self.record.start)
        } else {
            None
        }
    }

    /// Builds the equivalent edge with `old` swapped for `new`, sharing this
    /// edge's direction and value. Returns `None` if `old` is not an endpoint.
    pub(crate) fn rewired(&self, old: &Node<N>, new: &Node<N>) -> Option<Self> {
        if !self.touches(old) {
            return None;
        }
        let swap = |n: &Node<N>| if n == old { new.clone() } else { n.clone() };
        Some(Self::new(
            swap(&self.record.start),
            swap(&self.record.end),
            self.record.directed,
            Arc::clone(&self.record.value),
        ))
    }
}

impl<N, E> Clone for Edge<N, E> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<N, E> PartialEq for Edge<N, E> {
    fn eq(&self, other: &Self) -> bool {
        self.record.id == other.record.id
    }
}

impl<N, E> Eq for Edge<N, E> {}

impl<N, E> std::hash::Hash for Edge<N, E> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.record.id.hash(state);
    }
}

impl<N, E: fmt::Debug> fmt::Debug for Edge<N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.record.directed { "->" } else { "--" };
        write!(
            f,
            "Edge({} {} {arrow} {}, {:?})",
            self.record.id,
            self.record.start.id(),
            self.record.end.id(),
            self.record.value
        )
    }
}
