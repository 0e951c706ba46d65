//! The observable graph.

use super::element::{Edge, Node};
use super::view::FilteredGraph;
use crate::collection::{CollectionEvent, FilteredView, ListView, ObservableList};
use crate::config::Config;
use crate::error::{CollectionError, CollectionResult};
use crate::notify::{ChangeFeed, ChangeSignal, Sequenced, Subscription};
use crate::stats::GuardStats;
use crate::transaction::{Session, Transactable, TransactionGuard};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, trace};

/// A structural change to a graph.
#[derive(Debug)]
pub enum GraphEvent<N, E> {
    /// The node list changed.
    Node(CollectionEvent<Node<N>>),
    /// The edge list changed.
    Edge(CollectionEvent<Edge<N, E>>),
}

impl<N, E> GraphEvent<N, E> {
    /// Returns the session open when the change was made.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Node(event) => event.session.as_ref(),
            Self::Edge(event) => event.session.as_ref(),
        }
    }
}

impl<N, E> Clone for GraphEvent<N, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Node(event) => Self::Node(event.clone()),
            Self::Edge(event) => Self::Edge(event.clone()),
        }
    }
}

struct GraphInner<N, E> {
    guard: TransactionGuard,
    nodes: ObservableList<Node<N>>,
    edges: ObservableList<Edge<N, E>>,
    feed: Arc<ChangeFeed<GraphEvent<N, E>>>,
    signal: Arc<ChangeSignal>,
    _forwarding: Subscription,
}

/// A graph of nodes and optionally directed edges with change notification.
///
/// All handles to a graph share one [`TransactionGuard`]. Each mutating
/// operation is atomic with respect to other writers and to readers, and
/// composite operations ([`remove_node`](Self::remove_node),
/// [`replace_node`](Self::replace_node)) run inside a single session so their
/// events arrive as one unit of work.
///
/// Invariants:
/// - Every edge's endpoints are member nodes.
/// - No edge connects a node to itself.
pub struct ObservableGraph<N, E> {
    inner: Arc<GraphInner<N, E>>,
}

impl<N, E> Clone for ObservableGraph<N, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N, E> ObservableGraph<N, E>
where
    N: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates an empty graph with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty graph with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let guard = TransactionGuard::with_label(config.label);
        let nodes = ObservableList::new(guard.clone());
        let edges = ObservableList::new(guard.clone());
        let feed = Arc::new(ChangeFeed::with_max_history(config.history_limit));
        let signal = Arc::new(ChangeSignal::new());

        let (f, s) = (Arc::clone(&feed), Arc::clone(&signal));
        let node_forward = nodes.subscribe(move |event: &CollectionEvent<Node<N>>| {
            s.touch(event.session.as_ref());
            f.emit(GraphEvent::Node(event.clone()));
        });
        let (f, s) = (Arc::clone(&feed), Arc::clone(&signal));
        let edge_forward = edges.subscribe(move |event: &CollectionEvent<Edge<N, E>>| {
            s.touch(event.session.as_ref());
            f.emit(GraphEvent::Edge(event.clone()));
        });
        let s = Arc::clone(&signal);
        let session_end = guard.subscribe_sessions(move |event| {
            if event.new.is_none() {
                s.session_ended();
            }
        });

        Self {
            inner: Arc::new(GraphInner {
                guard,
                nodes,
                edges,
                feed,
                signal,
                _forwarding: Subscription::combine(vec![node_forward, edge_forward, session_end]),
            }),
        }
    }

    // === Mutation ===

    /// Adds a node holding `value` and returns it.
    pub fn add_node(&self, value: N) -> Node<N> {
        let node = Node::new(value);
        self.inner.nodes.push(node.clone());
        trace!(node = %node.id(), "node added");
        node
    }

    /// Connects two member nodes.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidArgument`] if either endpoint is not
    /// a node of this graph, or if `start` and `end` are the same node. The
    /// graph is unchanged in that case.
    pub fn add_edge(
        &self,
        start: &Node<N>,
        end: &Node<N>,
        directed: bool,
        value: E,
    ) -> CollectionResult<Edge<N, E>> {
        let _lock = self.inner.guard.lock_write();
        for endpoint in [start, end] {
            if !self.inner.nodes.contains(endpoint) {
                return Err(CollectionError::invalid_argument(format!(
                    "{} is not a node of this graph",
                    endpoint.id()
                )));
            }
        }
        if start == end {
            return Err(CollectionError::invalid_argument(format!(
                "edge from {} to itself",
                start.id()
            )));
        }

        let edge = Edge::new(start.clone(), end.clone(), directed, Arc::new(value));
        self.inner.edges.push(edge.clone());
        Ok(edge)
    }

    /// Removes a node together with every edge touching it.
    ///
    /// Returns false if the node is not in the graph.
    pub fn remove_node(&self, node: &Node<N>) -> bool {
        let _lock = self.inner.guard.lock_write();
        if !self.inner.nodes.contains(node) {
            return false;
        }

        let _txn = self.inner.guard.start_transaction(None);
        let dropped = self.inner.edges.retain(|edge| !edge.touches(node));
        self.inner.nodes.remove(node);
        debug!(
            label = ?self.inner.guard.label(),
            node = %node.id(),
            edges = dropped,
            "node removed"
        );
        true
    }

    /// Removes an edge. Returns false if it is not in the graph.
    pub fn remove_edge(&self, edge: &Edge<N, E>) -> bool {
        self.inner.edges.remove(edge)
    }

    /// Replaces `node` with a new node holding `value`.
    ///
    /// The new node takes the position right after the old one, and every
    /// edge touching the old node is rewritten in place into an edge with the
    /// same direction and value on the new node. Returns `None` if `node` is
    /// not in the graph.
    pub fn replace_node(&self, node: &Node<N>, value: N) -> Option<Node<N>> {
        let _lock = self.inner.guard.lock_write();
        let index = self.inner.nodes.index_of(node)?;

        let _txn = self.inner.guard.start_transaction(None);
        let replacement = Node::new(value);
        self.inner.nodes.insert(index + 1, replacement.clone()).ok()?;
        let rewired = self
            .inner
            .edges
            .replace_each(|edge| edge.rewired(node, &replacement));
        self.inner.nodes.remove(node);
        debug!(
            label = ?self.inner.guard.label(),
            old = %node.id(),
            new = %replacement.id(),
            edges = rewired,
            "node replaced"
        );
        Some(replacement)
    }

    // === Queries ===

    /// Returns a live view of every edge touching `node`.
    pub fn node_edges(&self, node: &Node<N>) -> FilteredView<Edge<N, E>> {
        let node = node.clone();
        self.inner.edges.filter(move |edge| edge.touches(&node))
    }

    /// Returns a live view of the edges starting at `node`.
    pub fn outward_edges(&self, node: &Node<N>) -> FilteredView<Edge<N, E>> {
        let node = node.clone();
        self.inner.edges.filter(move |edge| *edge.start() == node)
    }

    /// Returns a live view of the edges ending at `node`.
    pub fn inward_edges(&self, node: &Node<N>) -> FilteredView<Edge<N, E>> {
        let node = node.clone();
        self.inner.edges.filter(move |edge| *edge.end() == node)
    }

    /// Returns the node list.
    pub fn nodes(&self) -> ListView<Node<N>> {
        self.inner.nodes.read_only()
    }

    /// Returns the edge list.
    pub fn edges(&self) -> ListView<Edge<N, E>> {
        self.inner.edges.read_only()
    }

    /// Returns true if `node` is in the graph.
    pub fn contains_node(&self, node: &Node<N>) -> bool {
        self.inner.nodes.contains(node)
    }

    /// Returns true if `edge` is in the graph.
    pub fn contains_edge(&self, edge: &Edge<N, E>) -> bool {
        self.inner.edges.contains(edge)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edges.len()
    }

    /// Returns a live sub-graph of the nodes whose values pass `node_pred`
    /// and the edges whose values pass `edge_pred` and whose endpoints both
    /// pass `node_pred`.
    pub fn filter<P, Q>(&self, node_pred: P, edge_pred: Q) -> FilteredGraph<N, E>
    where
        P: Fn(&N) -> bool + Send + Sync + 'static,
        Q: Fn(&E) -> bool + Send + Sync + 'static,
    {
        FilteredGraph::new(self.clone(), Arc::new(node_pred), Arc::new(edge_pred))
    }

    // === Observation ===

    /// Registers an observer for every node and edge change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&GraphEvent<N, E>) + Send + Sync + 'static,
    {
        let observer = Arc::new(observer);
        let o = Arc::clone(&observer);
        let nodes = self
            .inner
            .nodes
            .subscribe(move |event| o(&GraphEvent::Node(event.clone())));
        let edges = self
            .inner
            .edges
            .subscribe(move |event| observer(&GraphEvent::Edge(event.clone())));
        Subscription::combine(vec![nodes, edges])
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
    pub fn subscribe_channel(&self) -> Receiver<Sequenced<GraphEvent<N, E>>> {
        self.inner.feed.subscribe()
    }

    /// Returns retained changes with a sequence number above `cursor`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<Sequenced<GraphEvent<N, E>>> {
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
}

impl<N, E> ObservableGraph<N, E>
where
    N: PartialEq + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Returns the first node whose value equals `value`.
    pub fn find_node(&self, value: &N) -> Option<Node<N>> {
        self.inner.nodes.find(|node| node.value() == value)
    }
}

impl<N, E> Default for ObservableGraph<N, E>
where
    N: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> Transactable for ObservableGraph<N, E> {
    fn guard(&self) -> &TransactionGuard {
        &self.inner.guard
    }
}

impl<N, E> std::fmt::Debug for ObservableGraph<N, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableGraph")
            .field("guard", &self.inner.guard)
            .field("feed", &self.inner.feed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ChangeKind;
    use crate::value::{Cause, ObservableValue};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Graph = ObservableGraph<&'static str, u32>;

    fn triangle() -> (Graph, Node<&'static str>, Node<&'static str>, Node<&'static str>) {
        let graph = Graph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(&a, &b, true, 1).unwrap();
        graph.add_edge(&b, &c, false, 2).unwrap();
        graph.add_edge(&c, &a, true, 3).unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn self_loop_is_rejected() {
        let graph = Graph::new();
        let a = graph.add_node("a");

        let err = graph.add_edge(&a, &a, true, 0).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn foreign_node_is_rejected() {
        let graph = Graph::new();
        let other = Graph::new();
        let a = graph.add_node("a");
        let stranger = other.add_node("x");

        assert!(graph.add_edge(&a, &stranger, false, 0).is_err());
        assert!(graph.add_edge(&stranger, &a, false, 0).is_err());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn failed_add_edge_emits_nothing() {
        let graph = Graph::new();
        let a = graph.add_node("a");
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = graph.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let _ = graph.add_edge(&a, &a, false, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_node_cascades_in_one_session() {
        let (graph, a, b, c) = triangle();
        let sessions = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&sessions);
        let _sub = graph.subscribe(move |e| s.lock().push(e.session().cloned()));

        assert!(graph.remove_node(&a));
        assert!(!graph.contains_node(&a));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edges().snapshot().iter().all(|e| !e.touches(&a)));
        assert_eq!(graph.node_edges(&b).len(), 1);
        assert_eq!(graph.node_edges(&c).len(), 1);

        let sessions = sessions.lock();
        assert_eq!(sessions.len(), 3);
        assert!(sessions[0].is_some());
        assert!(sessions.iter().all(|s| *s == sessions[0]));
        assert_eq!(graph.stats().sessions_started(), 1);
    }

    #[test]
    fn remove_absent_node_is_a_no_op() {
        let (graph, a, ..) = triangle();
        assert!(graph.remove_node(&a));
        assert!(!graph.remove_node(&a));
        assert_eq!(graph.stats().sessions_started(), 1);
    }

    #[test]
    fn remove_edge() {
        let (graph, a, b, _) = triangle();
        let edge = graph.node_edges(&a).get(0).unwrap();
        assert!(graph.remove_edge(&edge));
        assert!(!graph.remove_edge(&edge));
        assert!(!graph.contains_edge(&edge));
        assert_eq!(graph.node_edges(&b).len(), 1);
    }

    #[test]
    fn replace_node_preserves_topology() {
        let (graph, a, b, c) = triangle();

        let a2 = graph.replace_node(&a, "a2").unwrap();
        assert!(!graph.contains_node(&a));
        assert_eq!(graph.nodes().index_of(&a2), Some(0));
        assert_eq!(graph.node_count(), 3);

        let edges = graph.edges().snapshot();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| !e.touches(&a)));

        assert_eq!(edges[0].start(), &a2);
        assert_eq!(edges[0].end(), &b);
        assert!(edges[0].is_directed());
        assert_eq!(*edges[0].value(), 1);

        assert_eq!(edges[2].start(), &c);
        assert_eq!(edges[2].end(), &a2);
        assert_eq!(*edges[2].value(), 3);
        assert_eq!(graph.node_edges(&b).len(), 2);
    }

    #[test]
    fn replaced_node_keeps_both_directions_in_neighbour_view() {
        let graph = Graph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        graph.add_edge(&a, &b, true, 1).unwrap();
        graph.add_edge(&b, &a, true, 2).unwrap();
        let of_b = graph.node_edges(&b);

        let a2 = graph.replace_node(&a, "a2").unwrap();

        let edges = of_b.snapshot();
        assert_eq!(of_b.len(), 2);
        assert!(edges.iter().all(|e| e.touches(&a2) && !e.touches(&a)));
        assert_eq!((edges[0].start(), edges[0].end()), (&a2, &b));
        assert_eq!((edges[1].start(), edges[1].end()), (&b, &a2));
        assert_eq!(graph.node_edges(&a2).len(), 2);
    }

    #[test]
    fn replace_node_is_one_session() {
        let (graph, a, ..) = triangle();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let k = Arc::clone(&kinds);
        let _sub = graph.subscribe(move |e| {
            let kind = match e {
                GraphEvent::Node(n) => ("node", n.kind),
                GraphEvent::Edge(e) => ("edge", e.kind),
            };
            k.lock().push(kind);
        });

        graph.replace_node(&a, "a2").unwrap();
        assert_eq!(
            *kinds.lock(),
            vec![
                ("node", ChangeKind::Add),
                ("edge", ChangeKind::Set),
                ("edge", ChangeKind::Set),
                ("node", ChangeKind::Remove),
            ]
        );
        assert_eq!(graph.stats().sessions_started(), 1);
    }

    #[test]
    fn replace_absent_node() {
        let graph = Graph::new();
        let other = Graph::new();
        let stranger = other.add_node("x");
        assert!(graph.replace_node(&stranger, "y").is_none());
    }

    #[test]
    fn node_edges_track_later_additions() {
        let graph = Graph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let view = graph.node_edges(&a);
        assert!(view.is_empty());

        let added = Arc::new(AtomicUsize::new(0));
        let n = Arc::clone(&added);
        let _sub = view.subscribe(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });

        let edge = graph.add_edge(&b, &a, true, 7).unwrap();
        assert_eq!(view.snapshot(), vec![edge]);
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn directional_views() {
        let (graph, a, ..) = triangle();
        let out: Vec<u32> = graph
            .outward_edges(&a)
            .snapshot()
            .iter()
            .map(|e| *e.value())
            .collect();
        let inward: Vec<u32> = graph
            .inward_edges(&a)
            .snapshot()
            .iter()
            .map(|e| *e.value())
            .collect();
        assert_eq!(out, vec![1]);
        assert_eq!(inward, vec![3]);
    }

    #[test]
    fn find_node_by_value() {
        let (graph, _, b, _) = triangle();
        assert_eq!(graph.find_node(&"b"), Some(b));
        assert_eq!(graph.find_node(&"z"), None);
    }

    #[test]
    fn change_signal_coalesces_sessions() {
        let (graph, a, ..) = triangle();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let _sub = graph.subscribe_changes(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        graph.add_node("d");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        graph.remove_node(&a);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        drop(graph.start_transaction(None));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn channel_receives_sequenced_events() {
        let graph = Graph::new();
        let rx = graph.subscribe_channel();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        graph.add_edge(&a, &b, false, 0).unwrap();

        let seqs: Vec<u64> = rx.try_iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(graph.latest_sequence(), 3);
        assert!(matches!(graph.poll(2, 10)[0].event, GraphEvent::Edge(_)));
    }

    #[test]
    fn explicit_transaction_groups_mutations() {
        let graph = Graph::new();
        let session = graph.session();
        let causes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&causes);
        let _sub = session.subscribe(move |e| {
            c.lock()
                .push(e.cause.as_ref().and_then(|x| x.downcast_ref::<&str>()).copied());
        });

        {
            let _txn = graph.start_transaction(Some(Cause::new("import")));
            let a = graph.add_node("a");
            let b = graph.add_node("b");
            graph.add_edge(&a, &b, true, 1).unwrap();
            graph.remove_node(&a);
        }
        assert_eq!(*causes.lock(), vec![Some("import"), Some("import")]);
        assert!(session.get().is_none());
    }

    #[test]
    fn concurrent_readers_see_consistent_graph() {
        let graph: ObservableGraph<u32, u32> = ObservableGraph::new();
        let hub = graph.add_node(0);

        let writer = {
            let graph = graph.clone();
            let hub = hub.clone();
            std::thread::spawn(move || {
                for i in 1..200 {
                    let n = graph.add_node(i);
                    graph.add_edge(&hub, &n, false, i).unwrap();
                    if i % 3 == 0 {
                        graph.remove_node(&n);
                    }
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let graph = graph.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _read = graph.lock_read();
                        let nodes = graph.nodes().snapshot();
                        for edge in graph.edges().snapshot() {
                            assert!(nodes.contains(edge.start()));
                            assert!(nodes.contains(edge.end()));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(graph.edge_count(), graph.node_count() - 1);
    }
}
