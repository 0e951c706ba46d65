//! Live filtered sub-graphs.

use super::element::{Edge, Node};
use super::store::ObservableGraph;
use crate::collection::FilteredView;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A read-only, live sub-graph selected by node and edge value predicates.
///
/// An edge belongs to the sub-graph only when its own value and both of
/// its endpoints pass, so every edge's endpoints are nodes of the
/// sub-graph. Nothing is cached: every view re-evaluates the predicates
/// against the source graph.
pub struct FilteredGraph<N, E> {
    graph: ObservableGraph<N, E>,
    node_pred: Predicate<N>,
    edge_pred: Predicate<E>,
}

impl<N, E> Clone for FilteredGraph<N, E> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            node_pred: Arc::clone(&self.node_pred),
            edge_pred: Arc::clone(&self.edge_pred),
        }
    }
}

impl<N, E> FilteredGraph<N, E>
where
    N: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new(
        graph: ObservableGraph<N, E>,
        node_pred: Predicate<N>,
        edge_pred: Predicate<E>,
    ) -> Self {
        Self {
            graph,
            node_pred,
            edge_pred,
        }
    }

    /// Returns the graph this view selects from.
    pub fn source(&self) -> &ObservableGraph<N, E> {
        &self.graph
    }

    /// Returns true if `node` would be selected, regardless of membership.
    pub fn accepts_node(&self, node: &Node<N>) -> bool {
        (self.node_pred)(node.value())
    }

    /// Returns true if `edge` would be selected, regardless of membership.
    pub fn accepts_edge(&self, edge: &Edge<N, E>) -> bool {
        edge_passes(&self.node_pred, &self.edge_pred, edge)
    }

    /// Returns a live view of the selected nodes.
    pub fn nodes(&self) -> FilteredView<Node<N>> {
        let node_pred = Arc::clone(&self.node_pred);
        self.graph.nodes().filter(move |node| node_pred(node.value()))
    }

    /// Returns a live view of the selected edges.
    pub fn edges(&self) -> FilteredView<Edge<N, E>> {
        let (node_pred, edge_pred) = (Arc::clone(&self.node_pred), Arc::clone(&self.edge_pred));
        self.graph
            .edges()
            .filter(move |edge| edge_passes(&node_pred, &edge_pred, edge))
    }

    /// Returns a live view of the selected edges touching `node`.
    pub fn node_edges(&self, node: &Node<N>) -> FilteredView<Edge<N, E>> {
        let node = node.clone();
        let (node_pred, edge_pred) = (Arc::clone(&self.node_pred), Arc::clone(&self.edge_pred));
        self.graph
            .edges()
            .filter(move |edge| edge.touches(&node) && edge_passes(&node_pred, &edge_pred, edge))
    }

    /// Returns true if `node` is in the source graph and selected.
    pub fn contains_node(&self, node: &Node<N>) -> bool {
        self.accepts_node(node) && self.graph.contains_node(node)
    }

    /// Returns true if `edge` is in the source graph and selected.
    pub fn contains_edge(&self, edge: &Edge<N, E>) -> bool {
        self.accepts_edge(edge) && self.graph.contains_edge(edge)
    }

    /// Returns the number of selected nodes.
    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    /// Returns the number of selected edges.
    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }
}

impl<N, E> std::fmt::Debug for FilteredGraph<N, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredGraph")
            .field("source", &self.graph)
            .finish_non_exhaustive()
    }
}

fn edge_passes<N, E>(
    node_pred: &Predicate<N>,
    edge_pred: &Predicate<E>,
    edge: &Edge<N, E>,
) -> bool {
    edge_pred(edge.value()) && node_pred(edge.start().value()) && node_pred(edge.end().value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ChangeKind;
    use parking_lot::Mutex;

    type Graph = ObservableGraph<u32, &'static str>;

    fn small_only(graph: &Graph) -> FilteredGraph<u32, &'static str> {
        graph.filter(|n| *n < 10, |e| !e.starts_with('x'))
    }

    #[test]
    fn selects_nodes_and_edges_by_value() {
        let graph = Graph::new();
        let a = graph.add_node(1);
        let b = graph.add_node(2);
        let big = graph.add_node(50);
        let ab = graph.add_edge(&a, &b, true, "ab").unwrap();
        let hidden = graph.add_edge(&b, &a, true, "xba").unwrap();
        let to_big = graph.add_edge(&a, &big, false, "abig").unwrap();

        let view = small_only(&graph);
        assert_eq!(view.nodes().snapshot(), vec![a.clone(), b.clone()]);
        assert_eq!(view.edges().snapshot(), vec![ab.clone()]);
        assert!(!view.contains_node(&big));
        assert!(!view.contains_edge(&hidden));
        assert!(!view.contains_edge(&to_big));
        assert!(view.accepts_edge(&ab));
        assert_eq!(view.node_edges(&a).snapshot(), vec![ab]);
        assert_eq!((view.node_count(), view.edge_count()), (2, 1));
    }

    #[test]
    fn tracks_later_additions_and_removals() {
        let graph = Graph::new();
        let view = small_only(&graph);
        let nodes = view.nodes();
        let edges = view.edges();

        let node_log = Arc::new(Mutex::new(Vec::new()));
        let n = Arc::clone(&node_log);
        let _nodes_sub = nodes.subscribe(move |e| n.lock().push((e.kind, e.index)));
        let edge_log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&edge_log);
        let _edges_sub = edges.subscribe(move |e| l.lock().push((e.kind, e.index)));

        let a = graph.add_node(1);
        graph.add_node(99);
        let b = graph.add_node(2);
        let ab = graph.add_edge(&a, &b, false, "ab").unwrap();
        graph.add_edge(&a, &b, false, "xab").unwrap();
        assert_eq!(view.edge_count(), 1);

        graph.remove_node(&b);

        assert_eq!(nodes.snapshot(), vec![a]);
        assert!(edges.is_empty());
        assert!(!view.contains_edge(&ab));
        assert_eq!(
            *node_log.lock(),
            vec![
                (ChangeKind::Add, 0),
                (ChangeKind::Add, 1),
                (ChangeKind::Remove, 1),
            ]
        );
        assert_eq!(
            *edge_log.lock(),
            vec![(ChangeKind::Add, 0), (ChangeKind::Remove, 0)]
        );
    }

    #[test]
    fn replacement_moves_edges_in_and_out_of_the_view() {
        let graph = Graph::new();
        let a = graph.add_node(1);
        let b = graph.add_node(2);
        graph.add_edge(&a, &b, true, "ab").unwrap();
        let view = small_only(&graph);
        assert_eq!(view.edge_count(), 1);

        let grown = graph.replace_node(&b, 20).unwrap();
        assert_eq!(view.edge_count(), 0);
        assert!(!view.contains_node(&grown));

        let shrunk = graph.replace_node(&grown, 3).unwrap();
        assert_eq!(view.node_edges(&shrunk).len(), 1);
        assert_eq!(view.node_count(), 2);
    }
}
