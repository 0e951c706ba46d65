//! Property-based test generators using proptest.
//!
//! Operations refer to existing nodes and edges by a pick index that is
//! reduced modulo the current count when applied, so every generated
//! sequence is meaningful against whatever state earlier operations left.

use obsv_core::{ObservableGraph, ObservableMap, ObservableMultiMap};
use proptest::prelude::*;

/// A graph operation.
#[derive(Debug, Clone)]
pub enum GraphOperation {
    /// Add a node.
    AddNode {
        /// Node value
        value: u8,
    },
    /// Connect two existing nodes (possibly the same one, which must fail).
    AddEdge {
        /// Start node pick
        start: usize,
        /// End node pick
        end: usize,
        /// Whether the edge is directed
        directed: bool,
    },
    /// Remove an existing node.
    RemoveNode {
        /// Node pick
        pick: usize,
    },
    /// Remove an existing edge.
    RemoveEdge {
        /// Edge pick
        pick: usize,
    },
    /// Replace an existing node.
    ReplaceNode {
        /// Node pick
        pick: usize,
        /// Replacement value
        value: u8,
    },
}

/// Strategy for generating graph operations.
pub fn graph_operation_strategy() -> impl Strategy<Value = GraphOperation> {
    prop_oneof![
        3 => any::<u8>().prop_map(|value| GraphOperation::AddNode { value }),
        4 => (any::<usize>(), any::<usize>(), any::<bool>())
            .prop_map(|(start, end, directed)| GraphOperation::AddEdge { start, end, directed }),
        1 => any::<usize>().prop_map(|pick| GraphOperation::RemoveNode { pick }),
        1 => any::<usize>().prop_map(|pick| GraphOperation::RemoveEdge { pick }),
        1 => (any::<usize>(), any::<u8>())
            .prop_map(|(pick, value)| GraphOperation::ReplaceNode { pick, value }),
    ]
}

/// Strategy for generating a sequence of graph operations.
pub fn graph_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<GraphOperation>> {
    prop::collection::vec(graph_operation_strategy(), min_ops..max_ops)
}

/// Applies one operation. Operations that need a node or edge are skipped
/// when there is none.
pub fn apply_graph_operation(graph: &ObservableGraph<u8, u8>, op: &GraphOperation) {
    let nodes = graph.nodes().snapshot();
    let edges = graph.edges().snapshot();
    match *op {
        GraphOperation::AddNode { value } => {
            graph.add_node(value);
        }
        GraphOperation::AddEdge {
            start,
            end,
            directed,
        } => {
            if nodes.is_empty() {
                return;
            }
            let (start, end) = (&nodes[start % nodes.len()], &nodes[end % nodes.len()]);
            let result = graph.add_edge(start, end, directed, 0);
            assert_eq!(result.is_err(), start == end);
        }
        GraphOperation::RemoveNode { pick } => {
            if !nodes.is_empty() {
                assert!(graph.remove_node(&nodes[pick % nodes.len()]));
            }
        }
        GraphOperation::RemoveEdge { pick } => {
            if !edges.is_empty() {
                assert!(graph.remove_edge(&edges[pick % edges.len()]));
            }
        }
        GraphOperation::ReplaceNode { pick, value } => {
            if !nodes.is_empty() {
                assert!(graph.replace_node(&nodes[pick % nodes.len()], value).is_some());
            }
        }
    }
}

/// Checks the graph's structural invariants.
///
/// # Errors
///
/// Describes the first violated invariant.
pub fn check_graph_consistency<N, E>(graph: &ObservableGraph<N, E>) -> Result<(), String>
where
    N: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let nodes = graph.nodes().snapshot();
    for edge in graph.edges().snapshot() {
        if edge.start() == edge.end() {
            return Err(format!("{} is a self-loop", edge.id()));
        }
        for endpoint in [edge.start(), edge.end()] {
            if !nodes.contains(endpoint) {
                return Err(format!(
                    "{} references {}, which is not in the graph",
                    edge.id(),
                    endpoint.id()
                ));
            }
        }
    }
    Ok(())
}

/// A map operation over a small key space.
#[derive(Debug, Clone)]
pub enum MapOperation {
    /// Put a pair.
    Put {
        /// Key
        key: u8,
        /// Value
        value: u8,
    },
    /// Remove a key.
    Remove {
        /// Key
        key: u8,
    },
    /// Put several pairs in one transaction.
    PutAll {
        /// Pairs
        pairs: Vec<(u8, u8)>,
    },
}

/// Strategy for generating map operations over keys `0..8`.
pub fn map_operation_strategy() -> impl Strategy<Value = MapOperation> {
    prop_oneof![
        4 => (0u8..8, any::<u8>()).prop_map(|(key, value)| MapOperation::Put { key, value }),
        2 => (0u8..8).prop_map(|key| MapOperation::Remove { key }),
        1 => prop::collection::vec((0u8..8, any::<u8>()), 0..4)
            .prop_map(|pairs| MapOperation::PutAll { pairs }),
    ]
}

/// Applies one operation to the map and to a plain association-list model.
pub fn apply_map_operation(
    map: &ObservableMap<u8, u8>,
    model: &mut Vec<(u8, u8)>,
    op: &MapOperation,
) {
    fn model_put(model: &mut Vec<(u8, u8)>, key: u8, value: u8) -> Option<u8> {
        match model.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => Some(std::mem::replace(&mut pair.1, value)),
            None => {
                model.push((key, value));
                None
            }
        }
    }

    match op {
        MapOperation::Put { key, value } => {
            assert_eq!(map.put(*key, *value), model_put(model, *key, *value));
        }
        MapOperation::Remove { key } => {
            let expected = model
                .iter()
                .position(|(k, _)| k == key)
                .map(|i| model.remove(i).1);
            assert_eq!(map.remove(key), expected);
        }
        MapOperation::PutAll { pairs } => {
            map.put_all(pairs.iter().copied());
            for (key, value) in pairs {
                model_put(model, *key, *value);
            }
        }
    }
}

/// A multi-map operation over a small key and value space.
#[derive(Debug, Clone)]
pub enum MultiMapOperation {
    /// Add a value under a key.
    Add {
        /// Key
        key: u8,
        /// Value
        value: u8,
    },
    /// Remove one value from a key.
    Remove {
        /// Key
        key: u8,
        /// Value
        value: u8,
    },
    /// Remove a key entirely.
    RemoveAll {
        /// Key
        key: u8,
    },
}

/// Strategy for generating multi-map operations over keys `0..4` and values
/// `0..4`.
pub fn multimap_operation_strategy() -> impl Strategy<Value = MultiMapOperation> {
    prop_oneof![
        4 => (0u8..4, 0u8..4).prop_map(|(key, value)| MultiMapOperation::Add { key, value }),
        3 => (0u8..4, 0u8..4).prop_map(|(key, value)| MultiMapOperation::Remove { key, value }),
        1 => (0u8..4).prop_map(|key| MultiMapOperation::RemoveAll { key }),
    ]
}

/// Applies one operation, returning what the multi-map reported.
pub fn apply_multimap_operation(map: &ObservableMultiMap<u8, u8>, op: &MultiMapOperation) -> bool {
    match *op {
        MultiMapOperation::Add { key, value } => map.add(key, value),
        MultiMapOperation::Remove { key, value } => map.remove(&key, &value),
        MultiMapOperation::RemoveAll { key } => map.remove_all(&key),
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
