//! Cross-module integration scenarios.
//!
//! Each scenario builds its own structure, drives it through one behavior
//! end to end and asserts on both the final state and the events observers
//! received. They are public so downstream crates wrapping obsv structures
//! can rerun them against their own setup.

use crate::fixtures::{EventLog, SessionRecorder};
use obsv_core::{GraphEvent, ObservableGraph, Transactable};

/// Graph scenarios.
pub mod graph {
    use super::*;
    use obsv_core::ChangeKind;

    /// Removing a hub node takes every spoke edge with it, as one session.
    pub fn test_cascading_removal(spokes: usize) {
        let graph: ObservableGraph<usize, ()> = ObservableGraph::new();
        let hub = graph.add_node(0);
        for i in 1..=spokes {
            let spoke = graph.add_node(i);
            graph
                .add_edge(&hub, &spoke, true, ())
                .expect("spoke edge should be accepted");
        }

        let recorder = SessionRecorder::attach(&graph);
        let log = EventLog::new();
        let _sub = graph.subscribe(log.observer());

        assert!(graph.remove_node(&hub));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), spokes);
        assert_eq!(recorder.begins(), 1);
        assert!(recorder.is_balanced());

        let events: Vec<GraphEvent<usize, ()>> = log.events();
        assert_eq!(events.len(), spokes + 1);
        assert!(matches!(
            events.last(),
            Some(GraphEvent::Node(e)) if e.kind == ChangeKind::Remove
        ));
    }

    /// Replacing every node of a path keeps the path intact.
    pub fn test_replace_preserves_path(length: usize) {
        let graph: ObservableGraph<usize, usize> = ObservableGraph::new();
        let nodes: Vec<_> = (0..length).map(|i| graph.add_node(i)).collect();
        for (i, pair) in nodes.windows(2).enumerate() {
            graph
                .add_edge(&pair[0], &pair[1], true, i)
                .expect("path edge should be accepted");
        }

        for node in &nodes {
            graph
                .replace_node(node, node.value() + 100)
                .expect("node should still be present");
        }

        let current = graph.nodes().snapshot();
        let values: Vec<usize> = current.iter().map(|n| *n.value()).collect();
        assert_eq!(values, (100..100 + length).collect::<Vec<_>>());
        for edge in graph.edges().snapshot() {
            let i = *edge.value();
            assert_eq!(edge.start(), &current[i]);
            assert_eq!(edge.end(), &current[i + 1]);
            assert!(edge.is_directed());
        }
    }
}

/// Session scenarios.
pub mod sessions {
    use super::*;
    use obsv_core::{ObservableMap, ObservableMultiMap};

    /// Nested transactions across helper calls yield exactly one session.
    pub fn test_nested_batching() {
        let map: ObservableMap<u32, u32> = ObservableMap::new();
        let recorder = SessionRecorder::attach(&map);

        fn helper(map: &ObservableMap<u32, u32>, base: u32) {
            let _txn = map.start_transaction(None);
            map.put_all((base..base + 3).map(|k| (k, k)));
            map.remove(&base);
        }

        {
            let _outer = map.start_transaction(None);
            helper(&map, 0);
            helper(&map, 10);
            let _inner = map.lock_write();
            map.clear();
        }

        assert_eq!(recorder.begins(), 1);
        assert_eq!(recorder.ends(), 1);
        assert!(map.is_empty());
    }

    /// Separate structures have independent guards and sessions.
    pub fn test_independent_guards() {
        let map: ObservableMap<u8, u8> = ObservableMap::new();
        let multi: ObservableMultiMap<u8, u8> = ObservableMultiMap::new();
        let map_sessions = SessionRecorder::attach(&map);
        let multi_sessions = SessionRecorder::attach(&multi);

        {
            let _txn = map.start_transaction(None);
            multi.add_all(1, [1, 2]);
            map.put(1, 1);
        }

        assert_eq!(map_sessions.begins(), 1);
        assert_eq!(multi_sessions.begins(), 1);
        assert!(!map.guard().same_guard(multi.guard()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::init_test_tracing;

    #[test]
    fn test_cascading_removal() {
        init_test_tracing();
        graph::test_cascading_removal(5);
    }

    #[test]
    fn test_replace_preserves_path() {
        graph::test_replace_preserves_path(6);
    }

    #[test]
    fn test_nested_batching() {
        sessions::test_nested_batching();
    }

    #[test]
    fn test_independent_guards() {
        sessions::test_independent_guards();
    }
}
