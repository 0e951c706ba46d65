//! Stress tests for obsv structures.
//!
//! These runs mix writer and reader threads on one shared structure and
//! verify the structure's invariants from the reader side while writes are
//! in flight.

use crate::generators::check_graph_consistency;
use obsv_core::{ObservableGraph, ObservableMap, ObservableMultiMap, Transactable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations that completed and passed their checks.
    pub successful_ops: usize,
    /// Operations that observed a violated invariant.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Logs a summary of the run.
    pub fn log_summary(&self, name: &str) {
        info!(
            test = name,
            total = self.total_ops,
            successful = self.successful_ops,
            failed = self.failed_ops,
            duration = ?self.duration,
            ops_per_second = self.ops_per_second,
            "stress run finished"
        );
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per writer thread.
    pub operations: usize,
    /// Number of writer threads.
    pub writers: usize,
    /// Number of reader threads.
    pub readers: usize,
    /// Mutations grouped into each explicit transaction.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            writers: 2,
            readers: 4,
            batch_size: 8,
        }
    }
}

impl StressConfig {
    /// Creates a configuration small enough for unit tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 100,
            writers: 2,
            readers: 2,
            batch_size: 4,
        }
    }
}

/// Runs writers that grow and prune a graph while readers check that every
/// edge's endpoints are members.
pub fn stress_concurrent_graph(
    graph: &ObservableGraph<usize, usize>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let hub = graph.add_node(usize::MAX);
    let start = Instant::now();

    thread::scope(|scope| {
        for writer in 0..config.writers {
            let hub = hub.clone();
            let successful = Arc::clone(&successful);
            scope.spawn(move || {
                for i in 0..config.operations {
                    let node = graph.add_node(writer * config.operations + i);
                    if graph.add_edge(&hub, &node, i % 2 == 0, i).is_ok() {
                        successful.fetch_add(1, Ordering::Relaxed);
                    }
                    if i % 4 == 3 {
                        graph.remove_node(&node);
                    } else if i % 4 == 1 {
                        let _ = graph.replace_node(&node, i);
                    }
                }
            });
        }
        for _ in 0..config.readers {
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            scope.spawn(move || {
                for _ in 0..config.operations {
                    let _read = graph.lock_read();
                    match check_graph_consistency(graph) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs writers that rewrite their keys in batches while readers check that a
/// batch is never seen half-applied.
///
/// Each batch writes the same value to every key of its writer, inside one
/// transaction. Readers therefore always see one value per writer.
pub fn stress_batched_map(
    map: &ObservableMap<(usize, usize), usize>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    thread::scope(|scope| {
        for writer in 0..config.writers {
            let successful = Arc::clone(&successful);
            scope.spawn(move || {
                for round in 0..config.operations {
                    map.put_all((0..config.batch_size).map(|slot| ((writer, slot), round)));
                    successful.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
        for _ in 0..config.readers {
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            scope.spawn(move || {
                for _ in 0..config.operations {
                    let _read = map.lock_read();
                    let consistent = (0..config.writers).all(|writer| {
                        let first = map.get(&(writer, 0));
                        (1..config.batch_size).all(|slot| map.get(&(writer, slot)) == first)
                    });
                    if consistent {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs writers that add and remove values while readers check that no key
/// is ever visible without values.
pub fn stress_multimap_collapse(
    map: &ObservableMultiMap<usize, usize>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    thread::scope(|scope| {
        for writer in 0..config.writers {
            let successful = Arc::clone(&successful);
            scope.spawn(move || {
                for i in 0..config.operations {
                    let key = writer;
                    map.add(key, i);
                    if i % 2 == 1 {
                        map.remove(&key, &(i - 1));
                        map.remove(&key, &i);
                    }
                    successful.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
        for _ in 0..config.readers {
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            scope.spawn(move || {
                for _ in 0..config.operations {
                    let _read = map.lock_read();
                    if map.keys().iter().all(|key| !map.get(key).is_empty()) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
