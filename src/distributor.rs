//! Distribution of per-process measurement batches across the graph.
//!
//! Each batch updates every process node's CPU/memory fields and apportions
//! CPU and memory usage to the pages owning frames in the measured processes.
//! The computation is synchronous and the caller must not overlap batches:
//! the distributor assumes at most one invocation in flight.

use ahash::AHashSet as HashSet;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::graph::{CoordinationGraph, PageId, ProcessId};
use crate::measurement::MeasurementBatch;

/// Notified after a batch has been fully distributed.
///
/// Observers receive read access to the updated graph; estimates are only
/// valid once this fires, since partial states are never exposed.
pub trait MeasurementObserver: Send + Sync {
    fn on_process_cpu_usage_ready(&self, graph: &CoordinationGraph);
}

/// Consumes measurement batches and annotates the coordination graph.
#[derive(Default)]
pub struct MeasurementDistributor {
    last_batch_ended: Option<Instant>,
    observers: Vec<Box<dyn MeasurementObserver>>,
}

impl MeasurementDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for the end-of-batch broadcast. Observers are
    /// invoked synchronously, in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn MeasurementObserver>) {
        self.observers.push(observer);
    }

    /// Distributes one batch over the graph.
    ///
    /// The elapsed window is measured from the previous batch's end time to
    /// this one's; the exact acquisition time of each individual measurement
    /// is unknowable, and the batch end is a single proxy that averages out
    /// over many cycles. The first batch has a zero window.
    pub fn distribute(&mut self, graph: &mut CoordinationGraph, batch: &MeasurementBatch) {
        debug_assert!(
            batch.batch_ended_time >= batch.batch_started_time,
            "measurement batch ended before it started"
        );

        let elapsed = self
            .last_batch_ended
            .map_or(Duration::ZERO, |previous_ended| {
                batch.batch_ended_time.saturating_duration_since(previous_ended)
            });
        self.last_batch_ended = Some(batch.batch_ended_time);

        let mut found_processes: HashSet<ProcessId> = HashSet::new();
        let mut touched_pages: HashSet<PageId> = HashSet::new();

        for measurement in &batch.measurements {
            let Some(process_id) = graph.process_by_pid(measurement.pid) else {
                // Process not yet registered in the graph; a transient
                // startup race, not an error.
                debug!("no process node for pid {}, skipping measurement", measurement.pid);
                continue;
            };

            let previous_cpu = graph.process(process_id).cumulative_cpu_usage;
            debug_assert!(
                measurement.cumulative_cpu_usage >= previous_cpu,
                "cumulative CPU counter went backwards for pid {}",
                measurement.pid
            );
            let delta = measurement
                .cumulative_cpu_usage
                .saturating_sub(previous_cpu);

            // Fan the delta out across the process's frames. The integer
            // division remainder is not distributed and not added to the
            // stored counter, so it reappears in the next cycle's delta.
            let frame_ids = graph.process(process_id).frame_ids().to_vec();
            let distributed = if frame_ids.is_empty() {
                delta
            } else {
                let share = Duration::from_micros(
                    (delta.as_micros() / frame_ids.len() as u128) as u64,
                );
                for frame_id in &frame_ids {
                    let page_id = graph.frame(*frame_id).page_id;
                    let page = graph.page_mut(page_id);
                    page.cumulative_cpu_usage_estimate += share;
                    page.usage_estimate_time = Some(batch.batch_ended_time);
                    touched_pages.insert(page_id);
                }
                share * frame_ids.len() as u32
            };

            let process = graph.process_mut(process_id);
            process.cpu_usage_percent = if previous_cpu.is_zero() || elapsed.is_zero() {
                // First-ever measurement is the baseline; there is no prior
                // reading to compute a rate against.
                0.0
            } else {
                100.0 * delta.as_micros() as f64 / elapsed.as_micros() as f64
            };
            process.cumulative_cpu_usage = previous_cpu + distributed;
            process.private_footprint_kb = measurement.private_footprint_kb;
            found_processes.insert(process_id);
        }

        // A process absent from this batch is assumed idle or unmeasurable
        // this cycle; zero its instantaneous values rather than leaving stale
        // data. The cumulative counter is untouched.
        let absent: Vec<ProcessId> = graph
            .process_ids()
            .filter(|id| !found_processes.contains(id))
            .collect();
        for process_id in absent {
            let process = graph.process_mut(process_id);
            process.cpu_usage_percent = 0.0;
            process.private_footprint_kb = 0;
        }

        // Memory is recomputed from scratch each cycle, unlike the CPU
        // estimate which accumulates: each frame contributes an even split of
        // its process's footprint.
        for page_id in &touched_pages {
            let mut estimate_kb = 0.0f64;
            for frame_id in graph.page(*page_id).frame_ids() {
                let process_id = graph.frame(*frame_id).process_id;
                let process = graph.process(process_id);
                estimate_kb +=
                    process.private_footprint_kb as f64 / process.frame_count() as f64;
            }
            graph.page_mut(*page_id).private_footprint_kb_estimate = estimate_kb;
        }

        for observer in &self.observers {
            observer.on_process_cpu_usage_ready(graph);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn batch(
        started: Instant,
        ended: Instant,
        measurements: &[(u32, u64, u64)],
    ) -> MeasurementBatch {
        let mut batch = MeasurementBatch::new(started, ended);
        for &(pid, cpu_us, footprint_kb) in measurements {
            batch.push(pid, Duration::from_micros(cpu_us), footprint_kb);
        }
        batch
    }

    /// One process (pid 100) hosting a single frame owned by one page.
    fn single_page_single_process() -> (CoordinationGraph, ProcessId, PageId) {
        let mut graph = CoordinationGraph::new();
        let process = graph.add_process(100, "renderer");
        let page = graph.add_page("page-a");
        graph.add_frame(process, page);
        (graph, process, page)
    }

    #[test]
    fn test_first_batch_is_percent_baseline_but_distributes_raw_delta() {
        let (mut graph, process, page) = single_page_single_process();
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 1_000_000, 50_000)]),
        );

        // Only the percentage is baseline-gated; frame distribution uses the
        // raw delta even on the very first batch.
        assert_eq!(graph.process(process).cpu_usage_percent, 0.0);
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(1_000_000)
        );
        assert_eq!(graph.process(process).private_footprint_kb, 50_000);
        assert_eq!(
            graph.page(page).cumulative_cpu_usage_estimate,
            Duration::from_micros(1_000_000)
        );
        assert_eq!(graph.page(page).private_footprint_kb_estimate, 50_000.0);
        assert_eq!(
            graph.page(page).usage_estimate_time,
            Some(t0 + Duration::from_secs(1))
        );
    }

    #[test]
    fn test_second_batch_computes_percent_from_delta() {
        let (mut graph, process, page) = single_page_single_process();
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 1_000_000, 50_000)]),
        );
        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[(100, 1_300_000, 52_000)],
            ),
        );

        // 300,000us over a 1s window.
        assert!((graph.process(process).cpu_usage_percent - 30.0).abs() < 1e-9);
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(1_300_000)
        );
        assert_eq!(
            graph.page(page).cumulative_cpu_usage_estimate,
            Duration::from_micros(1_300_000)
        );
        assert_eq!(graph.page(page).private_footprint_kb_estimate, 52_000.0);
    }

    #[test]
    fn test_absent_process_zeroed_but_counter_kept() {
        let mut graph = CoordinationGraph::new();
        let p1 = graph.add_process(100, "renderer-1");
        let p2 = graph.add_process(200, "renderer-2");
        let page = graph.add_page("page-a");
        graph.add_frame(p1, page);
        graph.add_frame(p2, page);
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(
                t0,
                t0 + Duration::from_secs(1),
                &[(100, 1_000_000, 10_000), (200, 2_000_000, 20_000)],
            ),
        );
        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[(100, 1_500_000, 10_000)],
            ),
        );

        assert_eq!(graph.process(p2).cpu_usage_percent, 0.0);
        assert_eq!(graph.process(p2).private_footprint_kb, 0);
        assert_eq!(
            graph.process(p2).cumulative_cpu_usage,
            Duration::from_micros(2_000_000)
        );
        assert!((graph.process(p1).cpu_usage_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_remainder_deferred_to_next_cycle() {
        // Three frames, all on one page, delta of 10us: each frame receives
        // floor(10/3) = 3us and the stored counter advances by 9us, leaving
        // the remaining 1us to inflate the next delta.
        let mut graph = CoordinationGraph::new();
        let process = graph.add_process(100, "renderer");
        let page = graph.add_page("page-a");
        graph.add_frame(process, page);
        graph.add_frame(process, page);
        graph.add_frame(process, page);
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 10, 100)]),
        );

        assert_eq!(
            graph.page(page).cumulative_cpu_usage_estimate,
            Duration::from_micros(9)
        );
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(9)
        );

        // Next cycle reports 20us total: delta = 20 - 9 = 11us, inflated by
        // exactly the 1us held back above. 3 * floor(11/3) = 9us distributed.
        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[(100, 20, 100)],
            ),
        );

        assert_eq!(
            graph.page(page).cumulative_cpu_usage_estimate,
            Duration::from_micros(18)
        );
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(18)
        );
    }

    #[test]
    fn test_zero_elapsed_window_zeroes_percent() {
        let (mut graph, process, _) = single_page_single_process();
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);

        distributor.distribute(&mut graph, &batch(t0, t1, &[(100, 1_000_000, 100)]));
        // Second batch ends at the same instant as the first: zero window.
        distributor.distribute(&mut graph, &batch(t1, t1, &[(100, 9_000_000, 100)]));

        assert_eq!(graph.process(process).cpu_usage_percent, 0.0);
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(9_000_000)
        );
    }

    #[test]
    fn test_page_aggregates_across_processes() {
        let mut graph = CoordinationGraph::new();
        let p1 = graph.add_process(100, "renderer-1");
        let p2 = graph.add_process(200, "renderer-2");
        let page = graph.add_page("page-a");
        graph.add_frame(p1, page);
        graph.add_frame(p2, page);
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(
                t0,
                t0 + Duration::from_secs(1),
                &[(100, 100, 10_000), (200, 50, 20_000)],
            ),
        );

        // s1 + s2 from two different processes land on the same page.
        assert_eq!(
            graph.page(page).cumulative_cpu_usage_estimate,
            Duration::from_micros(150)
        );
        assert_eq!(graph.page(page).private_footprint_kb_estimate, 30_000.0);
    }

    #[test]
    fn test_process_with_multiple_pages_splits_evenly() {
        let mut graph = CoordinationGraph::new();
        let process = graph.add_process(100, "renderer");
        let page_a = graph.add_page("page-a");
        let page_b = graph.add_page("page-b");
        graph.add_frame(process, page_a);
        graph.add_frame(process, page_b);
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 10, 8_000)]),
        );

        assert_eq!(
            graph.page(page_a).cumulative_cpu_usage_estimate,
            Duration::from_micros(5)
        );
        assert_eq!(
            graph.page(page_b).cumulative_cpu_usage_estimate,
            Duration::from_micros(5)
        );
        // Footprint likewise splits across the process's two frames.
        assert_eq!(graph.page(page_a).private_footprint_kb_estimate, 4_000.0);
        assert_eq!(graph.page(page_b).private_footprint_kb_estimate, 4_000.0);
    }

    #[test]
    fn test_unknown_pid_is_skipped() {
        let (mut graph, process, page) = single_page_single_process();
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        // pid 999 has no node; the known process is absent and gets zeroed.
        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(999, 1_000_000, 100)]),
        );

        assert_eq!(graph.process(process).cpu_usage_percent, 0.0);
        assert_eq!(graph.process(process).private_footprint_kb, 0);
        assert_eq!(graph.process(process).cumulative_cpu_usage, Duration::ZERO);
        assert_eq!(
            graph.page(page).cumulative_cpu_usage_estimate,
            Duration::ZERO
        );
    }

    #[test]
    fn test_frameless_process_adopts_full_delta() {
        let mut graph = CoordinationGraph::new();
        let process = graph.add_process(100, "gpu-helper");
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 500, 100)]),
        );
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(500)
        );
        assert_eq!(graph.process(process).cpu_usage_percent, 0.0);

        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[(100, 800, 100)],
            ),
        );
        assert_eq!(
            graph.process(process).cumulative_cpu_usage,
            Duration::from_micros(800)
        );
        // 300us over a 1s window.
        assert!((graph.process(process).cpu_usage_percent - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_footprint_recomputed_not_accumulated() {
        let (mut graph, _, page) = single_page_single_process();
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 100, 40_000)]),
        );
        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[(100, 200, 10_000)],
            ),
        );

        // The estimate tracks the latest reading, it does not accumulate.
        assert_eq!(graph.page(page).private_footprint_kb_estimate, 10_000.0);
    }

    #[test]
    fn test_absent_process_contributes_zero_footprint() {
        let mut graph = CoordinationGraph::new();
        let p1 = graph.add_process(100, "renderer-1");
        let p2 = graph.add_process(200, "renderer-2");
        let page = graph.add_page("page-a");
        graph.add_frame(p1, page);
        graph.add_frame(p2, page);
        let mut distributor = MeasurementDistributor::new();
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(
                t0,
                t0 + Duration::from_secs(1),
                &[(100, 100, 10_000), (200, 100, 20_000)],
            ),
        );
        assert_eq!(graph.page(page).private_footprint_kb_estimate, 30_000.0);

        // Pid 200 drops out; its zeroed footprint flows into the recomputed
        // page estimate through the shared frame.
        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[(100, 200, 10_000)],
            ),
        );
        assert_eq!(graph.page(page).private_footprint_kb_estimate, 10_000.0);
    }

    struct CountingObserver {
        calls: Arc<AtomicUsize>,
        pages_seen: Arc<AtomicUsize>,
    }

    impl MeasurementObserver for CountingObserver {
        fn on_process_cpu_usage_ready(&self, graph: &CoordinationGraph) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages_seen.store(graph.page_count(), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observers_notified_after_distribution() {
        let (mut graph, _, _) = single_page_single_process();
        let calls = Arc::new(AtomicUsize::new(0));
        let pages_seen = Arc::new(AtomicUsize::new(0));
        let mut distributor = MeasurementDistributor::new();
        distributor.add_observer(Box::new(CountingObserver {
            calls: calls.clone(),
            pages_seen: pages_seen.clone(),
        }));
        let t0 = Instant::now();

        distributor.distribute(
            &mut graph,
            &batch(t0, t0 + Duration::from_secs(1), &[(100, 100, 100)]),
        );
        distributor.distribute(
            &mut graph,
            &batch(
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                &[],
            ),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(pages_seen.load(Ordering::SeqCst), 1);
    }
}
