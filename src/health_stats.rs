//! Running statistics for the /health endpoint.
//!
//! Tracks measurement-cycle behavior over the exporter's lifetime and renders
//! it as a plain-text table. Fed from two places: the cycle task records scan
//! counts and durations, and a distributor observer records what each
//! completed distribution attributed to pages.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

use crate::distributor::MeasurementObserver;
use crate::graph::CoordinationGraph;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns (last, avg, max, min, count).
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

pub struct HealthStats {
    started_at: Instant,
    measured_processes: Stat,
    cycle_duration_seconds: Stat,
    attributed_page_cpu_seconds: Stat,
    total_cycles: AtomicU64,
    total_distributions: AtomicU64,
}

impl HealthStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            measured_processes: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            attributed_page_cpu_seconds: Stat::default(),
            total_cycles: AtomicU64::new(0),
            total_distributions: AtomicU64::new(0),
        }
    }

    pub fn record_cycle(&self, measured: u64, cycle_duration_seconds: f64) {
        self.measured_processes.add_sample(measured as f64);
        self.cycle_duration_seconds
            .add_sample(cycle_duration_seconds);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_distribution(&self, attributed_page_cpu_seconds: f64) {
        self.attributed_page_cpu_seconds
            .add_sample(attributed_page_cpu_seconds);
        self.total_distributions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Renders the collected statistics as a plain-text table.
    pub fn render_table(&self) -> String {
        let (mp_cur, mp_avg, mp_max, mp_min, _) = self.measured_processes.snapshot();
        let (cd_cur, cd_avg, cd_max, cd_min, _) = self.cycle_duration_seconds.snapshot();
        let (pc_cur, pc_avg, pc_max, pc_min, _) = self.attributed_page_cpu_seconds.snapshot();
        let cycles = self.total_cycles.load(Ordering::Relaxed);
        let distributions = self.total_distributions.load(Ordering::Relaxed);

        let left_col = 28usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "measured processes",
            format!("{:.0}", mp_cur),
            format!("{:.1}", mp_avg),
            format!("{:.0}", mp_max),
            format!("{:.0}", mp_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "cycle duration (s)",
            format!("{:.3}", cd_cur),
            format!("{:.3}", cd_avg),
            format!("{:.3}", cd_max),
            format!("{:.3}", cd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "attributed page cpu (s)",
            format!("{:.3}", pc_cur),
            format!("{:.3}", pc_avg),
            format!("{:.3}", pc_max),
            format!("{:.3}", pc_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "number of done cycles: {}", cycles).ok();
        writeln!(out, "number of distributions: {}", distributions).ok();
        writeln!(out, "uptime: {}s", self.uptime_seconds()).ok();

        out
    }
}

/// Distributor observer feeding cycle statistics into `HealthStats`.
pub struct HealthObserver {
    stats: Arc<HealthStats>,
}

impl HealthObserver {
    pub fn new(stats: Arc<HealthStats>) -> Self {
        Self { stats }
    }
}

impl MeasurementObserver for HealthObserver {
    fn on_process_cpu_usage_ready(&self, graph: &CoordinationGraph) {
        let attributed: f64 = graph
            .pages()
            .map(|(_, page)| page.cumulative_cpu_usage_estimate.as_secs_f64())
            .sum();
        self.stats.record_distribution(attributed);
        debug!(
            "distribution complete: {:.3}s total page CPU attributed",
            attributed
        );
    }
}
