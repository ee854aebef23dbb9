//! Prometheus metrics definitions for proc-attrib-exporter.
//!
//! This module defines the metric families exported for processes and pages.
//! Engine-internal values are kept in KB and converted to bytes here, at the
//! export boundary, to follow Prometheus naming conventions.

use crate::config::Config;
use prometheus::{GaugeVec, Opts, Registry};

/// Collection of Prometheus metrics for process and page attribution.
#[derive(Clone)]
pub struct AttributionMetrics {
    pub process_cpu_percent: GaugeVec,
    pub process_cpu_time: GaugeVec,
    pub process_footprint: GaugeVec,
    pub process_frames: GaugeVec,

    pub page_cpu_time: GaugeVec,
    pub page_footprint: GaugeVec,
    pub page_frames: GaugeVec,
    pub page_estimate_age: GaugeVec,
}

impl AttributionMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let process_labels = &["pid", "name"];
        let page_labels = &["page"];

        let process_cpu_percent = GaugeVec::new(
            Opts::new(
                "proc_attrib_process_cpu_percent",
                "CPU usage per process in percent (delta over the last measurement window)",
            ),
            process_labels,
        )?;
        let process_cpu_time = GaugeVec::new(
            Opts::new(
                "proc_attrib_process_cpu_time_seconds",
                "Cumulative CPU time per process in seconds",
            ),
            process_labels,
        )?;
        let process_footprint = GaugeVec::new(
            Opts::new(
                "proc_attrib_process_private_footprint_bytes",
                "Private memory footprint per process in bytes",
            ),
            process_labels,
        )?;
        let process_frames = GaugeVec::new(
            Opts::new(
                "proc_attrib_process_frames",
                "Number of frames hosted by the process",
            ),
            process_labels,
        )?;

        let page_cpu_time = GaugeVec::new(
            Opts::new(
                "proc_attrib_page_cpu_time_seconds",
                "Estimated cumulative CPU time attributed to the page in seconds",
            ),
            page_labels,
        )?;
        let page_footprint = GaugeVec::new(
            Opts::new(
                "proc_attrib_page_private_footprint_bytes",
                "Estimated private memory footprint attributed to the page in bytes",
            ),
            page_labels,
        )?;
        let page_frames = GaugeVec::new(
            Opts::new(
                "proc_attrib_page_frames",
                "Number of frames owned by the page",
            ),
            page_labels,
        )?;
        let page_estimate_age = GaugeVec::new(
            Opts::new(
                "proc_attrib_page_estimate_age_seconds",
                "Seconds since the page's usage estimate was last updated",
            ),
            page_labels,
        )?;

        registry.register(Box::new(process_cpu_percent.clone()))?;
        registry.register(Box::new(process_cpu_time.clone()))?;
        registry.register(Box::new(process_footprint.clone()))?;
        registry.register(Box::new(process_frames.clone()))?;

        registry.register(Box::new(page_cpu_time.clone()))?;
        registry.register(Box::new(page_footprint.clone()))?;
        registry.register(Box::new(page_frames.clone()))?;
        registry.register(Box::new(page_estimate_age.clone()))?;

        Ok(Self {
            process_cpu_percent,
            process_cpu_time,
            process_footprint,
            process_frames,
            page_cpu_time,
            page_footprint,
            page_frames,
            page_estimate_age,
        })
    }

    /// Resets all metrics to zero (used before updating with fresh data).
    pub fn reset(&self) {
        self.process_cpu_percent.reset();
        self.process_cpu_time.reset();
        self.process_footprint.reset();
        self.process_frames.reset();

        self.page_cpu_time.reset();
        self.page_footprint.reset();
        self.page_frames.reset();
        self.page_estimate_age.reset();
    }

    /// Sets metric values for a specific process.
    pub fn set_for_process(
        &self,
        pid: &str,
        name: &str,
        cpu_percent: f64,
        cpu_time_seconds: f64,
        footprint_kb: u64,
        frames: usize,
        cfg: &Config,
    ) {
        let labels = &[pid, name];

        if cfg.enable_cpu.unwrap_or(true) {
            self.process_cpu_percent
                .with_label_values(labels)
                .set(cpu_percent);
            self.process_cpu_time
                .with_label_values(labels)
                .set(cpu_time_seconds);
        }
        if cfg.enable_memory.unwrap_or(true) {
            self.process_footprint
                .with_label_values(labels)
                .set((footprint_kb * 1024) as f64);
        }
        self.process_frames
            .with_label_values(labels)
            .set(frames as f64);
    }

    /// Sets metric values for a specific page.
    pub fn set_for_page(
        &self,
        page: &str,
        cpu_time_seconds: f64,
        footprint_kb: f64,
        frames: usize,
        estimate_age_seconds: Option<f64>,
        cfg: &Config,
    ) {
        let labels = &[page];

        if cfg.enable_cpu.unwrap_or(true) {
            self.page_cpu_time
                .with_label_values(labels)
                .set(cpu_time_seconds);
        }
        if cfg.enable_memory.unwrap_or(true) {
            self.page_footprint
                .with_label_values(labels)
                .set(footprint_kb * 1024.0);
        }
        self.page_frames.with_label_values(labels).set(frames as f64);
        if let Some(age) = estimate_age_seconds {
            self.page_estimate_age.with_label_values(labels).set(age);
        }
    }
}
