//! Measurement batch types consumed by the distributor.
//!
//! A batch is a point-in-time snapshot produced by a measurement source (the
//! /proc collector, or a test fixture): one cumulative CPU/footprint tuple
//! per measured process, bracketed by the wall-clock window of the scan.

use std::time::{Duration, Instant};

/// One process's measurement within a batch.
#[derive(Debug, Clone)]
pub struct ProcessMeasurement {
    pub pid: u32,
    /// Total CPU time consumed by the process since it started (monotonic).
    pub cumulative_cpu_usage: Duration,
    /// Private memory footprint at measurement time, in KB.
    pub private_footprint_kb: u64,
}

/// A point-in-time snapshot of per-process measurements.
///
/// Transient: consumed once per distribution cycle and then discarded.
#[derive(Debug, Clone)]
pub struct MeasurementBatch {
    pub batch_started_time: Instant,
    pub batch_ended_time: Instant,
    pub measurements: Vec<ProcessMeasurement>,
}

impl MeasurementBatch {
    pub fn new(batch_started_time: Instant, batch_ended_time: Instant) -> Self {
        Self {
            batch_started_time,
            batch_ended_time,
            measurements: Vec::new(),
        }
    }

    pub fn push(&mut self, pid: u32, cumulative_cpu_usage: Duration, private_footprint_kb: u64) {
        self.measurements.push(ProcessMeasurement {
            pid,
            cumulative_cpu_usage,
            private_footprint_kb,
        });
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}
