//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the background measurement-cycle task.

use prometheus::{Gauge, Registry};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::collector::Collector;
use crate::config::Config;
use crate::distributor::MeasurementDistributor;
use crate::graph::CoordinationGraph;
use crate::health_stats::HealthStats;
use crate::metrics::AttributionMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Bookkeeping for the most recent measurement cycle.
#[derive(Clone, Copy, Default)]
pub struct CycleStatus {
    pub last_completed: Option<Instant>,
    pub duration_seconds: f64,
    pub success: bool,
    pub in_progress: bool,
}

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: AttributionMetrics,
    pub scrape_duration: Gauge,
    pub processes_total: Gauge,
    pub pages_total: Gauge,
    pub cycle_duration: Gauge,
    pub cycle_success: Gauge,
    pub cycle_running: Gauge,
    pub graph: RwLock<CoordinationGraph>,
    /// Serializes batches: at most one distribution may be in flight.
    pub distributor: Mutex<MeasurementDistributor>,
    pub collector: Collector,
    pub cycle_status: RwLock<CycleStatus>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Notification for measurement cycle completion.
    pub cycle_ready: Arc<Notify>,
}
