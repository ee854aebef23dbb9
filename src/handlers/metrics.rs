//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler that formats and
//! returns process and page attribution metrics in Prometheus text format.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    // Wait until no measurement cycle is in flight; estimates are only valid
    // once a full batch has been distributed.
    loop {
        let status = *state.cycle_status.read().await;
        if !status.in_progress {
            let graph = state.graph.read().await;

            // Update cycle metadata metrics
            state.cycle_duration.set(status.duration_seconds);
            state
                .cycle_success
                .set(if status.success { 1.0 } else { 0.0 });
            state.cycle_running.set(0.0);

            // Reset metrics before populating with fresh data
            state.metrics.reset();

            let cfg = &state.config;
            let now = Instant::now();

            let mut process_count = 0usize;
            for (_, process) in graph.processes() {
                process_count += 1;
                let pid_str = process.pid.to_string();
                state.metrics.set_for_process(
                    &pid_str,
                    &process.name,
                    process.cpu_usage_percent,
                    process.cumulative_cpu_usage.as_secs_f64(),
                    process.private_footprint_kb,
                    process.frame_count(),
                    cfg,
                );
            }

            let mut page_count = 0usize;
            for (_, page) in graph.pages() {
                page_count += 1;
                let age = page
                    .usage_estimate_time
                    .map(|t| now.saturating_duration_since(t).as_secs_f64());
                state.metrics.set_for_page(
                    &page.name,
                    page.cumulative_cpu_usage_estimate.as_secs_f64(),
                    page.private_footprint_kb_estimate,
                    page.frame_count(),
                    age,
                    cfg,
                );
            }

            drop(graph);

            state.processes_total.set(process_count as f64);
            state.pages_total.set(page_count as f64);
            state.scrape_duration.set(start.elapsed().as_secs_f64());

            // Encode metrics in Prometheus text format
            let families = state.registry.gather();
            let mut buffer = Vec::with_capacity(BUFFER_CAP);
            let encoder = TextEncoder::new();

            if encoder.encode(&families, &mut buffer).is_err() {
                error!("Failed to encode Prometheus metrics");
                return Err(MetricsError::EncodingFailed);
            }

            debug!(
                "Metrics request completed: {} processes, {} pages, {} bytes, {:.3}ms",
                process_count,
                page_count,
                buffer.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );

            return String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed);
        }

        // Wait for notification that the measurement cycle is complete
        state.cycle_ready.notified().await;
    }
}
