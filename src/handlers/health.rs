//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics for the measurement cycles.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let cycle = *state.cycle_status.read().await;

    // Derive HTTP status from the last measurement cycle
    let status = if cycle.success && cycle.last_completed.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    // Short status message for human-readable heading
    let message = if cycle.in_progress {
        "OK - Measurement cycle running"
    } else if cycle.success {
        "OK"
    } else {
        "Measurement cycle failed"
    };

    // Render plain-text table from HealthStats
    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}"),
    )
}
