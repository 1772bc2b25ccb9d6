//! Health probes and the metrics endpoint.

use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::middleware::metrics::MetricsSnapshot;
use crate::state::AppState;

/// Liveness probe: 200 while the process runs.
pub async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when session storage answers, 503 otherwise.
pub async fn readiness(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.sessions.ping().await?;
    Ok("ready")
}

/// Current request counters.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
