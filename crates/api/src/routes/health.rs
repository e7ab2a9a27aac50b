//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::{health, metrics, MetricsSnapshot};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = health();

    Json(HealthResponse {
        status: registry.status(),
        upstream_connected: registry.upstream.is_healthy(),
        clickhouse_connected: registry.clickhouse.is_healthy(),
        upstream_error: registry.upstream.last_error(),
        clickhouse_error: registry.clickhouse.last_error(),
        queue_depth: metrics().queue_depth.get(),
        subscribers: state.hub.subscriber_count(),
    })
}

/// GET /health/ready - Readiness probe (can accept traffic).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}

/// GET /metrics - Point-in-time pipeline counters.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
