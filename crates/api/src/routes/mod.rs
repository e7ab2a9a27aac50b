//! API routes.

pub mod health;
pub mod resources;
pub mod stats;
pub mod stream;

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Compression skips text/event-stream, so /stream is left untouched.
    Router::new()
        .route("/stream", get(stream::stream_handler))
        .route("/stats/:granularity", get(stats::stats_handler))
        .route("/resources/recent", get(resources::recent_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
