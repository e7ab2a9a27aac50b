//! Recent resource snapshots.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::response::{ApiError, RecentResponse};
use crate::state::AppState;

pub const MAX_RECENT_LIMIT: usize = 1_000;

#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

/// GET /resources/recent - Most recently refreshed resources, newest first.
///
/// Defaults to the stream snapshot size.
pub async fn recent_handler(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<RecentResponse>, ApiError> {
    let limit = params.limit.unwrap_or(state.snapshot_size);
    if limit == 0 || limit > MAX_RECENT_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_RECENT_LIMIT
        )));
    }

    let resources = state.store.recent_metadata(limit).await?;
    Ok(Json(RecentResponse {
        count: resources.len(),
        resources,
    }))
}
