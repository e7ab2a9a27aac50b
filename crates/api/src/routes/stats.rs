//! Rollup read endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use clickhouse_client::BucketQuery;
use pulse_core::{Dimension, Granularity};
use serde::Deserialize;

use crate::response::{ApiError, StatsResponse};
use crate::state::AppState;

/// Upper bound on rows per response.
pub const MAX_STATS_LIMIT: u32 = 10_000;

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub dimension: Option<String>,
    /// Inclusive lower bound on bucket start (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on bucket start (RFC 3339)
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl StatsParams {
    /// Validate the parameters and build the store query.
    pub fn to_query(&self, granularity: Granularity) -> Result<BucketQuery, ApiError> {
        let mut errors = Vec::new();

        let dimension = match self.dimension.as_deref().map(str::parse::<Dimension>) {
            None => None,
            Some(Ok(dimension)) => Some(dimension),
            Some(Err(_)) => {
                errors.push(format!(
                    "dimension must be one of category, tag, language (got {:?})",
                    self.dimension.as_deref().unwrap_or_default()
                ));
                None
            }
        };

        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from >= to {
                errors.push("from must be earlier than to".to_string());
            }
        }

        let limit = self.limit.unwrap_or(BucketQuery::DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_STATS_LIMIT {
            errors.push(format!("limit must be between 1 and {}", MAX_STATS_LIMIT));
        }

        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }

        Ok(BucketQuery {
            granularity,
            dimension,
            from: self.from,
            to: self.to,
            limit,
        })
    }
}

/// GET /stats/:granularity - Statistic buckets for a granularity and window.
pub async fn stats_handler(
    State(state): State<AppState>,
    Path(granularity): Path<String>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let granularity: Granularity = granularity
        .parse()
        .map_err(|_| ApiError::bad_request(format!("unknown granularity: {}", granularity)))?;
    let query = params.to_query(granularity)?;

    let buckets = state
        .stats_cache
        .get_or_query(state.store.as_ref(), &query)
        .await?;

    Ok(Json(StatsResponse {
        granularity,
        dimension: query.dimension,
        from: query.from,
        to: query.to,
        count: buckets.len(),
        buckets: buckets.as_ref().clone(),
    }))
}
