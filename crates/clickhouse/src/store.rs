//! Storage seam for the pipeline.
//!
//! Ingestion, refresh workers, rollups and the read API all talk to storage
//! through [`PipelineStore`]. [`ClickHouseClient`](crate::ClickHouseClient)
//! is the production implementation.

use crate::client::ClickHouseClient;
use crate::{insert, query};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{
    Dimension, Event, EventRecord, Granularity, MetadataRecord, PersistedEvent, ResourceMetadata,
    Result, StatisticBucket,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Filter for reading statistic buckets back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketQuery {
    pub granularity: Granularity,
    pub dimension: Option<Dimension>,
    /// Inclusive lower bound on `bucket_start`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `bucket_start`.
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl BucketQuery {
    pub const DEFAULT_LIMIT: u32 = 1000;

    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            dimension: None,
            from: None,
            to: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Whether a stored bucket satisfies the filter.
    pub fn matches(&self, bucket: &StatisticBucket) -> bool {
        self.dimension.map_or(true, |d| d == bucket.dimension)
            && self.from.map_or(true, |from| bucket.bucket_start >= from)
            && self.to.map_or(true, |to| bucket.bucket_start < to)
    }
}

#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert events that are not stored yet and return only those.
    ///
    /// Duplicates inside `events` collapse to their first occurrence and ids
    /// already stored are skipped without error.
    async fn persist_events(&self, events: &[Event]) -> Result<Vec<PersistedEvent>>;

    /// Replace the stored snapshot for a resource, creating it if new.
    async fn upsert_metadata(&self, metadata: &ResourceMetadata) -> Result<()>;

    /// Events with `from <= occurred_at < to`.
    async fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>>;

    /// Metadata snapshots with `from <= updated_at < to`.
    async fn metadata_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetadataRecord>>;

    /// The most recently updated snapshots, newest first.
    async fn recent_metadata(&self, limit: usize) -> Result<Vec<ResourceMetadata>>;

    /// Swap out every row of one dimension in one bucket for `rows`.
    async fn replace_bucket(
        &self,
        granularity: Granularity,
        dimension: Dimension,
        bucket_start: DateTime<Utc>,
        rows: &[StatisticBucket],
    ) -> Result<()>;

    /// Read stored buckets, ordered by `bucket_start` then count descending.
    async fn query_buckets(&self, query: &BucketQuery) -> Result<Vec<StatisticBucket>>;
}

#[async_trait]
impl PipelineStore for ClickHouseClient {
    async fn persist_events(&self, events: &[Event]) -> Result<Vec<PersistedEvent>> {
        insert::insert_new_events(self, events).await
    }

    async fn upsert_metadata(&self, metadata: &ResourceMetadata) -> Result<()> {
        insert::upsert_metadata(self, metadata).await
    }

    async fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>> {
        query::events_between(self, from, to).await
    }

    async fn metadata_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetadataRecord>> {
        query::metadata_between(self, from, to).await
    }

    async fn recent_metadata(&self, limit: usize) -> Result<Vec<ResourceMetadata>> {
        query::recent_metadata(self, limit).await
    }

    async fn replace_bucket(
        &self,
        granularity: Granularity,
        dimension: Dimension,
        bucket_start: DateTime<Utc>,
        rows: &[StatisticBucket],
    ) -> Result<()> {
        insert::replace_bucket(self, granularity, dimension, bucket_start, rows).await
    }

    async fn query_buckets(&self, filter: &BucketQuery) -> Result<Vec<StatisticBucket>> {
        query::query_buckets(self, filter).await
    }
}

/// Keep the first occurrence of every `event_id`, preserving order.
pub fn dedupe_batch(events: &[Event]) -> Vec<&Event> {
    let mut seen = HashSet::with_capacity(events.len());
    events
        .iter()
        .filter(|e| seen.insert(e.event_id.as_str()))
        .collect()
}
