//! Write paths: batch event insert, metadata upsert, bucket replacement.

use crate::client::{persistence_error, ClickHouseClient};
use crate::store::dedupe_batch;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use pulse_core::{
    Dimension, Event, Granularity, PersistedEvent, ResourceMetadata, Result, StatisticBucket,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use telemetry::metrics;
use tracing::debug;
use uuid::Uuid;

/// Flattened event row.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub internal_id: String,
    pub event_type: String,
    pub actor_ref: String,
    pub resource_ref: String,
    pub payload_summary: String,
    pub is_public: u8,
    pub occurred_at: i64, // DateTime64(3) as milliseconds
}

impl EventRow {
    fn new(event: &Event, internal_id: Uuid) -> Self {
        Self {
            event_id: event.event_id.clone(),
            internal_id: internal_id.to_string(),
            event_type: event.event_type.clone(),
            actor_ref: event.actor_ref.clone(),
            resource_ref: event.resource_ref.clone(),
            payload_summary: event.payload_summary.clone(),
            is_public: u8::from(event.is_public),
            occurred_at: event.occurred_at.timestamp_millis(),
        }
    }
}

/// Metadata snapshot row. Tags are stored as a JSON string.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct MetadataRow {
    pub resource_key: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub tags: String,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub created_at: Option<i64>,
    pub pushed_at: Option<i64>,
    pub updated_at: i64,
}

impl From<&ResourceMetadata> for MetadataRow {
    fn from(meta: &ResourceMetadata) -> Self {
        Self {
            resource_key: meta.resource_key.clone(),
            description: meta.description.clone(),
            language: meta.language.clone(),
            license: meta.license.clone(),
            homepage: meta.homepage.clone(),
            tags: serde_json::to_string(&meta.tags).unwrap_or_else(|_| "[]".to_string()),
            stars: meta.stars,
            forks: meta.forks,
            watchers: meta.watchers,
            open_issues: meta.open_issues,
            created_at: meta.created_at.map(|t| t.timestamp_millis()),
            pushed_at: meta.pushed_at.map(|t| t.timestamp_millis()),
            updated_at: meta.updated_at.timestamp_millis(),
        }
    }
}

/// Statistic row, shared by the hourly and daily tables.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct StatsRow {
    pub dimension: String,
    pub dimension_value: String,
    pub count: u64,
    pub bucket_start: i64,
    pub generated_at: i64,
}

impl From<&StatisticBucket> for StatsRow {
    fn from(bucket: &StatisticBucket) -> Self {
        Self {
            dimension: bucket.dimension.as_str().to_string(),
            dimension_value: bucket.dimension_value.clone(),
            count: bucket.count,
            bucket_start: bucket.bucket_start.timestamp_millis(),
            generated_at: bucket.generated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct EventIdRow {
    event_id: String,
}

/// Ids from `ids` that are already stored.
async fn existing_event_ids(client: &ClickHouseClient, ids: &[&str]) -> Result<HashSet<String>> {
    let rows: Vec<EventIdRow> = client
        .inner()
        .query("SELECT DISTINCT event_id FROM events WHERE has(?, event_id)")
        .bind(ids)
        .fetch_all()
        .await
        .map_err(|e| persistence_error("lookup existing events", e))?;

    Ok(rows.into_iter().map(|r| r.event_id).collect())
}

/// Insert events whose ids are not stored yet.
///
/// Returns the rows actually written so callers only dispatch refresh work
/// for genuinely new events.
pub async fn insert_new_events(
    client: &ClickHouseClient,
    events: &[Event],
) -> Result<Vec<PersistedEvent>> {
    let batch = dedupe_batch(events);
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let ids: Vec<&str> = batch.iter().map(|e| e.event_id.as_str()).collect();
    let existing = existing_event_ids(client, &ids).await?;

    let fresh: Vec<&Event> = batch
        .into_iter()
        .filter(|e| !existing.contains(&e.event_id))
        .collect();

    let duplicates = events.len() - fresh.len();
    metrics().events_duplicate.inc_by(duplicates as u64);

    if fresh.is_empty() {
        debug!(duplicates = duplicates, "No new events in batch");
        return Ok(Vec::new());
    }

    let mut insert = client.inner().insert("events").map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("insert events", e)
    })?;

    let mut persisted = Vec::with_capacity(fresh.len());
    for event in fresh {
        let internal_id = Uuid::new_v4();
        insert
            .write(&EventRow::new(event, internal_id))
            .await
            .map_err(|e| {
                metrics().clickhouse_insert_errors.inc();
                persistence_error("write event row", e)
            })?;
        persisted.push(PersistedEvent {
            resource_key: event.resource_ref.clone(),
            event_id: event.event_id.clone(),
            internal_id,
        });
    }

    insert.end().await.map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("finish event insert", e)
    })?;

    let elapsed = start.elapsed();
    metrics().clickhouse_latency_ms.observe(elapsed.as_millis() as u64);
    metrics().clickhouse_inserts.inc();
    metrics().events_persisted.inc_by(persisted.len() as u64);

    debug!(
        inserted = persisted.len(),
        duplicates = duplicates,
        latency_ms = %elapsed.as_millis(),
        "Inserted events"
    );

    Ok(persisted)
}

/// Write a metadata snapshot. The newest `updated_at` wins on merge.
pub async fn upsert_metadata(client: &ClickHouseClient, meta: &ResourceMetadata) -> Result<()> {
    let start = Instant::now();
    let row = MetadataRow::from(meta);

    let mut insert = client.inner().insert("resource_metadata").map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("insert metadata", e)
    })?;

    insert.write(&row).await.map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("write metadata row", e)
    })?;

    insert.end().await.map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("finish metadata insert", e)
    })?;

    metrics()
        .clickhouse_latency_ms
        .observe(start.elapsed().as_millis() as u64);
    metrics().clickhouse_inserts.inc();

    Ok(())
}

/// Delete one dimension's rows for a bucket, then insert the new set.
pub async fn replace_bucket(
    client: &ClickHouseClient,
    granularity: Granularity,
    dimension: Dimension,
    bucket_start: DateTime<Utc>,
    rows: &[StatisticBucket],
) -> Result<()> {
    let start = Instant::now();
    let table = granularity.table();

    client
        .inner()
        .query(&format!(
            "DELETE FROM {} WHERE dimension = ? AND bucket_start = fromUnixTimestamp64Milli(?)",
            table
        ))
        .bind(dimension.as_str())
        .bind(bucket_start.timestamp_millis())
        .execute()
        .await
        .map_err(|e| persistence_error("delete bucket rows", e))?;

    if rows.is_empty() {
        return Ok(());
    }

    let mut insert = client.inner().insert(table).map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("insert bucket rows", e)
    })?;

    for bucket in rows {
        insert.write(&StatsRow::from(bucket)).await.map_err(|e| {
            metrics().clickhouse_insert_errors.inc();
            persistence_error("write bucket row", e)
        })?;
    }

    insert.end().await.map_err(|e| {
        metrics().clickhouse_insert_errors.inc();
        persistence_error("finish bucket insert", e)
    })?;

    let elapsed = start.elapsed();
    metrics().clickhouse_latency_ms.observe(elapsed.as_millis() as u64);
    metrics().clickhouse_inserts.inc();

    debug!(
        table = table,
        dimension = %dimension,
        bucket_start = %bucket_start,
        rows = rows.len(),
        latency_ms = %elapsed.as_millis(),
        "Replaced bucket rows"
    );

    Ok(())
}
