//! Read paths: rollup inputs, recent snapshots and stored buckets.

use crate::client::{persistence_error, ClickHouseClient};
use crate::insert::{MetadataRow, StatsRow};
use crate::store::BucketQuery;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use pulse_core::{
    tags::parse_tag_list, Dimension, Error, EventRecord, MetadataRecord, ResourceMetadata, Result,
    StatisticBucket,
};
use serde::Deserialize;

/// DateTime64(3) columns travel as epoch milliseconds.
pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::persistence(format!("timestamp out of range: {}", ms)))
}

#[derive(Debug, Clone, Row, Deserialize)]
struct EventWindowRow {
    event_id: String,
    event_type: String,
    occurred_at: i64,
}

#[derive(Debug, Clone, Row, Deserialize)]
struct MetadataWindowRow {
    resource_key: String,
    language: Option<String>,
    tags: String,
    updated_at: i64,
}

/// Events that occurred in `[from, to)`.
pub async fn events_between(
    client: &ClickHouseClient,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<EventRecord>> {
    let rows: Vec<EventWindowRow> = client
        .inner()
        .query(
            "SELECT event_id, event_type, occurred_at \
             FROM events FINAL \
             WHERE occurred_at >= fromUnixTimestamp64Milli(?) AND occurred_at < fromUnixTimestamp64Milli(?)",
        )
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all()
        .await
        .map_err(|e| persistence_error("query events window", e))?;

    rows.into_iter()
        .map(|row| {
            Ok(EventRecord {
                event_id: row.event_id,
                event_type: row.event_type,
                occurred_at: from_millis(row.occurred_at)?,
            })
        })
        .collect()
}

/// Metadata snapshots refreshed in `[from, to)`. Tags come back raw.
pub async fn metadata_between(
    client: &ClickHouseClient,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<MetadataRecord>> {
    let rows: Vec<MetadataWindowRow> = client
        .inner()
        .query(
            "SELECT resource_key, language, tags, updated_at \
             FROM resource_metadata FINAL \
             WHERE updated_at >= fromUnixTimestamp64Milli(?) AND updated_at < fromUnixTimestamp64Milli(?)",
        )
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all()
        .await
        .map_err(|e| persistence_error("query metadata window", e))?;

    rows.into_iter()
        .map(|row| {
            Ok(MetadataRecord {
                resource_key: row.resource_key,
                language: row.language,
                tags_raw: row.tags,
                updated_at: from_millis(row.updated_at)?,
            })
        })
        .collect()
}

/// Most recently refreshed resources, newest first.
pub async fn recent_metadata(
    client: &ClickHouseClient,
    limit: usize,
) -> Result<Vec<ResourceMetadata>> {
    let rows: Vec<MetadataRow> = client
        .inner()
        .query(
            "SELECT resource_key, description, language, license, homepage, tags, \
             stars, forks, watchers, open_issues, created_at, pushed_at, updated_at \
             FROM resource_metadata FINAL \
             ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit as u64)
        .fetch_all()
        .await
        .map_err(|e| persistence_error("query recent metadata", e))?;

    rows.into_iter().map(metadata_from_row).collect()
}

fn metadata_from_row(row: MetadataRow) -> Result<ResourceMetadata> {
    Ok(ResourceMetadata {
        tags: parse_tag_list(&row.tags),
        created_at: row.created_at.map(from_millis).transpose()?,
        pushed_at: row.pushed_at.map(from_millis).transpose()?,
        updated_at: from_millis(row.updated_at)?,
        resource_key: row.resource_key,
        description: row.description,
        language: row.language,
        license: row.license,
        homepage: row.homepage,
        stars: row.stars,
        forks: row.forks,
        watchers: row.watchers,
        open_issues: row.open_issues,
    })
}

/// Stored buckets matching `query`.
pub async fn query_buckets(
    client: &ClickHouseClient,
    query: &BucketQuery,
) -> Result<Vec<StatisticBucket>> {
    let mut sql = format!(
        "SELECT dimension, dimension_value, count, bucket_start, generated_at \
         FROM {} WHERE 1 = 1",
        query.granularity.table()
    );
    if query.dimension.is_some() {
        sql.push_str(" AND dimension = ?");
    }
    if query.from.is_some() {
        sql.push_str(" AND bucket_start >= fromUnixTimestamp64Milli(?)");
    }
    if query.to.is_some() {
        sql.push_str(" AND bucket_start < fromUnixTimestamp64Milli(?)");
    }
    sql.push_str(" ORDER BY bucket_start ASC, count DESC, dimension_value ASC LIMIT ?");

    let mut q = client.inner().query(&sql);
    if let Some(dimension) = query.dimension {
        q = q.bind(dimension.as_str());
    }
    if let Some(from) = query.from {
        q = q.bind(from.timestamp_millis());
    }
    if let Some(to) = query.to {
        q = q.bind(to.timestamp_millis());
    }
    q = q.bind(query.limit);

    let rows: Vec<StatsRow> = q
        .fetch_all()
        .await
        .map_err(|e| persistence_error("query buckets", e))?;

    rows.into_iter()
        .map(|row| {
            Ok(StatisticBucket {
                dimension: row.dimension.parse::<Dimension>()?,
                dimension_value: row.dimension_value,
                count: row.count,
                bucket_start: from_millis(row.bucket_start)?,
                generated_at: from_millis(row.generated_at)?,
            })
        })
        .collect()
}

/// Count stored events.
pub async fn count_events(client: &ClickHouseClient) -> Result<u64> {
    client
        .inner()
        .query("SELECT count() FROM events FINAL")
        .fetch_one::<u64>()
        .await
        .map_err(|e| persistence_error("count events", e))
}

/// Drop every row from every pipeline table (test cleanup).
pub async fn truncate_all(client: &ClickHouseClient) -> Result<()> {
    for table in ["events", "resource_metadata", "stats_hourly", "stats_daily"] {
        client
            .inner()
            .query(&format!("TRUNCATE TABLE IF EXISTS {}", table))
            .execute()
            .await
            .map_err(|e| persistence_error("truncate", e))?;
    }
    Ok(())
}
