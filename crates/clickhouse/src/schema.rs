//! ClickHouse table schemas.
//!
//! - DateTime64(3) for millisecond precision, written as epoch millis
//! - LowCardinality for enum-like fields
//! - ReplacingMergeTree where a key must stay unique; reads use FINAL

/// Raw activity events. `event_id` is the dedup key.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id String,
    internal_id String,
    event_type LowCardinality(String),
    actor_ref String,
    resource_ref String,
    payload_summary String,
    is_public UInt8,
    occurred_at DateTime64(3),
    inserted_at DateTime DEFAULT now()
)
ENGINE = ReplacingMergeTree()
PARTITION BY toYYYYMM(occurred_at)
ORDER BY event_id
SETTINGS index_granularity = 8192
"#;

/// Latest snapshot per resource; the newest `updated_at` wins on merge.
pub const CREATE_RESOURCE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS resource_metadata (
    resource_key String,
    description Nullable(String),
    language Nullable(String),
    license Nullable(String),
    homepage Nullable(String),
    tags String,
    stars UInt64,
    forks UInt64,
    watchers UInt64,
    open_issues UInt64,
    created_at Nullable(DateTime64(3)),
    pushed_at Nullable(DateTime64(3)),
    updated_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY resource_key
SETTINGS index_granularity = 8192
"#;

/// Hourly rollups.
pub const CREATE_STATS_HOURLY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stats_hourly (
    dimension LowCardinality(String),
    dimension_value String,
    count UInt64,
    bucket_start DateTime64(3),
    generated_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(bucket_start)
ORDER BY (dimension, bucket_start, dimension_value)
TTL toDateTime(bucket_start) + INTERVAL 90 DAY
"#;

/// Daily rollups.
pub const CREATE_STATS_DAILY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stats_daily (
    dimension LowCardinality(String),
    dimension_value String,
    count UInt64,
    bucket_start DateTime64(3),
    generated_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYear(bucket_start)
ORDER BY (dimension, bucket_start, dimension_value)
"#;

/// Database creation statement.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", database)
}

/// All table creation statements, run against the pipeline database.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_EVENTS_TABLE,
        CREATE_RESOURCE_METADATA_TABLE,
        CREATE_STATS_HOURLY_TABLE,
        CREATE_STATS_DAILY_TABLE,
    ]
}
