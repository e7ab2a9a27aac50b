//! Rollup engine against the in-memory store.

use clickhouse_client::{BucketQuery, PipelineStore};
use integration_tests::{fixtures, mocks::MemoryStore};
use pulse_core::{Dimension, Granularity, StatisticBucket};
use std::sync::Arc;
use worker::RollupEngine;

/// Rows without `generated_at`, which differs between runs.
fn row_set(rows: &[StatisticBucket]) -> Vec<(Dimension, String, u64, String)> {
    let mut set: Vec<_> = rows
        .iter()
        .map(|r| {
            (
                r.dimension,
                r.dimension_value.clone(),
                r.count,
                r.bucket_start.to_rfc3339(),
            )
        })
        .collect();
    set.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
    set
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.seed_events([
        fixtures::event_at("e1", "PushEvent", "acme/a", fixtures::at(10, 5)),
        fixtures::event_at("e2", "PushEvent", "acme/b", fixtures::at(10, 30)),
        fixtures::event_at("e3", "WatchEvent", "acme/a", fixtures::at(10, 59)),
        // Next hour, outside the 10:00 bucket
        fixtures::event_at("e4", "ForkEvent", "acme/c", fixtures::at(11, 0)),
    ]);
    store.seed_raw_metadata(
        fixtures::metadata("acme/a", Some("Rust"), &[], fixtures::at(10, 10)),
        r#"["CLI","async"]"#,
    );
    store.seed_raw_metadata(
        fixtures::metadata("acme/b", Some("Kotlin"), &[], fixtures::at(10, 20)),
        r#""[\"kotlin\",\"spring\"]""#,
    );
    store.seed_raw_metadata(
        fixtures::metadata("acme/c", None, &[], fixtures::at(10, 40)),
        "not json at all",
    );
    store
}

#[tokio::test]
async fn test_hourly_rollup_counts_every_dimension() {
    let store = seeded_store();
    let engine = RollupEngine::new(store.clone());

    let report = engine
        .run(Granularity::Hourly, fixtures::at(11, 5))
        .await
        .expect("rollup");
    assert_eq!(report.bucket_start, fixtures::at(10, 0));
    assert!(report.skipped_dimensions.is_empty());
    assert_eq!(report.unparseable_tags, 1);

    let rows = store
        .query_buckets(&BucketQuery::new(Granularity::Hourly))
        .await
        .unwrap();
    let count = |dimension: Dimension, value: &str| {
        rows.iter()
            .find(|r| r.dimension == dimension && r.dimension_value == value)
            .map(|r| r.count)
    };

    assert_eq!(count(Dimension::Category, "PushEvent"), Some(2));
    assert_eq!(count(Dimension::Category, "WatchEvent"), Some(1));
    assert_eq!(count(Dimension::Category, "ForkEvent"), None);

    // Double-encoded tags are unwrapped; the undecodable record is skipped.
    assert_eq!(count(Dimension::Tag, "kotlin"), Some(1));
    assert_eq!(count(Dimension::Tag, "spring"), Some(1));
    assert_eq!(count(Dimension::Tag, "cli"), Some(1));
    assert_eq!(count(Dimension::Tag, "async"), Some(1));

    assert_eq!(count(Dimension::Language, "Rust"), Some(1));
    assert_eq!(count(Dimension::Language, "Kotlin"), Some(1));
    assert_eq!(report.rows_written, rows.len());
}

#[tokio::test]
async fn test_rerun_yields_identical_rows() {
    let store = seeded_store();
    let engine = RollupEngine::new(store.clone());

    engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 0))
        .await
        .unwrap();
    let first = row_set(&store.buckets(Granularity::Hourly));

    engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 0))
        .await
        .unwrap();
    let second = row_set(&store.buckets(Granularity::Hourly));

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

/// A rerun after the data changed leaves no stale values behind.
#[tokio::test]
async fn test_rerun_replaces_stale_values() {
    let store = MemoryStore::new();
    store.seed_raw_metadata(
        fixtures::metadata("acme/a", Some("Go"), &[], fixtures::at(10, 10)),
        r#"["old-tag"]"#,
    );
    let engine = RollupEngine::new(store.clone());
    engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 0))
        .await
        .unwrap();

    store.seed_raw_metadata(
        fixtures::metadata("acme/a", Some("Go"), &[], fixtures::at(10, 10)),
        r#"["new-tag"]"#,
    );
    engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 0))
        .await
        .unwrap();

    let tags: Vec<String> = store
        .buckets(Granularity::Hourly)
        .into_iter()
        .filter(|r| r.dimension == Dimension::Tag)
        .map(|r| r.dimension_value)
        .collect();
    assert_eq!(tags, vec!["new-tag".to_string()]);
}

/// Records still in the window but no longer yielding values clear the
/// slice instead of leaving the previous run's rows behind.
#[tokio::test]
async fn test_rerun_clears_dimensions_that_lost_their_values() {
    let store = MemoryStore::new();
    store.seed_raw_metadata(
        fixtures::metadata("acme/a", Some("Go"), &[], fixtures::at(10, 10)),
        r#"["old-tag"]"#,
    );
    let engine = RollupEngine::new(store.clone());
    engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 0))
        .await
        .unwrap();
    assert_eq!(store.buckets(Granularity::Hourly).len(), 2);

    store.seed_raw_metadata(
        fixtures::metadata("acme/a", None, &[], fixtures::at(10, 10)),
        "garbage",
    );
    let report = engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 0))
        .await
        .unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.unparseable_tags, 1);
    assert_eq!(report.skipped_dimensions, vec![Dimension::Category]);
    assert!(store.buckets(Granularity::Hourly).is_empty());
}

#[tokio::test]
async fn test_empty_window_writes_nothing() {
    let store = seeded_store();
    let engine = RollupEngine::new(store.clone());

    let report = engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(3, 0))
        .await
        .unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.skipped_dimensions, Dimension::ALL.to_vec());
    assert!(store.buckets(Granularity::Hourly).is_empty());
}

/// Only the category dimension has data: the others are skipped, not zeroed.
#[tokio::test]
async fn test_partially_empty_window() {
    let store = MemoryStore::new();
    store.seed_events([fixtures::event_at(
        "e1",
        "PushEvent",
        "acme/a",
        fixtures::at(10, 5),
    )]);
    let engine = RollupEngine::new(store.clone());

    let report = engine
        .run_for_bucket(Granularity::Hourly, fixtures::at(10, 30))
        .await
        .unwrap();

    assert_eq!(report.rows_written, 1);
    assert_eq!(
        report.skipped_dimensions,
        vec![Dimension::Tag, Dimension::Language]
    );
}

#[tokio::test]
async fn test_daily_rollup_spans_the_whole_day() {
    let store = seeded_store();
    let engine = RollupEngine::new(store.clone());

    let report = engine
        .run_for_bucket(Granularity::Daily, fixtures::at(17, 0))
        .await
        .unwrap();
    assert_eq!(report.bucket_start, fixtures::at(0, 0));

    let categories = store
        .query_buckets(&BucketQuery {
            dimension: Some(Dimension::Category),
            ..BucketQuery::new(Granularity::Daily)
        })
        .await
        .unwrap();

    // Ordered by count descending within the bucket.
    assert_eq!(categories[0].dimension_value, "PushEvent");
    assert_eq!(categories[0].count, 2);
    assert_eq!(categories.len(), 3);
    assert!(store.buckets(Granularity::Hourly).is_empty());
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let store = seeded_store();
    store.set_should_fail(true);
    let engine = RollupEngine::new(store.clone());

    let err = engine
        .run(Granularity::Hourly, fixtures::at(11, 5))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some("DB_001"));
}
