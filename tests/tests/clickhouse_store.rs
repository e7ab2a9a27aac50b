//! `PipelineStore` against a real ClickHouse server.
//!
//! Requires Docker (or `PULSE_TEST_CLICKHOUSE_URL`); run with
//! `cargo test -p integration-tests --test clickhouse_store -- --ignored`.

use clickhouse_client::{
    query::{count_events, truncate_all},
    BucketQuery, PipelineStore,
};
use integration_tests::{containers::TestContainers, fixtures};
use pulse_core::{tags::parse_tag_list, Dimension, Granularity, StatisticBucket};

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_persist_events_is_idempotent() {
    let containers = TestContainers::start().await;
    let client = containers.client().await;
    truncate_all(&client).await.expect("truncate");

    let e1 = fixtures::event("ch-1", "PushEvent", "acme/a");
    let e2 = fixtures::event("ch-2", "WatchEvent", "acme/b");

    let first = client
        .persist_events(&[e1.clone(), e1.clone(), e2.clone()])
        .await
        .expect("first insert");
    assert_eq!(first.len(), 2);
    assert_ne!(first[0].internal_id, first[1].internal_id);

    let second = client.persist_events(&[e1, e2]).await.expect("second insert");
    assert!(second.is_empty());
    assert_eq!(count_events(&client).await.unwrap(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_metadata_last_write_wins() {
    let containers = TestContainers::start().await;
    let client = containers.client().await;
    truncate_all(&client).await.expect("truncate");

    client
        .upsert_metadata(&fixtures::metadata("acme/a", Some("Go"), &["old"], fixtures::at(10, 0)))
        .await
        .unwrap();
    client
        .upsert_metadata(&fixtures::metadata("acme/a", Some("Rust"), &["new"], fixtures::at(10, 30)))
        .await
        .unwrap();

    let recent = client.recent_metadata(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].language.as_deref(), Some("Rust"));
    assert_eq!(recent[0].tags, vec!["new".to_string()]);

    let records = client
        .metadata_between(fixtures::at(10, 0), fixtures::at(11, 0))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(parse_tag_list(&records[0].tags_raw), vec!["new".to_string()]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_replace_bucket_swaps_rows() {
    let containers = TestContainers::start().await;
    let client = containers.client().await;
    truncate_all(&client).await.expect("truncate");

    let row = |value: &str, count: u64| StatisticBucket {
        dimension: Dimension::Tag,
        dimension_value: value.to_string(),
        count,
        bucket_start: fixtures::at(10, 0),
        generated_at: fixtures::at(11, 5),
    };

    client
        .replace_bucket(
            Granularity::Hourly,
            Dimension::Tag,
            fixtures::at(10, 0),
            &[row("stale", 1), row("rust", 2)],
        )
        .await
        .unwrap();
    client
        .replace_bucket(
            Granularity::Hourly,
            Dimension::Tag,
            fixtures::at(10, 0),
            &[row("rust", 5)],
        )
        .await
        .unwrap();

    let rows = client
        .query_buckets(&BucketQuery::new(Granularity::Hourly))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dimension_value, "rust");
    assert_eq!(rows[0].count, 5);
    assert_eq!(rows[0].bucket_start, fixtures::at(10, 0));

    let events = client
        .events_between(fixtures::at(0, 0), fixtures::at(23, 0))
        .await
        .unwrap();
    assert!(events.is_empty());
}
