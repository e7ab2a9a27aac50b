//! Tests for the read API and the live stream.

use api::{router, state::StatsCache, AppState};
use axum::http::StatusCode;
use axum_test::TestServer;
use clickhouse_client::PipelineStore;
use integration_tests::{fixtures, setup::TestContext};
use pulse_core::{Dimension, Granularity, StatisticBucket};
use std::future::IntoFuture;
use std::time::Duration;

fn bucket(dimension: Dimension, value: &str, count: u64, hour: u32) -> StatisticBucket {
    StatisticBucket {
        dimension,
        dimension_value: value.to_string(),
        count,
        bucket_start: fixtures::at(hour, 0),
        generated_at: fixtures::at(hour + 1, 5),
    }
}

async fn seed_hourly(ctx: &TestContext) {
    ctx.store
        .replace_bucket(
            Granularity::Hourly,
            Dimension::Tag,
            fixtures::at(10, 0),
            &[
                bucket(Dimension::Tag, "rust", 7, 10),
                bucket(Dimension::Tag, "cli", 3, 10),
            ],
        )
        .await
        .unwrap();
    ctx.store
        .replace_bucket(
            Granularity::Hourly,
            Dimension::Language,
            fixtures::at(11, 0),
            &[bucket(Dimension::Language, "Go", 2, 11)],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stats_returns_buckets() {
    let ctx = TestContext::new();
    seed_hourly(&ctx).await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/stats/hourly").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["granularity"], "hourly");
    assert_eq!(body["count"], 3);
    assert_eq!(body["buckets"][0]["dimension_value"], "rust");
    assert_eq!(body["buckets"][1]["dimension_value"], "cli");
    assert_eq!(body["buckets"][2]["dimension_value"], "Go");
}

#[tokio::test]
async fn test_stats_filters_by_dimension_and_window() {
    let ctx = TestContext::new();
    seed_hourly(&ctx).await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .get("/stats/hourly")
        .add_query_param("dimension", "language")
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["dimension"], "language");
    assert_eq!(body["count"], 1);

    let response = server
        .get("/stats/hourly")
        .add_query_param("from", "2024-01-15T10:00:00Z")
        .add_query_param("to", "2024-01-15T11:00:00Z")
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_stats_rejects_bad_parameters() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/stats/weekly").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "REQ_001");

    let response = server
        .get("/stats/daily")
        .add_query_param("dimension", "stars")
        .add_query_param("limit", "0")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "REQ_002");
    assert_eq!(body["details"].as_array().map(Vec::len), Some(2));
}

/// Repeated reads within the TTL are served from the cache.
#[tokio::test]
async fn test_stats_are_cached() {
    let ctx = TestContext::new();
    seed_hourly(&ctx).await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let first: serde_json::Value = server.get("/stats/hourly").await.json();
    assert_eq!(first["count"], 3);

    ctx.store
        .replace_bucket(
            Granularity::Hourly,
            Dimension::Tag,
            fixtures::at(10, 0),
            &[],
        )
        .await
        .unwrap();

    let second: serde_json::Value = server.get("/stats/hourly").await.json();
    assert_eq!(second["count"], 3);
}

/// Once the TTL passes the next read goes back to storage.
#[tokio::test]
async fn test_stats_cache_expires() {
    let ctx = TestContext::new();
    seed_hourly(&ctx).await;
    let state = AppState::new(ctx.store(), ctx.hub.clone())
        .with_stats_cache(StatsCache::new(Duration::from_millis(200)));
    let server = TestServer::new(router(state)).expect("Failed to create test server");

    let first: serde_json::Value = server.get("/stats/hourly").await.json();
    assert_eq!(first["count"], 3);

    ctx.store
        .replace_bucket(
            Granularity::Hourly,
            Dimension::Tag,
            fixtures::at(10, 0),
            &[],
        )
        .await
        .unwrap();

    let cached: serde_json::Value = server.get("/stats/hourly").await.json();
    assert_eq!(cached["count"], 3);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let fresh: serde_json::Value = server.get("/stats/hourly").await.json();
    assert_eq!(fresh["count"], 1);
}

#[tokio::test]
async fn test_recent_resources_newest_first() {
    let ctx = TestContext::new();
    for (key, minute) in [("acme/a", 1), ("acme/b", 3), ("acme/c", 2)] {
        ctx.store
            .upsert_metadata(&fixtures::metadata(key, Some("Rust"), &["cli"], fixtures::at(10, minute)))
            .await
            .unwrap();
    }
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .get("/resources/recent")
        .add_query_param("limit", "2")
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 2);
    assert_eq!(body["resources"][0]["resource_key"], "acme/b");
    assert_eq!(body["resources"][1]["resource_key"], "acme/c");

    server
        .get("/resources/recent")
        .add_query_param("limit", "0")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_store_failure_maps_to_error_code() {
    let ctx = TestContext::new();
    ctx.store.set_should_fail(true);
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/resources/recent").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "DB_001");
}

/// A new connection gets the snapshot first, then live refreshes, each
/// tagged with its event name and the resource key as id.
#[tokio::test]
async fn test_stream_snapshot_then_live() {
    let ctx = TestContext::with_snapshot_size(2);
    for (key, minute) in [("acme/oldest", 1), ("acme/older", 2), ("acme/newest", 3)] {
        ctx.store
            .upsert_metadata(&fixtures::metadata(key, None, &[], fixtures::at(10, minute)))
            .await
            .unwrap();
    }
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    // Publish once the handler has subscribed, then close so the body ends.
    let hub = ctx.hub.clone();
    let publisher = tokio::spawn(async move {
        while hub.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        hub.publish(fixtures::metadata("acme/live", Some("Zig"), &[], chrono::Utc::now()));
        hub.close();
    });

    let response = tokio::time::timeout(Duration::from_secs(10), server.get("/stream").into_future())
        .await
        .expect("stream ended after hub closed");
    publisher.await.unwrap();

    response.assert_status_ok();
    let body = response.text();

    let newest = body.find("id: acme/newest").expect("newest in snapshot");
    let older = body.find("id: acme/older").expect("older in snapshot");
    let live = body.find("id: acme/live").expect("live update");
    assert!(newest < older && older < live);
    assert!(!body.contains("acme/oldest"), "snapshot is bounded");

    assert_eq!(body.matches("event: snapshot").count(), 2);
    assert_eq!(body.matches("event: refresh").count(), 1);
    assert!(body.contains(r#""language":"Zig""#));

    // The finished stream released its subscription.
    assert_eq!(ctx.hub.subscriber_count(), 0);
}

/// Subscribing to a closed hub yields just the snapshot.
#[tokio::test]
async fn test_stream_after_close_sends_snapshot_only() {
    let ctx = TestContext::new();
    ctx.store
        .upsert_metadata(&fixtures::metadata("acme/a", None, &[], fixtures::at(10, 0)))
        .await
        .unwrap();
    ctx.hub.close();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/stream").await;
    response.assert_status_ok();
    let body = response.text();
    assert_eq!(body.matches("event: snapshot").count(), 1);
    assert!(!body.contains("event: refresh"));
}

/// Records whose key cannot serve as an event id are left out of both the
/// snapshot and the live part; the stream itself carries on.
#[tokio::test]
async fn test_stream_skips_unusable_keys() {
    let ctx = TestContext::new();
    ctx.store.seed_raw_metadata(
        fixtures::metadata("acme/bad\nsnapshot", None, &[], fixtures::at(10, 2)),
        "[]",
    );
    ctx.store
        .upsert_metadata(&fixtures::metadata("acme/good", None, &[], fixtures::at(10, 1)))
        .await
        .unwrap();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let hub = ctx.hub.clone();
    let publisher = tokio::spawn(async move {
        while hub.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        hub.publish(fixtures::metadata("acme/bad\rlive", None, &[], chrono::Utc::now()));
        hub.publish(fixtures::metadata("acme/live", None, &[], chrono::Utc::now()));
        hub.close();
    });

    let response = tokio::time::timeout(Duration::from_secs(10), server.get("/stream").into_future())
        .await
        .expect("stream ended after hub closed");
    publisher.await.unwrap();

    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("id: acme/good"));
    assert!(body.contains("id: acme/live"));
    assert!(!body.contains("acme/bad"));
    assert_eq!(body.matches("event: snapshot").count(), 1);
    assert_eq!(body.matches("event: refresh").count(), 1);
}
