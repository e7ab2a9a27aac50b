//! Tests for health check endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::setup::TestContext;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();
    let _subscription = ctx.hub.subscribe();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();

    for field in [
        "status",
        "upstream_connected",
        "clickhouse_connected",
        "queue_depth",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }
    assert_eq!(body["subscribers"], 1);

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        ["healthy", "degraded", "unavailable"].contains(&status),
        "unexpected status '{}'",
        status
    );
}

/// Readiness follows ClickHouse health
#[tokio::test]
async fn test_ready_endpoint() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    telemetry::health().clickhouse.set_healthy();
    server.get("/health/ready").await.assert_status_ok();

    telemetry::health().clickhouse.set_unhealthy("down for test");
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "unavailable");
    assert_eq!(body["clickhouse_error"], "down for test");
}

/// Test /health/live endpoint always returns 200 when service is running
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/metrics").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body.get("events_fetched").is_some());
    assert!(body.get("items_dropped").is_some());
    assert!(body.get("timestamp").is_some());
}
