//! Source client against a local HTTP server.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use integration_tests::setup::spawn_http;
use parking_lot::Mutex;
use pulse_core::Error;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use upstream::{SourceClient, UpstreamConfig, UpstreamSource};

type Seen = Arc<Mutex<Vec<String>>>;

fn config(base_url: String) -> UpstreamConfig {
    UpstreamConfig {
        base_url,
        credentials: vec!["t1".into(), "t2".into()],
        timeout_secs: 1,
        ..UpstreamConfig::default()
    }
}

async fn client_for(app: Router) -> SourceClient {
    telemetry::init_test_tracing();
    let base_url = spawn_http(app).await;
    SourceClient::new(&config(base_url)).expect("client")
}

fn event_json(id: &str, repo: &str) -> Value {
    json!({
        "id": id,
        "type": "PushEvent",
        "actor": {"login": "octocat"},
        "repo": {"name": repo},
        "payload": {"size": 2},
        "public": true,
        "created_at": "2024-01-15T10:45:00Z"
    })
}

async fn recording_events(State(seen): State<Seen>, headers: HeaderMap) -> Json<Value> {
    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        seen.lock().push(auth.to_string());
    }
    Json(json!([event_json("1", "acme/rocket")]))
}

#[tokio::test]
async fn test_events_are_decoded() {
    let seen = Seen::default();
    let app = Router::new()
        .route("/events", get(recording_events))
        .with_state(seen);
    let client = client_for(app).await;

    let events = client.fetch_events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, "1");
    assert_eq!(events[0].resource_ref, "acme/rocket");
    assert_eq!(events[0].payload_summary, "2 commits");
}

/// Successive requests walk the credential pool in order.
#[tokio::test]
async fn test_credentials_rotate_per_request() {
    let seen = Seen::default();
    let app = Router::new()
        .route("/events", get(recording_events))
        .with_state(seen.clone());
    let client = client_for(app).await;

    for _ in 0..3 {
        client.fetch_events().await.unwrap();
    }
    assert_eq!(
        *seen.lock(),
        vec!["Bearer t1", "Bearer t2", "Bearer t1"]
    );
}

#[tokio::test]
async fn test_resource_metadata_is_decoded() {
    let app = Router::new().route(
        "/repos/:owner/:name",
        get(|Path((owner, name)): Path<(String, String)>| async move {
            Json(json!({
                "full_name": format!("{}/{}", owner, name),
                "language": "Rust",
                "topics": "[\"CLI\",\"async\"]",
                "stargazers_count": 12
            }))
        }),
    );
    let client = client_for(app).await;

    let metadata = client.fetch_resource_metadata("acme/rocket").await.unwrap();
    assert_eq!(metadata.resource_key, "acme/rocket");
    assert_eq!(metadata.language.as_deref(), Some("Rust"));
    assert_eq!(metadata.tags.len(), 2);
    assert_eq!(metadata.stars, 12);
}

#[tokio::test]
async fn test_client_error_status() {
    let app = Router::new().route(
        "/repos/:owner/:name",
        get(|| async { (StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#) }),
    );
    let client = client_for(app).await;

    let err = client.fetch_resource_metadata("acme/gone").await.unwrap_err();
    assert!(matches!(err, Error::ClientFault { status: 404, .. }), "{err:?}");
    assert_eq!(err.upstream_status(), Some(404));
    assert_eq!(err.error_code(), Some("SRC_001"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_status_is_retryable() {
    let app = Router::new().route(
        "/events",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }),
    );
    let client = client_for(app).await;

    let err = client.fetch_events().await.unwrap_err();
    assert!(matches!(err, Error::ServerFault { status: 503, .. }), "{err:?}");
    assert_eq!(err.upstream_status(), Some(503));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unexpected_shape_is_a_decode_fault() {
    let app = Router::new().route("/events", get(|| async { Json(json!({"not": "a list"})) }));
    let client = client_for(app).await;

    let err = client.fetch_events().await.unwrap_err();
    match err {
        Error::Decode { context, raw, .. } => {
            assert_eq!(context, "events");
            assert!(raw.contains("not"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// A huge undecodable body is kept only as a bounded snippet.
#[tokio::test]
async fn test_decode_fault_truncates_raw_body() {
    let app = Router::new().route("/events", get(|| async { "x".repeat(10_000) }));
    let client = client_for(app).await;

    let err = client.fetch_events().await.unwrap_err();
    assert_eq!(err.upstream_status(), None);
    match err {
        Error::Decode { raw, .. } => {
            assert!(raw.len() < 1_000);
            assert!(raw.ends_with("..."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let app = Router::new().route(
        "/events",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!([]))
        }),
    );
    let client = client_for(app).await;

    let started = Instant::now();
    let err = client.fetch_events().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
    assert_eq!(err.error_code(), Some("SRC_004"));
    assert!(started.elapsed() < Duration::from_secs(4));
}
