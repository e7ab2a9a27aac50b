//! Common test setup functions.

use api::{router, state::AppState};
use axum::Router;
use clickhouse_client::PipelineStore;
use std::sync::Arc;
use std::time::Duration;
use upstream::UpstreamSource;
use worker::{
    BroadcastHub, DispatchChannel, OverflowPolicy, PipelineConfig, RefreshWorker, WorkerConfig,
    WorkerScheduler,
};

use crate::mocks::{MemoryStore, ScriptedSource};

/// Test context wired from in-memory doubles.
///
/// This exercises the same production code paths by:
/// - Using the real Axum router with all layers
/// - Using MemoryStore which implements PipelineStore
/// - Using ScriptedSource which implements UpstreamSource
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub source: Arc<ScriptedSource>,
    pub hub: Arc<BroadcastHub>,
    pub router: Router,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_snapshot_size(30)
    }

    pub fn with_snapshot_size(snapshot_size: usize) -> Self {
        telemetry::init_test_tracing();

        let store = MemoryStore::new();
        let source = ScriptedSource::new();
        let hub = BroadcastHub::new(100);

        let state = AppState::new(store.clone() as Arc<dyn PipelineStore>, hub.clone())
            .with_snapshot_size(snapshot_size);
        let router = router(state);

        Self {
            store,
            source,
            hub,
            router,
        }
    }

    pub fn store(&self) -> Arc<dyn PipelineStore> {
        self.store.clone()
    }

    pub fn source(&self) -> Arc<dyn UpstreamSource> {
        self.source.clone()
    }

    /// A refresh worker over this context's doubles.
    pub fn refresh_worker(&self, index: usize) -> RefreshWorker {
        RefreshWorker::new(index, self.source(), self.store(), self.hub.clone())
    }

    /// A scheduler over this context's doubles.
    pub fn scheduler(&self, config: WorkerConfig) -> Arc<WorkerScheduler> {
        Arc::new(WorkerScheduler::new(
            config,
            self.source(),
            self.store(),
            self.hub.clone(),
        ))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast scheduler config: one-second polls, small pool, short shutdown.
pub fn fast_worker_config(worker_count: usize) -> WorkerConfig {
    PipelineConfig {
        poll_interval_secs: 1,
        worker_count,
        shutdown_timeout_secs: 2,
        ..PipelineConfig::default()
    }
    .to_worker_config()
    .expect("valid test config")
}

/// A channel with no consumer attached.
pub fn idle_channel(capacity: usize) -> DispatchChannel {
    DispatchChannel::new(capacity, OverflowPolicy::DropOldest)
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_http(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{}", addr)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
