//! Fixed pool of metadata refresh workers.
//!
//! Each worker loops: receive a work item, fetch the resource's metadata,
//! upsert it, publish it. A failure or panic while handling one item is
//! logged and contained; the worker moves on to the next item.

use clickhouse_client::PipelineStore;
use futures::FutureExt;
use pulse_core::{is_valid_resource_key, Error, RefreshWorkItem, ResourceMetadata, Result};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use upstream::UpstreamSource;

use crate::broadcast::BroadcastHub;
use crate::dispatch::DispatchChannel;

/// Default number of refresh workers.
pub const DEFAULT_WORKER_COUNT: usize = 20;

/// How one item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Refreshed,
    Failed,
    Panicked,
}

/// A single refresh worker.
pub struct RefreshWorker {
    index: usize,
    source: Arc<dyn UpstreamSource>,
    store: Arc<dyn PipelineStore>,
    hub: Arc<BroadcastHub>,
}

impl RefreshWorker {
    pub fn new(
        index: usize,
        source: Arc<dyn UpstreamSource>,
        store: Arc<dyn PipelineStore>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            index,
            source,
            store,
            hub,
        }
    }

    /// Fetch, persist and publish one resource's metadata.
    ///
    /// A response whose own resource key is unusable is rejected before it
    /// reaches storage or subscribers.
    pub async fn process(&self, item: &RefreshWorkItem) -> Result<ResourceMetadata> {
        let metadata = self
            .source
            .fetch_resource_metadata(&item.resource_key)
            .await?;
        if !is_valid_resource_key(&metadata.resource_key) {
            return Err(Error::decode(
                "resource_metadata",
                format!("invalid resource key {:?}", metadata.resource_key),
                metadata.resource_key,
            ));
        }
        self.store.upsert_metadata(&metadata).await?;
        self.hub.publish(metadata.clone());
        Ok(metadata)
    }

    /// Process one item, containing any error or panic.
    pub async fn handle(&self, item: &RefreshWorkItem) -> ItemOutcome {
        let start = Instant::now();
        let result = AssertUnwindSafe(self.process(item)).catch_unwind().await;

        match result {
            Ok(Ok(metadata)) => {
                let elapsed = start.elapsed();
                metrics().refreshes_completed.inc();
                metrics()
                    .refresh_latency_ms
                    .observe(elapsed.as_millis() as u64);
                debug!(
                    worker = self.index,
                    resource_key = %item.resource_key,
                    origin_event_id = %item.origin_event_id,
                    tags = metadata.tags.len(),
                    latency_ms = %elapsed.as_millis(),
                    "Refreshed resource metadata"
                );
                ItemOutcome::Refreshed
            }
            Ok(Err(e)) => {
                metrics().refresh_errors.inc();
                warn!(
                    worker = self.index,
                    resource_key = %item.resource_key,
                    origin_event_id = %item.origin_event_id,
                    error_code = e.error_code().unwrap_or("-"),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Refresh failed"
                );
                ItemOutcome::Failed
            }
            Err(panic) => {
                metrics().worker_panics.inc();
                error!(
                    worker = self.index,
                    resource_key = %item.resource_key,
                    origin_event_id = %item.origin_event_id,
                    panic = %panic_message(panic.as_ref()),
                    "Refresh panicked"
                );
                ItemOutcome::Panicked
            }
        }
    }

    /// Main loop. Ends when cancelled or when the channel closes and drains.
    ///
    /// An item still in flight at cancellation is abandoned.
    pub async fn run(self, channel: DispatchChannel, cancel: CancellationToken) {
        metrics().active_workers.inc();
        debug!(worker = self.index, "Refresh worker started");

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = channel.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(
                        worker = self.index,
                        resource_key = %item.resource_key,
                        "Abandoning in-flight refresh"
                    );
                    break;
                }
                _ = self.handle(&item) => {}
            }
        }

        metrics().active_workers.dec();
        debug!(worker = self.index, "Refresh worker stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Spawn `size` workers sharing one channel.
pub fn spawn_workers(
    size: usize,
    channel: &DispatchChannel,
    source: Arc<dyn UpstreamSource>,
    store: Arc<dyn PipelineStore>,
    hub: Arc<BroadcastHub>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let size = size.max(1);
    let handles = (0..size)
        .map(|index| {
            let worker = RefreshWorker::new(index, source.clone(), store.clone(), hub.clone());
            tokio::spawn(worker.run(channel.clone(), cancel.clone()))
        })
        .collect();

    info!(workers = size, "Refresh worker pool started");
    handles
}

/// Wait for tasks to finish, aborting whatever is left after `timeout`.
///
/// Returns true if every task finished on its own.
pub async fn join_with_timeout(handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    let total = handles.len();

    match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
        Ok(results) => {
            let failed = results.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                warn!(failed = failed, total = total, "Some tasks ended abnormally");
            }
            true
        }
        Err(_) => {
            for abort in &aborts {
                abort.abort();
            }
            warn!(
                total = total,
                timeout_ms = %timeout.as_millis(),
                "Shutdown timed out, aborted remaining tasks"
            );
            false
        }
    }
}
