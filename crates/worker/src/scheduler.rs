//! Scheduler for the pipeline's background tasks.

use chrono::Utc;
use clickhouse_client::PipelineStore;
use cron::Schedule;
use pulse_core::Granularity;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use upstream::UpstreamSource;

use crate::broadcast::BroadcastHub;
use crate::dispatch::DispatchChannel;
use crate::ingestion::IngestionWorker;
use crate::pool::{join_with_timeout, spawn_workers};
use crate::queue::OverflowPolicy;
use crate::rollup::RollupEngine;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Event feed poll interval
    pub poll_interval: Duration,
    /// Refresh worker pool size
    pub worker_count: usize,
    /// Dispatch channel capacity
    pub dispatch_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub hourly_schedule: Schedule,
    pub daily_schedule: Schedule,
    /// Metrics log interval
    pub metrics_log_interval: Duration,
    /// Upper bound on joining tasks at shutdown
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    pub fn schedule_for(&self, granularity: Granularity) -> &Schedule {
        match granularity {
            Granularity::Hourly => &self.hourly_schedule,
            Granularity::Daily => &self.daily_schedule,
        }
    }
}

/// Background worker scheduler.
///
/// Owns the dispatch channel and the cancellation token shared by every
/// task it starts.
pub struct WorkerScheduler {
    config: WorkerConfig,
    source: Arc<dyn UpstreamSource>,
    store: Arc<dyn PipelineStore>,
    hub: Arc<BroadcastHub>,
    channel: DispatchChannel,
    cancel: CancellationToken,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        source: Arc<dyn UpstreamSource>,
        store: Arc<dyn PipelineStore>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        let channel = DispatchChannel::new(config.dispatch_capacity, config.overflow_policy);
        Self {
            config,
            source,
            store,
            hub,
            channel,
            cancel: CancellationToken::new(),
        }
    }

    pub fn channel(&self) -> &DispatchChannel {
        &self.channel
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ingestion_worker(&self) -> IngestionWorker {
        IngestionWorker::new(self.source.clone(), self.store.clone(), self.channel.clone())
    }

    pub fn rollup_engine(&self) -> RollupEngine {
        RollupEngine::new(self.store.clone())
    }

    /// Starts all background tasks.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = spawn_workers(
            self.config.worker_count,
            &self.channel,
            self.source.clone(),
            self.store.clone(),
            self.hub.clone(),
            &self.cancel,
        );

        // Ingestion ticker
        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_ingestion().await;
        }));

        // Rollups
        for granularity in Granularity::ALL {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_rollup_schedule(granularity).await;
            }));
        }

        // Metrics log
        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        info!(
            workers = self.config.worker_count,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Background workers started"
        );
        handles
    }

    /// Cancel every task, close the channel and hub, then join with the
    /// configured timeout. Returns true if nothing had to be aborted.
    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>) -> bool {
        info!(tasks = handles.len(), "Shutting down background workers");
        self.cancel.cancel();
        self.channel.close();
        self.hub.close();

        let dropped = self.channel.drain().len();
        if dropped > 0 {
            warn!(dropped = dropped, "Discarded pending work items at shutdown");
        }

        let clean = join_with_timeout(handles, self.config.shutdown_timeout).await;
        info!(clean = clean, "Background workers stopped");
        clean
    }

    async fn run_ingestion(&self) {
        let worker = self.ingestion_worker();
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = worker.run_once() => result,
            };

            if let Err(e) = result {
                metrics().ingestion_errors.inc();
                error!(
                    error_code = e.error_code().unwrap_or("-"),
                    retryable = e.is_retryable(),
                    "Ingestion cycle failed: {}",
                    e
                );
            }
        }
    }

    async fn run_rollup_schedule(&self, granularity: Granularity) {
        let engine = self.rollup_engine();
        let schedule = self.config.schedule_for(granularity).clone();

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!(granularity = %granularity, "Rollup schedule has no upcoming runs");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = engine.run(granularity, Utc::now()) => result,
            };

            if let Err(e) = result {
                metrics().rollup_errors.inc();
                error!(granularity = %granularity, "Rollup failed: {}", e);
            }
        }
    }

    async fn run_metrics_log(&self) {
        let mut ticker = interval(self.config.metrics_log_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = metrics().snapshot();
            info!(
                events_fetched = snapshot.events_fetched,
                events_persisted = snapshot.events_persisted,
                events_duplicate = snapshot.events_duplicate,
                items_dispatched = snapshot.items_dispatched,
                items_dropped = snapshot.items_dropped,
                queue_depth = snapshot.queue_depth,
                refreshes_completed = snapshot.refreshes_completed,
                refresh_errors = snapshot.refresh_errors,
                worker_panics = snapshot.worker_panics,
                subscribers = snapshot.subscribers,
                broadcast_dropped = snapshot.broadcast_dropped,
                rollup_rows_written = snapshot.rollup_rows_written,
                rollup_errors = snapshot.rollup_errors,
                refresh_latency_mean_ms = snapshot.refresh_latency_mean_ms,
                "Pipeline metrics"
            );
        }
    }
}
