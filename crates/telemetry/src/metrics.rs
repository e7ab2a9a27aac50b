//! In-process pipeline metrics.
//!
//! Plain atomics behind a global registry. Every stage of the pipeline
//! bumps its own counters; the API exposes a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements, saturating at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let index = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns `(upper_bound_ms, count)` pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Upstream
    pub events_fetched: Counter,
    pub upstream_errors: Counter,
    pub upstream_decode_errors: Counter,
    pub upstream_latency_ms: Histogram,

    // Ingestion
    pub ingestion_cycles: Counter,
    pub ingestion_errors: Counter,
    pub events_persisted: Counter,
    pub events_duplicate: Counter,

    // Dispatch channel
    pub items_dispatched: Counter,
    pub items_dropped: Counter,
    pub queue_depth: Gauge,

    // Refresh workers
    pub refreshes_completed: Counter,
    pub refresh_errors: Counter,
    pub worker_panics: Counter,
    pub active_workers: Gauge,
    pub refresh_latency_ms: Histogram,

    // Broadcast hub
    pub broadcasts_published: Counter,
    pub broadcast_dropped: Counter,
    pub subscribers: Gauge,

    // Rollups
    pub rollup_runs: Counter,
    pub rollup_errors: Counter,
    pub rollup_rows_written: Counter,
    pub rollup_skipped_empty: Counter,
    pub tags_unparseable: Counter,

    // ClickHouse
    pub clickhouse_inserts: Counter,
    pub clickhouse_insert_errors: Counter,
    pub clickhouse_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_fetched: u64,
    pub upstream_errors: u64,
    pub upstream_decode_errors: u64,
    pub ingestion_cycles: u64,
    pub ingestion_errors: u64,
    pub events_persisted: u64,
    pub events_duplicate: u64,
    pub items_dispatched: u64,
    pub items_dropped: u64,
    pub queue_depth: u64,
    pub refreshes_completed: u64,
    pub refresh_errors: u64,
    pub worker_panics: u64,
    pub active_workers: u64,
    pub broadcasts_published: u64,
    pub broadcast_dropped: u64,
    pub subscribers: u64,
    pub rollup_runs: u64,
    pub rollup_errors: u64,
    pub rollup_rows_written: u64,
    pub rollup_skipped_empty: u64,
    pub tags_unparseable: u64,
    pub clickhouse_inserts: u64,
    pub clickhouse_insert_errors: u64,
    pub upstream_latency_mean_ms: f64,
    pub refresh_latency_mean_ms: f64,
    pub clickhouse_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_fetched: self.events_fetched.get(),
            upstream_errors: self.upstream_errors.get(),
            upstream_decode_errors: self.upstream_decode_errors.get(),
            ingestion_cycles: self.ingestion_cycles.get(),
            ingestion_errors: self.ingestion_errors.get(),
            events_persisted: self.events_persisted.get(),
            events_duplicate: self.events_duplicate.get(),
            items_dispatched: self.items_dispatched.get(),
            items_dropped: self.items_dropped.get(),
            queue_depth: self.queue_depth.get(),
            refreshes_completed: self.refreshes_completed.get(),
            refresh_errors: self.refresh_errors.get(),
            worker_panics: self.worker_panics.get(),
            active_workers: self.active_workers.get(),
            broadcasts_published: self.broadcasts_published.get(),
            broadcast_dropped: self.broadcast_dropped.get(),
            subscribers: self.subscribers.get(),
            rollup_runs: self.rollup_runs.get(),
            rollup_errors: self.rollup_errors.get(),
            rollup_rows_written: self.rollup_rows_written.get(),
            rollup_skipped_empty: self.rollup_skipped_empty.get(),
            tags_unparseable: self.tags_unparseable.get(),
            clickhouse_inserts: self.clickhouse_inserts.get(),
            clickhouse_insert_errors: self.clickhouse_insert_errors.get(),
            upstream_latency_mean_ms: self.upstream_latency_ms.mean(),
            refresh_latency_mean_ms: self.refresh_latency_ms.mean(),
            clickhouse_latency_mean_ms: self.clickhouse_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
