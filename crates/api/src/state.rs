//! Application state shared across handlers.

use clickhouse_client::{BucketQuery, PipelineStore};
use moka::future::Cache;
use pulse_core::{Result, StatisticBucket};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use worker::BroadcastHub;

/// Rollup responses change at most once per bucket, so a short TTL is plenty.
const STATS_CACHE_TTL: Duration = Duration::from_secs(60);

const STATS_CACHE_MAX_CAPACITY: u64 = 1_000;

/// Default number of resources in a stream snapshot.
pub const DEFAULT_SNAPSHOT_SIZE: usize = 30;

/// Read-through cache in front of the rollup query.
#[derive(Clone)]
pub struct StatsCache {
    cache: Cache<BucketQuery, Arc<Vec<StatisticBucket>>>,
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(STATS_CACHE_MAX_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Return cached buckets for `query`, running it against `store` on a miss.
    ///
    /// Failed queries are not cached.
    pub async fn get_or_query(
        &self,
        store: &dyn PipelineStore,
        query: &BucketQuery,
    ) -> Result<Arc<Vec<StatisticBucket>>> {
        if let Some(cached) = self.cache.get(query).await {
            debug!(granularity = %query.granularity, "Stats cache hit");
            return Ok(cached);
        }

        let buckets = Arc::new(store.query_buckets(query).await?);
        self.cache.insert(query.clone(), buckets.clone()).await;
        Ok(buckets)
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(STATS_CACHE_TTL)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Metadata and rollup storage (ClickHouse in production, in-memory in tests)
    pub store: Arc<dyn PipelineStore>,
    /// Live update fan-out
    pub hub: Arc<BroadcastHub>,
    /// Resources sent to a new stream subscriber before live updates
    pub snapshot_size: usize,
    pub stats_cache: StatsCache,
}

impl AppState {
    pub fn new(store: Arc<dyn PipelineStore>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            store,
            hub,
            snapshot_size: DEFAULT_SNAPSHOT_SIZE,
            stats_cache: StatsCache::default(),
        }
    }

    pub fn with_snapshot_size(mut self, snapshot_size: usize) -> Self {
        self.snapshot_size = snapshot_size;
        self
    }

    pub fn with_stats_cache(mut self, stats_cache: StatsCache) -> Self {
        self.stats_cache = stats_cache;
        self
    }
}
