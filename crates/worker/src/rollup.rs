//! Rollup engine: per-bucket counts by category, tag and language.
//!
//! A run targets the most recently completed bucket. Each dimension is
//! recomputed from scratch and written with delete-then-insert, so rerunning
//! a bucket over unchanged data yields the same row set. A dimension whose
//! source query returns nothing in the window is skipped. When records exist
//! but yield no values (every tag list undecodable, no languages), the slice
//! is still replaced, with no rows, so earlier values do not linger.

use chrono::{DateTime, Utc};
use clickhouse_client::PipelineStore;
use pulse_core::{
    tags::{normalize_tags, try_parse_tag_list},
    BucketWindow, Dimension, EventRecord, Granularity, MetadataRecord, Result, StatisticBucket,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info};

/// Counts keyed by dimension value, iterated in key order.
pub type Counts = BTreeMap<String, u64>;

/// What one rollup run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupReport {
    pub granularity: Granularity,
    pub bucket_start: DateTime<Utc>,
    pub rows_written: usize,
    /// Dimensions whose source had no records in the window.
    pub skipped_dimensions: Vec<Dimension>,
    /// Metadata records whose tag list could not be decoded.
    pub unparseable_tags: usize,
}

/// Count events by event type.
pub fn count_categories(events: &[EventRecord]) -> Counts {
    let mut counts = Counts::new();
    for event in events {
        *counts.entry(event.event_type.clone()).or_default() += 1;
    }
    counts
}

/// Count normalized tags across metadata records.
///
/// Returns the counts and the number of records skipped because their tag
/// list could not be decoded even after unwrapping.
pub fn count_tags(records: &[MetadataRecord]) -> (Counts, usize) {
    let mut counts = Counts::new();
    let mut skipped = 0;

    for record in records {
        match try_parse_tag_list(&record.tags_raw) {
            Ok(tags) => {
                for tag in normalize_tags(tags) {
                    *counts.entry(tag).or_default() += 1;
                }
            }
            Err(e) => {
                skipped += 1;
                debug!(
                    resource_key = %record.resource_key,
                    error = %e,
                    "Skipping undecodable tag list"
                );
            }
        }
    }

    (counts, skipped)
}

/// Count resources by primary language. Resources without one are ignored.
pub fn count_languages(records: &[MetadataRecord]) -> Counts {
    let mut counts = Counts::new();
    for language in records
        .iter()
        .filter_map(|r| r.language.as_deref())
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        *counts.entry(language.to_string()).or_default() += 1;
    }
    counts
}

fn to_rows(
    dimension: Dimension,
    counts: Counts,
    bucket_start: DateTime<Utc>,
    generated_at: DateTime<Utc>,
) -> Vec<StatisticBucket> {
    counts
        .into_iter()
        .map(|(value, count)| StatisticBucket {
            dimension,
            dimension_value: value,
            count,
            bucket_start,
            generated_at,
        })
        .collect()
}

pub struct RollupEngine {
    store: Arc<dyn PipelineStore>,
}

impl RollupEngine {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// Roll up the bucket that most recently completed at `now`.
    pub async fn run(&self, granularity: Granularity, now: DateTime<Utc>) -> Result<RollupReport> {
        let window = granularity.completed_bucket(now);
        self.run_window(window).await
    }

    /// Recompute a specific bucket. `bucket_start` is aligned down first.
    pub async fn run_for_bucket(
        &self,
        granularity: Granularity,
        bucket_start: DateTime<Utc>,
    ) -> Result<RollupReport> {
        self.run_window(granularity.bucket_of(bucket_start)).await
    }

    async fn run_window(&self, window: BucketWindow) -> Result<RollupReport> {
        let start = Instant::now();
        let generated_at = Utc::now();
        metrics().rollup_runs.inc();

        let mut report = RollupReport {
            granularity: window.granularity,
            bucket_start: window.start,
            rows_written: 0,
            skipped_dimensions: Vec::new(),
            unparseable_tags: 0,
        };

        let events = self.store.events_between(window.start, window.end).await?;
        let categories = count_categories(&events);

        let records = self.store.metadata_between(window.start, window.end).await?;
        let (tags, unparseable) = count_tags(&records);
        report.unparseable_tags = unparseable;
        metrics().tags_unparseable.inc_by(unparseable as u64);
        let languages = count_languages(&records);

        for (dimension, counts, has_source) in [
            (Dimension::Category, categories, !events.is_empty()),
            (Dimension::Tag, tags, !records.is_empty()),
            (Dimension::Language, languages, !records.is_empty()),
        ] {
            if !has_source {
                metrics().rollup_skipped_empty.inc();
                report.skipped_dimensions.push(dimension);
                debug!(
                    granularity = %window.granularity,
                    dimension = %dimension,
                    bucket_start = %window.start,
                    "No records in window, nothing written"
                );
                continue;
            }

            let rows = to_rows(dimension, counts, window.start, generated_at);
            self.store
                .replace_bucket(window.granularity, dimension, window.start, &rows)
                .await?;
            report.rows_written += rows.len();
        }

        metrics()
            .rollup_rows_written
            .inc_by(report.rows_written as u64);

        info!(
            granularity = %window.granularity,
            bucket_start = %window.start,
            events = events.len(),
            metadata = records.len(),
            rows_written = report.rows_written,
            skipped = report.skipped_dimensions.len(),
            unparseable_tags = report.unparseable_tags,
            latency_ms = %start.elapsed().as_millis(),
            "Rollup complete"
        );

        Ok(report)
    }
}
