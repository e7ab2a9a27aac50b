//! Ingestion cycle: poll the event feed, persist new events, dispatch
//! refresh work for each of them.

use clickhouse_client::PipelineStore;
use pulse_core::{is_valid_resource_key, RefreshWorkItem, Result};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};
use upstream::UpstreamSource;

use crate::dispatch::{DispatchChannel, SendOutcome};

/// Counts from one ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub fetched: usize,
    pub persisted: usize,
    pub dispatched: usize,
    /// Work items discarded by the channel's overflow policy.
    pub dropped: usize,
    /// New events whose resource key could not be refreshed.
    pub invalid_keys: usize,
}

pub struct IngestionWorker {
    source: Arc<dyn UpstreamSource>,
    store: Arc<dyn PipelineStore>,
    channel: DispatchChannel,
}

impl IngestionWorker {
    pub fn new(
        source: Arc<dyn UpstreamSource>,
        store: Arc<dyn PipelineStore>,
        channel: DispatchChannel,
    ) -> Self {
        Self {
            source,
            store,
            channel,
        }
    }

    /// Run one cycle.
    ///
    /// Only events the store had not seen before produce refresh work, so
    /// overlapping polls never duplicate work items.
    pub async fn run_once(&self) -> Result<IngestionReport> {
        let start = Instant::now();
        metrics().ingestion_cycles.inc();

        let events = self.source.fetch_events().await?;
        let mut report = IngestionReport {
            fetched: events.len(),
            ..Default::default()
        };

        if events.is_empty() {
            debug!("Event feed returned nothing");
            return Ok(report);
        }

        let persisted = self.store.persist_events(&events).await?;
        report.persisted = persisted.len();

        for row in persisted {
            if !is_valid_resource_key(&row.resource_key) {
                report.invalid_keys += 1;
                warn!(
                    event_id = %row.event_id,
                    resource_key = %row.resource_key,
                    "Skipping refresh for malformed resource key"
                );
                continue;
            }

            let item = RefreshWorkItem {
                resource_key: row.resource_key,
                origin_event_id: row.event_id,
            };

            match self.channel.send(item) {
                SendOutcome::Enqueued => report.dispatched += 1,
                SendOutcome::DroppedOldest(_) => {
                    report.dispatched += 1;
                    report.dropped += 1;
                }
                SendOutcome::DroppedNewest(_) | SendOutcome::Closed(_) => report.dropped += 1,
            }
        }

        info!(
            fetched = report.fetched,
            persisted = report.persisted,
            dispatched = report.dispatched,
            dropped = report.dropped,
            invalid_keys = report.invalid_keys,
            latency_ms = %start.elapsed().as_millis(),
            "Ingestion cycle complete"
        );

        Ok(report)
    }
}
