//! Live update stream over server-sent events.
//!
//! A new connection first receives a bounded snapshot of the most recently
//! refreshed resources as `snapshot` events, then every refresh published
//! after it connected as `refresh` events. Each message's SSE id is the
//! resource key.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use pulse_core::{is_valid_resource_key, ResourceMetadata};
use std::convert::Infallible;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub const SNAPSHOT_EVENT: &str = "snapshot";
pub const REFRESH_EVENT: &str = "refresh";

/// Build one SSE message, or `None` if the metadata cannot be sent.
///
/// Keys that are not a single-line `owner/name` are skipped, since the key
/// becomes the event id.
fn to_sse_event(name: &'static str, metadata: &ResourceMetadata) -> Option<Event> {
    if !is_valid_resource_key(&metadata.resource_key) {
        warn!(resource_key = ?metadata.resource_key, "Skipping stream event with unusable id");
        return None;
    }

    match Event::default()
        .event(name)
        .id(metadata.resource_key.as_str())
        .json_data(metadata)
    {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(resource_key = %metadata.resource_key, error = %e, "Failed to encode stream event");
            None
        }
    }
}

/// GET /stream - Snapshot followed by live refreshes.
pub async fn stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before reading the snapshot so refreshes published while it
    // loads are buffered rather than lost.
    let subscription = state.hub.subscribe();

    let snapshot = if state.snapshot_size == 0 {
        Vec::new()
    } else {
        match state.store.recent_metadata(state.snapshot_size).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Snapshot unavailable, streaming live updates only");
                Vec::new()
            }
        }
    };

    info!(
        subscriber = subscription.id(),
        snapshot = snapshot.len(),
        "Stream subscriber connected"
    );

    let snapshot = stream::iter(
        snapshot
            .into_iter()
            .filter_map(|metadata| to_sse_event(SNAPSHOT_EVENT, &metadata)),
    );

    let live = stream::unfold(subscription, |subscription| async move {
        loop {
            let Some(metadata) = subscription.recv().await else {
                debug!(subscriber = subscription.id(), "Stream closed by hub");
                return None;
            };
            if let Some(event) = to_sse_event(REFRESH_EVENT, &metadata) {
                return Some((event, subscription));
            }
        }
    });

    Sse::new(snapshot.chain(live).map(Ok)).keep_alive(KeepAlive::default())
}
