//! Activity event and refresh work item definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An activity event observed on the upstream feed.
///
/// Events are immutable once persisted. `event_id` is assigned by the
/// upstream source and is the uniqueness key for idempotent ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    /// Who triggered the event (login or handle).
    pub actor_ref: String,
    /// The resource the event happened on, as a resource key.
    pub resource_ref: String,
    /// Short, bounded description of the payload.
    pub payload_summary: String,
    pub is_public: bool,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// The refresh work this event asks for.
    pub fn refresh_item(&self) -> RefreshWorkItem {
        RefreshWorkItem {
            resource_key: self.resource_ref.clone(),
            origin_event_id: self.event_id.clone(),
        }
    }
}

/// A request to pull the latest metadata for one resource.
///
/// Lives only inside the dispatch channel and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshWorkItem {
    pub resource_key: String,
    pub origin_event_id: String,
}

/// A row the batch writer actually inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent {
    pub resource_key: String,
    pub event_id: String,
    pub internal_id: Uuid,
}

/// The subset of an event the category rollup reads back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            occurred_at: event.occurred_at,
        }
    }
}

/// Resource keys look like `owner/name`, with no whitespace or control
/// characters. The key doubles as a stream event id, which must be a single
/// line.
pub fn is_valid_resource_key(key: &str) -> bool {
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    match key.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}
