//! Test fixtures and event generators.

use chrono::{DateTime, TimeZone, Utc};
use pulse_core::{Event, ResourceMetadata};

/// A fixed instant: 2024-01-15 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
}

/// A public event on `resource_key` occurring now.
pub fn event(event_id: &str, event_type: &str, resource_key: &str) -> Event {
    event_at(event_id, event_type, resource_key, Utc::now())
}

pub fn event_at(
    event_id: &str,
    event_type: &str,
    resource_key: &str,
    occurred_at: DateTime<Utc>,
) -> Event {
    Event {
        event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        actor_ref: "octocat".to_string(),
        resource_ref: resource_key.to_string(),
        payload_summary: format!("{} on {}", event_type, resource_key),
        is_public: true,
        occurred_at,
    }
}

/// `n` push events, one per resource `acme/repo-{i}`, ids `evt-{i}`.
pub fn events(n: usize) -> Vec<Event> {
    (1..=n)
        .map(|i| event(&format!("evt-{}", i), "PushEvent", &format!("acme/repo-{}", i)))
        .collect()
}

/// A snapshot with a language and tags, stamped `updated_at`.
pub fn metadata(
    resource_key: &str,
    language: Option<&str>,
    tags: &[&str],
    updated_at: DateTime<Utc>,
) -> ResourceMetadata {
    ResourceMetadata {
        description: Some(format!("{} description", resource_key)),
        language: language.map(Into::into),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        stars: 42,
        updated_at,
        ..ResourceMetadata::empty(resource_key)
    }
}
