//! Wire shapes returned by the upstream API.
//!
//! Required fields are plain; anything the upstream may omit is an `Option`
//! or carries a serde default. Conversion into core types happens here so the
//! rest of the pipeline never sees upstream JSON.

use chrono::{DateTime, Utc};
use pulse_core::{tags::deserialize_tags, Event, ResourceMetadata};
use serde::Deserialize;
use serde_json::Value;

/// Longest payload summary kept on an event.
pub const MAX_PAYLOAD_SUMMARY: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct ActorDto {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRefDto {
    /// `owner/name`
    pub name: String,
}

/// One entry of the public events feed.
#[derive(Debug, Clone, Deserialize)]
pub struct EventDto {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: ActorDto,
    pub repo: ResourceRefDto,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "default_public")]
    pub public: bool,
    pub created_at: DateTime<Utc>,
}

fn default_public() -> bool {
    true
}

impl From<EventDto> for Event {
    fn from(dto: EventDto) -> Self {
        Event {
            payload_summary: summarize_payload(&dto.payload),
            event_id: dto.id,
            event_type: dto.event_type,
            actor_ref: dto.actor.login,
            resource_ref: dto.repo.name,
            is_public: dto.public,
            occurred_at: dto.created_at,
        }
    }
}

/// Condense an event payload to a short human-readable string.
pub fn summarize_payload(payload: &Value) -> String {
    if let Some(action) = payload.get("action").and_then(Value::as_str) {
        return action.to_string();
    }

    if let (Some(ref_type), Some(git_ref)) = (
        payload.get("ref_type").and_then(Value::as_str),
        payload.get("ref").and_then(Value::as_str),
    ) {
        return format!("{} {}", ref_type, git_ref);
    }

    if let Some(size) = payload.get("size").and_then(Value::as_u64) {
        return format!("{} commits", size);
    }

    if payload.is_null() {
        return String::new();
    }

    let mut compact = payload.to_string();
    if compact.len() > MAX_PAYLOAD_SUMMARY {
        let mut cut = MAX_PAYLOAD_SUMMARY;
        while !compact.is_char_boundary(cut) {
            cut -= 1;
        }
        compact.truncate(cut);
    }
    compact
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseDto {
    pub spdx_id: Option<String>,
    pub name: Option<String>,
}

/// Resource metadata as returned by the lookup endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDto {
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub license: Option<LicenseDto>,
    pub homepage: Option<String>,
    /// May arrive as a list or as a JSON-encoded string of a list.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub topics: Vec<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub subscribers_count: Option<u64>,
    #[serde(default)]
    pub watchers_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl ResourceDto {
    /// Convert into a snapshot stamped with the refresh time.
    pub fn into_metadata(self, refreshed_at: DateTime<Utc>) -> ResourceMetadata {
        let license = self
            .license
            .and_then(|l| l.spdx_id.filter(|id| id != "NOASSERTION").or(l.name));

        ResourceMetadata {
            resource_key: self.full_name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            language: self.language,
            license,
            homepage: self.homepage.filter(|h| !h.trim().is_empty()),
            tags: self.topics,
            stars: self.stargazers_count,
            forks: self.forks_count,
            watchers: self.subscribers_count.unwrap_or(self.watchers_count),
            open_issues: self.open_issues_count,
            created_at: self.created_at,
            pushed_at: self.pushed_at,
            updated_at: refreshed_at,
        }
    }
}
