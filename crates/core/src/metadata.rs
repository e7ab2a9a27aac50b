//! Resource metadata snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest known state of one resource.
///
/// Written by refresh workers with last-write-wins semantics: every refresh
/// replaces the previous snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub resource_key: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    /// Normalized tag list.
    pub tags: Vec<String>,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    /// When this snapshot was taken.
    pub updated_at: DateTime<Utc>,
}

impl ResourceMetadata {
    /// An empty snapshot for a resource, stamped now.
    pub fn empty(resource_key: impl Into<String>) -> Self {
        Self {
            resource_key: resource_key.into(),
            description: None,
            language: None,
            license: None,
            homepage: None,
            tags: Vec::new(),
            stars: 0,
            forks: 0,
            watchers: 0,
            open_issues: 0,
            created_at: None,
            pushed_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// The subset of a stored snapshot the tag and language rollups read back.
///
/// `tags_raw` is the tag column exactly as stored, which may still be
/// double-encoded; readers go through [`crate::tags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub resource_key: String,
    pub language: Option<String>,
    pub tags_raw: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&ResourceMetadata> for MetadataRecord {
    fn from(meta: &ResourceMetadata) -> Self {
        Self {
            resource_key: meta.resource_key.clone(),
            language: meta.language.clone(),
            tags_raw: serde_json::to_string(&meta.tags).unwrap_or_else(|_| "[]".to_string()),
            updated_at: meta.updated_at,
        }
    }
}
