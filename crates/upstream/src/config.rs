//! Upstream API configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use validator::Validate;

/// Upstream feed client configuration.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct UpstreamConfig {
    /// API base URL
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the public events feed
    #[serde(default = "default_events_path")]
    pub events_path: String,
    /// Path prefix for resource lookups; the resource key is appended
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
    /// Bearer tokens used in rotation
    #[validate(length(min = 1))]
    #[serde(default)]
    pub credentials: Vec<String>,
    /// Events requested per poll
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Request timeout in seconds
    #[validate(range(min = 1, max = 120))]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// User-Agent header sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_events_path() -> String {
    "/events".to_string()
}

fn default_resource_path() -> String {
    "/repos".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("activity-pulse/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            events_path: default_events_path(),
            resource_path: default_resource_path(),
            credentials: Vec::new(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("events_path", &self.events_path)
            .field("resource_path", &self.resource_path)
            .field("credentials", &format_args!("[{} redacted]", self.credentials.len()))
            .field("per_page", &self.per_page)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
