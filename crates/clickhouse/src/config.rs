//! ClickHouse configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[validate(url)]
    pub url: String,
    /// Database name
    #[validate(length(min = 1))]
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Create the database and tables on startup
    #[serde(default = "default_init_schema")]
    pub init_schema: bool,
}

fn default_database() -> String {
    "pulse".to_string()
}

fn default_init_schema() -> bool {
    true
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            init_schema: default_init_schema(),
        }
    }
}
