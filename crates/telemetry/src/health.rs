//! Reachability of the upstream API and ClickHouse.
//!
//! Storage decides readiness, since every read endpoint is served from it.
//! An unreachable upstream only stalls ingestion and refreshes, so it
//! degrades the service without taking it out of rotation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Overall condition reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Both dependencies reachable.
    Healthy,
    /// Reads work, but new data is not flowing in.
    Degraded,
    /// Storage is unreachable.
    Unavailable,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Default)]
struct Probe {
    healthy: bool,
    last_error: Option<String>,
    checked_at: Option<DateTime<Utc>>,
}

/// Last observed state of one dependency. Unknown counts as unhealthy.
#[derive(Debug, Default)]
pub struct Dependency {
    probe: RwLock<Probe>,
}

impl Dependency {
    pub fn set_healthy(&self) {
        *self.probe.write() = Probe {
            healthy: true,
            last_error: None,
            checked_at: Some(Utc::now()),
        };
    }

    pub fn set_unhealthy(&self, error: impl Into<String>) {
        *self.probe.write() = Probe {
            healthy: false,
            last_error: Some(error.into()),
            checked_at: Some(Utc::now()),
        };
    }

    pub fn is_healthy(&self) -> bool {
        self.probe.read().healthy
    }

    pub fn last_error(&self) -> Option<String> {
        self.probe.read().last_error.clone()
    }

    /// When the dependency was last probed, if ever.
    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        self.probe.read().checked_at
    }
}

#[derive(Debug, Default)]
pub struct HealthRegistry {
    pub upstream: Dependency,
    pub clickhouse: Dependency,
}

impl HealthRegistry {
    pub fn status(&self) -> ServiceStatus {
        match (self.clickhouse.is_healthy(), self.upstream.is_healthy()) {
            (false, _) => ServiceStatus::Unavailable,
            (true, false) => ServiceStatus::Degraded,
            (true, true) => ServiceStatus::Healthy,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.clickhouse.is_healthy()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::default);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
