//! Pipeline configuration as loaded from files and environment.

use cron::Schedule;
use pulse_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use crate::broadcast::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::dispatch::DEFAULT_DISPATCH_CAPACITY;
use crate::pool::DEFAULT_WORKER_COUNT;
use crate::queue::OverflowPolicy;
use crate::scheduler::WorkerConfig;

/// `pipeline` section of the service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Seconds between event feed polls
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Number of refresh workers
    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Buffered work items between ingestion and workers
    #[validate(range(min = 1, max = 100_000))]
    #[serde(default = "default_dispatch_capacity")]
    pub dispatch_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// Buffered updates per live subscriber
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Resources sent to a new subscriber before live updates
    #[validate(range(max = 1000))]
    #[serde(default = "default_snapshot_size")]
    pub snapshot_size: usize,
    /// Six-field cron expression (with seconds) for hourly rollups
    #[serde(default = "default_hourly_cron")]
    pub hourly_cron: String,
    /// Six-field cron expression (with seconds) for daily rollups
    #[serde(default = "default_daily_cron")]
    pub daily_cron: String,
    /// Seconds between metrics log lines
    #[validate(range(min = 1))]
    #[serde(default = "default_metrics_log_interval_secs")]
    pub metrics_log_interval_secs: u64,
    /// Upper bound on joining background tasks at shutdown
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_dispatch_capacity() -> usize {
    DEFAULT_DISPATCH_CAPACITY
}

fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}

fn default_snapshot_size() -> usize {
    30
}

fn default_hourly_cron() -> String {
    "0 5 * * * *".to_string()
}

fn default_daily_cron() -> String {
    "0 10 0 * * *".to_string()
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            worker_count: default_worker_count(),
            dispatch_capacity: default_dispatch_capacity(),
            overflow_policy: OverflowPolicy::default(),
            subscriber_capacity: default_subscriber_capacity(),
            snapshot_size: default_snapshot_size(),
            hourly_cron: default_hourly_cron(),
            daily_cron: default_daily_cron(),
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn parse_schedule(name: &str, expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr)
        .map_err(|e| Error::config(format!("invalid {} cron expression {:?}: {}", name, expr, e)))
}

impl PipelineConfig {
    /// Validate ranges and cron expressions, then build the scheduler config.
    pub fn to_worker_config(&self) -> Result<WorkerConfig> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid pipeline config: {}", e)))?;

        Ok(WorkerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            worker_count: self.worker_count,
            dispatch_capacity: self.dispatch_capacity,
            overflow_policy: self.overflow_policy,
            hourly_schedule: parse_schedule("hourly", &self.hourly_cron)?,
            daily_schedule: parse_schedule("daily", &self.daily_cron)?,
            metrics_log_interval: Duration::from_secs(self.metrics_log_interval_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        })
    }
}
