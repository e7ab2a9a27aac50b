//! Time buckets and statistic rows.

use chrono::{DateTime, Duration, DurationRound, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Width of a statistics bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Hourly, Granularity::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }

    /// Width of one bucket.
    pub fn unit(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    /// Align `t` down to the start of its bucket. Never rounds up.
    pub fn truncate(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match t.duration_trunc(self.unit()) {
            Ok(start) => start,
            // Only reachable for instants outside chrono's nanosecond range.
            Err(_) => self.truncate_by_fields(t),
        }
    }

    fn truncate_by_fields(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        let hour = match self {
            Self::Hourly => t.hour(),
            Self::Daily => 0,
        };
        date.and_hms_opt(hour, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or(t)
    }

    /// The bucket containing `t`.
    pub fn bucket_of(&self, t: DateTime<Utc>) -> BucketWindow {
        let start = self.truncate(t);
        BucketWindow {
            granularity: *self,
            start,
            end: start + self.unit(),
        }
    }

    /// The most recent bucket that has fully elapsed at `now`: the one
    /// immediately preceding the bucket `now` falls in.
    pub fn completed_bucket(&self, now: DateTime<Utc>) -> BucketWindow {
        let current = self.truncate(now);
        let start = current - self.unit();
        BucketWindow {
            granularity: *self,
            start,
            end: current,
        }
    }

    /// Storage table for this granularity's buckets.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Hourly => "stats_hourly",
            Self::Daily => "stats_daily",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" | "hour" => Ok(Self::Hourly),
            "daily" | "day" => Ok(Self::Daily),
            other => Err(Error::config(format!("unknown granularity: {}", other))),
        }
    }
}

/// A half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWindow {
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BucketWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// What a statistic row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Raw events grouped by event type.
    Category,
    /// Refreshed resources grouped by normalized tag.
    Tag,
    /// Refreshed resources grouped by primary language.
    Language,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Category, Dimension::Tag, Dimension::Language];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Tag => "tag",
            Self::Language => "language",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "category" => Ok(Self::Category),
            "tag" | "topic" => Ok(Self::Tag),
            "language" => Ok(Self::Language),
            other => Err(Error::config(format!("unknown dimension: {}", other))),
        }
    }
}

/// One aggregate row: `count` occurrences of `dimension_value` in the bucket
/// starting at `bucket_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticBucket {
    pub dimension: Dimension,
    pub dimension_value: String,
    pub count: u64,
    pub bucket_start: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}
