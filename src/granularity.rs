//! Granularity policy: retention periods and the rollup chain.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 86_400;

/// Time granularity of a series.
///
/// The ordering follows the rollup chain: `Minute < Hourly < Daily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Per-minute samples, kept for 7 days.
    Minute,
    /// Hourly samples or aggregates, kept for 30 days.
    Hourly,
    /// Daily samples or aggregates, kept for 90 days.
    Daily,
}

impl Granularity {
    /// All granularities, finest first.
    pub const ALL: [Granularity; 3] = [Self::Minute, Self::Hourly, Self::Daily];

    /// Retention period in seconds.
    ///
    /// These values are shared with existing stored data and must not change.
    pub const fn retention_seconds(self) -> u64 {
        match self {
            Self::Minute => 7 * SECONDS_PER_DAY,
            Self::Hourly => 30 * SECONDS_PER_DAY,
            Self::Daily => 90 * SECONDS_PER_DAY,
        }
    }

    /// Retention period as a [`Duration`].
    pub const fn retention(self) -> Duration {
        Duration::from_secs(self.retention_seconds())
    }

    /// The next-finer granularity this one is compressed from.
    pub const fn source(self) -> Option<Self> {
        match self {
            Self::Minute => None,
            Self::Hourly => Some(Self::Minute),
            Self::Daily => Some(Self::Hourly),
        }
    }

    /// The next-coarser granularity this one compresses into.
    pub const fn coarser(self) -> Option<Self> {
        match self {
            Self::Minute => Some(Self::Hourly),
            Self::Hourly => Some(Self::Daily),
            Self::Daily => None,
        }
    }

    /// Name used in series keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }

    /// Truncates a timestamp to the start of the window of this granularity.
    ///
    /// For example, with `Granularity::Hourly`, `14:37:12` becomes `14:00:00`.
    pub fn bucket_start(self, timestamp: NaiveDateTime) -> NaiveDateTime {
        let (date, hour, minute) = (timestamp.date(), timestamp.hour(), timestamp.minute());
        let truncated = match self {
            Self::Minute => date.and_hms_opt(hour, minute, 0),
            Self::Hourly => date.and_hms_opt(hour, 0, 0),
            Self::Daily => date.and_hms_opt(0, 0, 0),
        };
        // hour/minute taken from a valid timestamp are always in range
        truncated.unwrap_or(timestamp)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown granularity name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGranularityError(
    /// The name that failed to parse.
    pub String,
);

impl fmt::Display for ParseGranularityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown granularity '{}'", self.0)
    }
}

impl std::error::Error for ParseGranularityError {}

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(Self::Minute),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            other => Err(ParseGranularityError(other.to_string())),
        }
    }
}
