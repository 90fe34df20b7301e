//! Series key construction and parsing.

use crate::error::StoreError;
use crate::granularity::Granularity;
use chrono::NaiveDate;
use std::fmt;

/// Separator between the components of a backend key.
pub const KEY_SEPARATOR: char = ':';

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifies one append-only series: `(metric, date, granularity)`.
///
/// Rendered as `{metric}:{YYYY-MM-DD}:{granularity}` in the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    metric: String,
    date: NaiveDate,
    granularity: Granularity,
}

impl SeriesKey {
    /// Creates a key, rejecting metric names that cannot be addressed.
    pub fn new(
        metric: impl Into<String>,
        date: NaiveDate,
        granularity: Granularity,
    ) -> Result<Self, StoreError> {
        let metric = metric.into();
        validate_metric(&metric)?;
        Ok(Self {
            metric,
            date,
            granularity,
        })
    }

    /// Parses a backend key string.
    ///
    /// Returns `None` for keys that are not series keys (training data, snapshots).
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.rsplitn(3, KEY_SEPARATOR);
        let granularity = parts.next()?.parse::<Granularity>().ok()?;
        let date = NaiveDate::parse_from_str(parts.next()?, DATE_FORMAT).ok()?;
        let metric = parts.next()?;
        if validate_metric(metric).is_err() {
            return None;
        }
        Some(Self {
            metric: metric.to_string(),
            date,
            granularity,
        })
    }

    /// Metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Calendar date (UTC) shared by every record in the series.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Granularity of the series.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Returns the key of the same metric and date at another granularity.
    #[must_use]
    pub fn with_granularity(&self, granularity: Granularity) -> Self {
        Self {
            metric: self.metric.clone(),
            date: self.date,
            granularity,
        }
    }

    /// Whole calendar days between the key's date and `as_of`.
    ///
    /// Negative when the key is dated after `as_of`.
    pub fn age_days(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.date).num_days()
    }

    /// Returns `true` once the key's age reaches its granularity's retention period.
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        let age = self.age_days(as_of);
        age >= 0 && age.unsigned_abs() * 86_400 >= self.granularity.retention_seconds()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.metric,
            self.date.format(DATE_FORMAT),
            self.granularity,
            sep = KEY_SEPARATOR
        )
    }
}

/// Prefix shared by every series key of `metric`.
pub(crate) fn metric_prefix(metric: &str) -> String {
    format!("{metric}{KEY_SEPARATOR}")
}

pub(crate) fn validate_metric(metric: &str) -> Result<(), StoreError> {
    if metric.is_empty() {
        return Err(StoreError::InvalidKey("metric name is empty".to_string()));
    }
    if metric.contains(KEY_SEPARATOR) {
        return Err(StoreError::InvalidKey(format!(
            "metric name '{metric}' contains '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}
