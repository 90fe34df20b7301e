//! Record types stored in series.
//!
//! Producers append [`RawRecord`]s; the rollup engine appends [`CompressedRecord`]s.
//! Both travel through the store as a [`SeriesRecord`], which is validated before
//! it is written so malformed records never enter a series.

use crate::error::StoreError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Second-precision ISO-8601 timestamps (`YYYY-MM-DDTHH:MM:SS`, UTC).
///
/// Use with `#[serde(with = "strata::timestamp")]`. Parsing also accepts RFC 3339
/// strings with an offset (converted to UTC) and fractional seconds (truncated).
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Format used when writing timestamps.
    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    /// Formats a timestamp at second precision.
    pub fn format(ts: &NaiveDateTime) -> String {
        ts.format(FORMAT).to_string()
    }

    /// Parses a timestamp written by this crate or by an ISO-8601 producer.
    pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        let parsed = match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => dt.naive_utc(),
            Err(_) => raw
                .parse::<NaiveDateTime>()
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))?,
        };
        Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
    }

    /// Serde serializer.
    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    /// Serde deserializer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }
}

/// A sample written by a producer.
///
/// `timestamp` and `price` are required; any other producer-defined fields
/// (`regime`, `volume`, ...) are kept verbatim in `extra`. Samples whose main
/// payload is not a price, such as trap detections, store that number in
/// `price` (a count, a score) and carry the rest in `extra`. A stored entry
/// matching neither record shape makes [`SeriesStore::read_all`] fail with
/// [`StoreError::Serialization`].
///
/// [`SeriesStore::read_all`]: crate::SeriesStore::read_all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Sample time, second precision.
    #[serde(with = "timestamp")]
    pub timestamp: NaiveDateTime,
    /// Observed price.
    pub price: f64,
    /// Percent change since the previous sample, if the producer tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    /// Producer-defined fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Creates a record with only the required fields.
    pub fn new(timestamp: NaiveDateTime, price: f64) -> Self {
        Self {
            timestamp,
            price,
            change_pct: None,
            extra: Map::new(),
        }
    }

    /// Sets `change_pct`.
    #[must_use]
    pub fn with_change_pct(mut self, change_pct: f64) -> Self {
        self.change_pct = Some(change_pct);
        self
    }

    /// Adds a producer-defined field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// One aggregate produced by the rollup engine for a single time bucket.
///
/// Field names are consumed downstream and must stay exactly as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedRecord {
    /// Bucket start.
    #[serde(with = "timestamp")]
    pub timestamp: NaiveDateTime,
    /// Mean price over the bucket.
    pub price_avg: f64,
    /// Lowest price in the bucket.
    pub price_min: f64,
    /// Highest price in the bucket.
    pub price_max: f64,
    /// Price of the first source record.
    pub price_open: f64,
    /// Price of the last source record.
    pub price_close: f64,
    /// Sum of the source records' `change_pct`.
    pub change_pct_cumulative: f64,
    /// Number of samples aggregated.
    pub data_points: u64,
}

/// Any record that can live in a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesRecord {
    /// Output of a rollup.
    Compressed(CompressedRecord),
    /// Producer sample.
    Raw(RawRecord),
}

impl SeriesRecord {
    /// Timestamp of the sample or bucket start.
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            SeriesRecord::Compressed(r) => r.timestamp,
            SeriesRecord::Raw(r) => r.timestamp,
        }
    }

    /// Checks the record before it is written.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            SeriesRecord::Raw(r) => {
                ensure_finite("price", r.price)?;
                if let Some(change) = r.change_pct {
                    ensure_finite("change_pct", change)?;
                }
                Ok(())
            }
            SeriesRecord::Compressed(r) => {
                for (name, value) in [
                    ("price_avg", r.price_avg),
                    ("price_min", r.price_min),
                    ("price_max", r.price_max),
                    ("price_open", r.price_open),
                    ("price_close", r.price_close),
                    ("change_pct_cumulative", r.change_pct_cumulative),
                ] {
                    ensure_finite(name, value)?;
                }
                if r.data_points == 0 {
                    return Err(StoreError::InvalidRecord(
                        "compressed record with zero data points".to_string(),
                    ));
                }
                if !(r.price_min <= r.price_avg && r.price_avg <= r.price_max) {
                    return Err(StoreError::InvalidRecord(format!(
                        "price_avg {} outside [{}, {}]",
                        r.price_avg, r.price_min, r.price_max
                    )));
                }
                Ok(())
            }
        }
    }
}

impl From<RawRecord> for SeriesRecord {
    fn from(record: RawRecord) -> Self {
        SeriesRecord::Raw(record)
    }
}

impl From<CompressedRecord> for SeriesRecord {
    fn from(record: CompressedRecord) -> Self {
        SeriesRecord::Compressed(record)
    }
}

fn ensure_finite(name: &str, value: f64) -> Result<(), StoreError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::InvalidRecord(format!("{name} is not finite: {value}")))
    }
}
