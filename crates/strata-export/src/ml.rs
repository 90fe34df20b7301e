//! Flattened training samples for ML pipelines.
//!
//! Each sample pairs a classified event (label, confidence, time) with the
//! market context observed at that moment. The context arrives as nested
//! groups (`technical`, `volume`, `context`, ...); every numeric leaf is hoisted
//! to a top-level feature so a sample becomes one flat numeric row.
//!
//! Samples go to a single unpartitioned list that is not subject to the
//! granularity retention sweep.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use strata::SeriesStore;

use crate::error::{ExportError, ValidationError};

/// Training export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Name of the list holding training samples.
    ///
    /// Default: `"ml_training_data"`
    pub series_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            series_name: "ml_training_data".to_string(),
        }
    }
}

/// A classified event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingEvent {
    /// When the event was detected.
    #[serde(with = "strata::timestamp")]
    pub timestamp: NaiveDateTime,
    /// Classification label, e.g. `"bull_trap"`.
    pub label: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Market context observed with an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContext {
    /// Market regime name, kept as a string column beside the features.
    pub market_regime: String,
    /// Nested feature groups. Every leaf must be a number.
    pub features: Map<String, Value>,
}

/// One stored training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// Event time.
    #[serde(with = "strata::timestamp")]
    pub timestamp: NaiveDateTime,
    /// Classification label.
    pub label: String,
    /// Classifier confidence.
    pub confidence: f64,
    /// Market regime name.
    pub market_regime: String,
    /// Flat numeric features; integers stay integers.
    pub features: BTreeMap<String, Number>,
}

/// Hoists every leaf of `groups` to a top-level feature.
///
/// Fails on the first non-numeric leaf or on a leaf name that appears twice.
pub fn flatten_features(
    groups: &Map<String, Value>,
) -> Result<BTreeMap<String, Number>, ValidationError> {
    let mut features = BTreeMap::new();
    flatten_into(groups, &mut features)?;
    Ok(features)
}

fn flatten_into(
    map: &Map<String, Value>,
    out: &mut BTreeMap<String, Number>,
) -> Result<(), ValidationError> {
    for (name, value) in map {
        match value {
            Value::Object(nested) => flatten_into(nested, out)?,
            Value::Number(number) => {
                if out.insert(name.clone(), number.clone()).is_some() {
                    return Err(ValidationError::DuplicateFeature(name.clone()));
                }
            }
            other => {
                return Err(ValidationError::NonNumericFeature {
                    name: name.clone(),
                    kind: kind_of(other),
                });
            }
        }
    }
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Records and exports training samples.
#[derive(Clone)]
pub struct TrainingExporter {
    store: SeriesStore,
    config: TrainingConfig,
}

impl TrainingExporter {
    /// Creates an exporter writing to the default training list.
    pub fn new(store: SeriesStore) -> Self {
        Self::with_config(store, TrainingConfig::default())
    }

    /// Creates an exporter with explicit settings.
    pub fn with_config(store: SeriesStore, config: TrainingConfig) -> Self {
        Self { store, config }
    }

    /// Validates, flattens and stores one sample.
    ///
    /// All-or-nothing: a sample with any invalid part is rejected and the
    /// training list is left unchanged.
    pub fn record_training_sample(
        &self,
        event: &TrainingEvent,
        context: &FeatureContext,
    ) -> Result<TrainingRecord, ExportError> {
        let record = match build_record(event, context) {
            Ok(record) => record,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::warn!("rejected training sample at {}: {e}", event.timestamp);
                return Err(e.into());
            }
        };
        self.store.push_list(&self.config.series_name, &record)?;
        Ok(record)
    }

    /// Returns every stored sample dated on or after `start_date`, in append order.
    pub fn export_training_data(
        &self,
        start_date: NaiveDate,
    ) -> Result<Vec<TrainingRecord>, ExportError> {
        let records: Vec<TrainingRecord> = self.store.read_list(&self.config.series_name)?;
        Ok(records
            .into_iter()
            .filter(|record| record.timestamp.date() >= start_date)
            .collect())
    }

    /// Number of stored samples.
    pub fn training_sample_count(&self) -> Result<u64, ExportError> {
        Ok(self.store.list_len(&self.config.series_name)?)
    }
}

fn build_record(
    event: &TrainingEvent,
    context: &FeatureContext,
) -> Result<TrainingRecord, ValidationError> {
    if event.label.trim().is_empty() {
        return Err(ValidationError::EmptyLabel);
    }
    if !(0.0..=1.0).contains(&event.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange(event.confidence));
    }
    Ok(TrainingRecord {
        timestamp: event.timestamp,
        label: event.label.clone(),
        confidence: event.confidence,
        market_regime: context.market_regime.clone(),
        features: flatten_features(&context.features)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(day: u32, label: &str, confidence: f64) -> TrainingEvent {
        TrainingEvent {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
            label: label.to_string(),
            confidence,
        }
    }

    fn context(features: Value) -> FeatureContext {
        let Value::Object(features) = features else {
            panic!("features must be an object");
        };
        FeatureContext {
            market_regime: "ranging".to_string(),
            features,
        }
    }

    fn full_context() -> FeatureContext {
        context(json!({
            "technical": {"rsi": 71.3, "macd": -12.5, "bb_width": 0.031},
            "volume": {"volume_ratio": 2.4, "taker_buy_ratio": 0.58},
            "context": {
                "funding_rate": 0.0001,
                "open_interest": 1_250_000_000u64,
                "long_short_ratio": 1.7,
                "fib_level": 0.618,
                "recent_traps": 3
            }
        }))
    }

    #[test]
    fn test_flatten_hoists_nested_leaves() {
        let features = flatten_features(&full_context().features).unwrap();

        assert_eq!(features.len(), 10);
        assert_eq!(features["rsi"].as_f64(), Some(71.3));
        assert_eq!(features["recent_traps"].as_u64(), Some(3));
        assert!(features["recent_traps"].is_u64());
        assert!(features.keys().all(|k| !k.contains('.')));
    }

    #[test]
    fn test_record_and_read_back() {
        let exporter = TrainingExporter::new(strata::SeriesStore::in_memory());
        let stored = exporter
            .record_training_sample(&event(15, "bull_trap", 0.82), &full_context())
            .unwrap();

        let exported = exporter
            .export_training_data(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .unwrap();
        assert_eq!(exported, vec![stored]);

        let json = serde_json::to_value(&exported[0]).unwrap();
        assert_eq!(json["timestamp"], "2024-01-15T14:30:00");
        assert_eq!(json["market_regime"], "ranging");
        assert!(json["features"]["rsi"].is_number());
    }

    #[test]
    fn test_non_numeric_feature_rejected_atomically() {
        let exporter = TrainingExporter::new(strata::SeriesStore::in_memory());
        exporter
            .record_training_sample(&event(15, "bull_trap", 0.82), &full_context())
            .unwrap();

        let bad = context(json!({
            "technical": {"rsi": 55.0, "trend": "up"},
            "volume": {"volume_ratio": 1.1}
        }));
        let result = exporter.record_training_sample(&event(16, "bear_trap", 0.6), &bad);

        assert!(matches!(
            result,
            Err(ExportError::Validation(ValidationError::NonNumericFeature { ref name, kind: "string" }))
                if name == "trend"
        ));
        assert_eq!(exporter.training_sample_count().unwrap(), 1);
    }

    #[test]
    fn test_other_rejections() {
        let exporter = TrainingExporter::new(strata::SeriesStore::in_memory());

        let null_leaf = context(json!({"context": {"funding_rate": null}}));
        assert!(exporter.record_training_sample(&event(15, "trap", 0.5), &null_leaf).is_err());

        let array_leaf = context(json!({"technical": {"ema": [1.0, 2.0]}}));
        assert!(exporter.record_training_sample(&event(15, "trap", 0.5), &array_leaf).is_err());

        let duplicate = context(json!({"a": {"ratio": 1.0}, "b": {"ratio": 2.0}}));
        assert!(matches!(
            exporter.record_training_sample(&event(15, "trap", 0.5), &duplicate),
            Err(ExportError::Validation(ValidationError::DuplicateFeature(_)))
        ));

        assert!(matches!(
            exporter.record_training_sample(&event(15, "trap", 1.5), &full_context()),
            Err(ExportError::Validation(ValidationError::ConfidenceOutOfRange(_)))
        ));
        assert!(matches!(
            exporter.record_training_sample(&event(15, "  ", 0.5), &full_context()),
            Err(ExportError::Validation(ValidationError::EmptyLabel))
        ));

        assert_eq!(exporter.training_sample_count().unwrap(), 0);
    }

    #[test]
    fn test_export_filters_by_start_date() {
        let exporter = TrainingExporter::new(strata::SeriesStore::in_memory());
        for day in [1, 2, 3] {
            exporter
                .record_training_sample(&event(day, "trap", 0.9), &full_context())
                .unwrap();
        }

        let exported = exporter
            .export_training_data(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .unwrap();
        let days: Vec<NaiveDate> = exported.iter().map(|r| r.timestamp.date()).collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
            ]
        );

        let none = exporter
            .export_training_data(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .unwrap();
        assert!(none.is_empty());
    }
}
