//! Metric snapshots and the dashboard document built from them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strata::{KEY_SEPARATOR, SeriesStore, StoreError, timestamp};

use crate::error::ExportError;

/// Dashboard export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Prefix of every snapshot key.
    ///
    /// Default: `"dashboard_metrics"`
    pub key_prefix: String,

    /// Data origin named in every exported document.
    ///
    /// Default: `"strata"`
    pub datasource: String,

    /// Metrics that get a panel, in panel order.
    ///
    /// Default: `trap_count`, `confidence_avg`, `price_change_avg`, `volatility`
    pub tracked_metrics: Vec<String>,

    /// Expiry applied to each snapshot. `None` keeps snapshots forever.
    ///
    /// Default: `None`
    pub snapshot_ttl: Option<Duration>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            key_prefix: "dashboard_metrics".to_string(),
            datasource: "strata".to_string(),
            tracked_metrics: ["trap_count", "confidence_avg", "price_change_avg", "volatility"]
                .into_iter()
                .map(String::from)
                .collect(),
            snapshot_ttl: None,
        }
    }
}

/// One value of a metric at a snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelPoint {
    /// Snapshot time.
    #[serde(with = "strata::timestamp")]
    pub timestamp: NaiveDateTime,
    /// Metric value.
    pub value: f64,
}

/// The values of one metric across the exported range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    /// Metric name.
    pub metric: String,
    /// Values in chronological order.
    pub values: Vec<PanelPoint>,
}

/// A rendered dashboard: one panel per tracked metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDocument {
    /// Data origin.
    pub datasource: String,
    /// Panels in tracked-metric order.
    pub panels: Vec<Panel>,
}

impl DashboardDocument {
    /// Renders the document as `{"datasource": .., "panels": [..]}`.
    pub fn to_json(&self) -> Value {
        let panels: Vec<Value> = self
            .panels
            .iter()
            .map(|panel| {
                let values: Vec<Value> = panel
                    .values
                    .iter()
                    .map(|point| {
                        json!({
                            "timestamp": timestamp::format(&point.timestamp),
                            "value": point.value,
                        })
                    })
                    .collect();
                json!({ "metric": panel.metric, "values": values })
            })
            .collect();
        json!({ "datasource": self.datasource, "panels": panels })
    }
}

/// Stores metric snapshots and exports them as dashboard documents.
#[derive(Clone)]
pub struct DashboardExporter {
    store: SeriesStore,
    config: DashboardConfig,
}

impl DashboardExporter {
    /// Creates an exporter with the default configuration.
    pub fn new(store: SeriesStore) -> Self {
        Self::with_config(store, DashboardConfig::default())
    }

    /// Creates an exporter with explicit settings.
    pub fn with_config(store: SeriesStore, config: DashboardConfig) -> Self {
        Self { store, config }
    }

    /// Current settings.
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Stores `metrics` as the snapshot at `at`, truncated to the second.
    ///
    /// A second snapshot at the same second replaces the first. A snapshot with
    /// a NaN or infinite value is rejected with [`StoreError::InvalidRecord`] and
    /// nothing is written.
    pub fn record_snapshot(
        &self,
        at: NaiveDateTime,
        metrics: &BTreeMap<String, f64>,
    ) -> Result<(), ExportError> {
        if let Some((name, value)) = metrics.iter().find(|(_, value)| !value.is_finite()) {
            return Err(StoreError::InvalidRecord(format!(
                "snapshot metric '{name}' is not finite: {value}"
            ))
            .into());
        }
        let at = at.with_nanosecond(0).unwrap_or(at);
        self.store
            .put_value(&self.snapshot_key(&at), metrics, self.config.snapshot_ttl)?;
        Ok(())
    }

    /// Builds a document from every snapshot with `start <= time <= end`.
    ///
    /// Every tracked metric gets a panel, possibly empty. A snapshot that lacks
    /// a metric, or holds a non-numeric value for it, adds no point to that panel.
    pub fn export_dashboard(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<DashboardDocument, ExportError> {
        let prefix = format!("{}{KEY_SEPARATOR}", self.config.key_prefix);
        let mut snapshots: Vec<(NaiveDateTime, Value)> = Vec::new();
        for key in self.store.keys_with_prefix(&prefix)? {
            // series keys of a metric named like the prefix share the scan
            let Some(at) = key
                .strip_prefix(&prefix)
                .and_then(|suffix| timestamp::parse(suffix).ok())
            else {
                continue;
            };
            if at < start || at > end {
                continue;
            }
            match self.store.get_value::<Value>(&key) {
                Ok(Some(snapshot)) => snapshots.push((at, snapshot)),
                // expired or deleted since enumeration, or not a snapshot at all
                Ok(None) | Err(StoreError::WrongType { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        snapshots.sort_by_key(|(at, _)| *at);

        let panels = self
            .config
            .tracked_metrics
            .iter()
            .map(|metric| Panel {
                metric: metric.clone(),
                values: snapshots
                    .iter()
                    .filter_map(|(at, snapshot)| {
                        let value = snapshot.get(metric)?.as_f64()?;
                        Some(PanelPoint {
                            timestamp: *at,
                            value,
                        })
                    })
                    .collect(),
            })
            .collect();

        Ok(DashboardDocument {
            datasource: self.config.datasource.clone(),
            panels,
        })
    }

    fn snapshot_key(&self, at: &NaiveDateTime) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}",
            self.config.key_prefix,
            timestamp::format(at)
        )
    }
}
