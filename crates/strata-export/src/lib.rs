//! # strata-export
//!
//! Export views over a [`strata`] store.
//!
//! ## Features
//!
//! - **ML training data**: classified events with their market context, flattened
//!   into one numeric feature row per sample and kept in a single list outside
//!   the retention sweep
//! - **Dashboard**: periodic metric snapshots rendered as a panel-per-metric
//!   document over a time range
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use chrono::NaiveDate;
//! use serde_json::json;
//! use strata::SeriesStore;
//! use strata_export::{DashboardExporter, FeatureContext, TrainingEvent, TrainingExporter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SeriesStore::in_memory();
//! let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let at = day.and_hms_opt(14, 30, 0).unwrap();
//!
//! let training = TrainingExporter::new(store.clone());
//! let event = TrainingEvent { timestamp: at, label: "bull_trap".into(), confidence: 0.82 };
//! let context = FeatureContext {
//!     market_regime: "ranging".into(),
//!     features: serde_json::from_value(json!({"technical": {"rsi": 71.3}}))?,
//! };
//! training.record_training_sample(&event, &context)?;
//! assert_eq!(training.export_training_data(day)?.len(), 1);
//!
//! let dashboard = DashboardExporter::new(store);
//! dashboard.record_snapshot(at, &BTreeMap::from([("trap_count".to_string(), 3.0)]))?;
//! let document = dashboard.export_dashboard(at, at)?;
//! assert_eq!(document.panels.len(), 4);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod dashboard;
mod error;
pub mod ml;

pub use dashboard::{DashboardConfig, DashboardDocument, DashboardExporter, Panel, PanelPoint};
pub use error::{ExportError, ValidationError};
pub use ml::{
    FeatureContext, TrainingConfig, TrainingEvent, TrainingExporter, TrainingRecord,
    flatten_features,
};
