//! # strata-timeseries
//!
//! Rollup and retention for [`strata`] series.
//!
//! ## Features
//!
//! - **Rollup**: compress a series into one OHLC record per coarser bucket
//!   (`minute -> hourly -> daily`), keeping open/close/min/max/avg, the summed
//!   `change_pct` and the number of data points
//! - **Retention**: delete series whose key date is older than the granularity's
//!   retention period (7, 30 or 90 days), fail-open per key
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use strata::{Granularity, RawRecord, SeriesKey, SeriesStore};
//! use strata_timeseries::{RetentionSweeper, RollupEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SeriesStore::in_memory();
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let key = SeriesKey::new("btc_price", date, Granularity::Minute)?;
//! store.append(&key, &RawRecord::new(date.and_hms_opt(14, 0, 0).unwrap(), 85_000.0).into())?;
//!
//! RollupEngine::new(store.clone()).compress_chain("btc_price", date)?;
//!
//! let as_of = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
//! let report = RetentionSweeper::new(store).cleanup("btc_price", as_of)?;
//! assert!(report.deleted.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! Scheduling is left to the caller: each invocation does one unit of work.

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
mod error;
pub mod retention;
pub mod rollup;

pub use aggregate::OhlcAggregate;
pub use error::TimeSeriesError;
pub use retention::{RetentionSweeper, SweepReport};
pub use rollup::{RollupConfig, RollupEngine, RollupReport, bucketize};
