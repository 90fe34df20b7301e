//! # strata
//!
//! Append-only, multi-granularity series storage for streaming samples such as
//! market price ticks and trap detections.
//!
//! Each series is identified by `(metric, date, granularity)` and rendered in the
//! backend as `{metric}:{YYYY-MM-DD}:{granularity}`. Appends refresh the key's
//! expiry to the granularity's retention period (7, 30 or 90 days).
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use strata::{Granularity, RawRecord, SeriesKey, SeriesStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SeriesStore::in_memory();
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let key = SeriesKey::new("btc_price", date, Granularity::Minute)?;
//!
//! let tick = RawRecord::new(date.and_hms_opt(14, 0, 0).unwrap(), 85_000.0).with_change_pct(0.01);
//! store.append(&key, &tick.into())?;
//!
//! let records = store.read_all(&key)?;
//! assert_eq!(records.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Rollups and retention live in `strata-timeseries`; ML and dashboard exports
//! live in `strata-export`.

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::len_without_is_empty
)]

pub mod backends;
mod error;
mod granularity;
mod key;
pub mod record;
mod store;

pub use backends::{FileBackend, KvBackend, MemoryBackend};
pub use error::StoreError;
pub use granularity::{Granularity, ParseGranularityError};
pub use key::{KEY_SEPARATOR, SeriesKey};
pub use record::{CompressedRecord, RawRecord, SeriesRecord, timestamp};
pub use store::{SeriesStore, SeriesStoreBuilder};
