//! Retention sweeps driven by the date embedded in each series key.

use chrono::NaiveDate;
use strata::{SeriesKey, SeriesStore, StoreError};

use crate::error::TimeSeriesError;

/// Outcome of a sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Series deleted because they outlived their retention period.
    pub deleted: Vec<SeriesKey>,
    /// Series still within their retention period.
    pub retained: usize,
    /// Series whose delete failed. They are picked up again by the next sweep.
    pub failed: Vec<(SeriesKey, StoreError)>,
}

impl SweepReport {
    /// Returns `true` if every expired series was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, other: SweepReport) {
        self.deleted.extend(other.deleted);
        self.retained += other.retained;
        self.failed.extend(other.failed);
    }
}

/// Deletes series older than their granularity's retention period.
///
/// Age is measured in calendar days from the key's date to the sweep date, not
/// from backend TTLs. A series expires once `age_days * 86400` reaches the
/// retention period. Sweeping is safe to repeat.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: SeriesStore,
}

impl RetentionSweeper {
    /// Creates a sweeper over `store`.
    pub fn new(store: SeriesStore) -> Self {
        Self { store }
    }

    /// Sweeps every series of `metric` as of `as_of`.
    ///
    /// Individual delete failures are collected into the report and do not stop
    /// the sweep; only a failure to list the metric's keys is returned as an error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use strata::{Granularity, RawRecord, SeriesKey, SeriesStore};
    /// use strata_timeseries::RetentionSweeper;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = SeriesStore::in_memory();
    /// let old = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    /// let key = SeriesKey::new("btc_price", old, Granularity::Minute)?;
    /// store.append(&key, &RawRecord::new(old.and_hms_opt(9, 0, 0).unwrap(), 42.0).into())?;
    ///
    /// let as_of = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
    /// let report = RetentionSweeper::new(store).cleanup("btc_price", as_of)?;
    /// assert_eq!(report.deleted, vec![key]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn cleanup(&self, metric: &str, as_of: NaiveDate) -> Result<SweepReport, TimeSeriesError> {
        let mut report = SweepReport::default();

        for key in self.store.enumerate_keys(metric)? {
            if !key.is_expired(as_of) {
                report.retained += 1;
                continue;
            }
            match self.store.delete(&key) {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    #[cfg(feature = "logging")]
                    log::warn!("failed to delete expired series {key}: {e}");
                    report.failed.push((key, e));
                }
            }
        }

        #[cfg(feature = "logging")]
        log::info!(
            "swept {metric} as of {as_of}: {} deleted, {} retained, {} failed",
            report.deleted.len(),
            report.retained,
            report.failed.len()
        );

        Ok(report)
    }

    /// Sweeps every metric that has at least one series.
    ///
    /// Lists outside the series key scheme (training data, dashboard snapshots)
    /// are never touched.
    pub fn cleanup_all(&self, as_of: NaiveDate) -> Result<SweepReport, TimeSeriesError> {
        let mut report = SweepReport::default();
        for metric in self.store.enumerate_metrics()? {
            report.absorb(self.cleanup(&metric, as_of)?);
        }
        Ok(report)
    }
}
