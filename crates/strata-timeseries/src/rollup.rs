//! Rollup of a series into the next-coarser granularity.
//!
//! A rollup reads one `(metric, date, granularity)` series, groups its records
//! into buckets of the coarser granularity and appends one
//! [`CompressedRecord`] per bucket to the coarser series of the same date.
//! Source records are left in place; their retention is handled by the sweeper.

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strata::{CompressedRecord, Granularity, SeriesKey, SeriesRecord, SeriesStore};

use crate::aggregate::OhlcAggregate;
use crate::error::TimeSeriesError;

/// Rollup settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Skip buckets whose start timestamp already has a compressed record in the
    /// target series.
    ///
    /// Default: `false`. Every run appends, so compressing the same series twice
    /// produces duplicate aggregates and the scheduler must run each
    /// `(metric, date, granularity)` at most once per cycle.
    pub skip_existing_buckets: bool,
}

/// Outcome of a single rollup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupReport {
    /// Series that was read.
    pub source: SeriesKey,
    /// Series the aggregates were appended to.
    pub target: SeriesKey,
    /// Number of source records read.
    pub source_records: usize,
    /// Number of compressed records appended.
    pub buckets_written: usize,
    /// Buckets left out because the target already had them.
    pub buckets_skipped: usize,
}

/// Rolls series up along the `minute -> hourly -> daily` chain.
#[derive(Clone)]
pub struct RollupEngine {
    store: SeriesStore,
    config: RollupConfig,
}

impl RollupEngine {
    /// Creates an engine with default settings.
    pub fn new(store: SeriesStore) -> Self {
        Self::with_config(store, RollupConfig::default())
    }

    /// Creates an engine with explicit settings.
    pub fn with_config(store: SeriesStore, config: RollupConfig) -> Self {
        Self { store, config }
    }

    /// Active settings.
    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    /// Compresses `(metric, date, source)` into the next-coarser granularity.
    ///
    /// A source series with no records is a no-op, not an error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use strata::{Granularity, RawRecord, SeriesKey, SeriesStore};
    /// use strata_timeseries::RollupEngine;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = SeriesStore::in_memory();
    /// let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    /// let key = SeriesKey::new("btc_price", date, Granularity::Minute)?;
    /// for minute in 0..3 {
    ///     let ts = date.and_hms_opt(14, minute, 0).unwrap();
    ///     store.append(&key, &RawRecord::new(ts, 100.0 + f64::from(minute)).into())?;
    /// }
    ///
    /// let report = RollupEngine::new(store).compress("btc_price", date, Granularity::Minute)?;
    /// assert_eq!(report.buckets_written, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn compress(
        &self,
        metric: &str,
        date: NaiveDate,
        source: Granularity,
    ) -> Result<RollupReport, TimeSeriesError> {
        let target = source
            .coarser()
            .ok_or(TimeSeriesError::NoCoarserGranularity(source))?;
        let source_key = SeriesKey::new(metric, date, source)?;
        let target_key = source_key.with_granularity(target);

        let records = self.store.read_all(&source_key)?;
        let mut report = RollupReport {
            source: source_key,
            target: target_key,
            source_records: records.len(),
            buckets_written: 0,
            buckets_skipped: 0,
        };
        if records.is_empty() {
            return Ok(report);
        }

        let existing: HashSet<NaiveDateTime> = if self.config.skip_existing_buckets {
            self.store
                .read_all(&report.target)?
                .iter()
                .filter_map(|record| match record {
                    SeriesRecord::Compressed(c) => Some(c.timestamp),
                    SeriesRecord::Raw(_) => None,
                })
                .collect()
        } else {
            HashSet::new()
        };

        for compressed in bucketize(&records, target) {
            if existing.contains(&compressed.timestamp) {
                #[cfg(feature = "logging")]
                log::debug!(
                    "{}: bucket {} already compressed, skipping",
                    report.target,
                    compressed.timestamp
                );
                report.buckets_skipped += 1;
                continue;
            }
            self.store.append(&report.target, &compressed.into())?;
            report.buckets_written += 1;
        }

        #[cfg(feature = "logging")]
        log::info!(
            "rolled up {} ({} records) into {} ({} buckets written, {} skipped)",
            report.source,
            report.source_records,
            report.target,
            report.buckets_written,
            report.buckets_skipped
        );

        Ok(report)
    }

    /// Compresses minute into hourly, then hourly into daily, for one date.
    pub fn compress_chain(
        &self,
        metric: &str,
        date: NaiveDate,
    ) -> Result<Vec<RollupReport>, TimeSeriesError> {
        Granularity::ALL
            .into_iter()
            .filter(|granularity| granularity.coarser().is_some())
            .map(|granularity| self.compress(metric, date, granularity))
            .collect()
    }
}

/// Groups records into `target` buckets and aggregates each bucket.
///
/// Records are ordered by timestamp first (ties keep append order), so `open` and
/// `close` come from the earliest and latest record of each bucket. The result is
/// sorted by bucket start.
pub fn bucketize(records: &[SeriesRecord], target: Granularity) -> Vec<CompressedRecord> {
    let mut ordered: Vec<&SeriesRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.timestamp());

    let mut buckets: BTreeMap<NaiveDateTime, OhlcAggregate> = BTreeMap::new();
    for record in ordered {
        buckets
            .entry(target.bucket_start(record.timestamp()))
            .or_insert_with(OhlcAggregate::empty)
            .add(record);
    }

    buckets
        .into_iter()
        .filter_map(|(start, aggregate)| aggregate.into_record(start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use strata::RawRecord;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        date().and_hms_opt(h, m, s).unwrap()
    }

    fn minute_key() -> SeriesKey {
        SeriesKey::new("btc_price", date(), Granularity::Minute).unwrap()
    }

    #[test]
    fn test_compress_one_hour_of_minutes() {
        let store = SeriesStore::in_memory();
        for i in 0..60u32 {
            let record = RawRecord::new(ts(14, i, 0), 85_000.0 + 10.0 * f64::from(i))
                .with_change_pct(0.01 * f64::from(i));
            store.append(&minute_key(), &record.into()).unwrap();
        }

        let engine = RollupEngine::new(store.clone());
        let report = engine
            .compress("btc_price", date(), Granularity::Minute)
            .unwrap();
        assert_eq!(report.source_records, 60);
        assert_eq!(report.buckets_written, 1);

        let hourly = store
            .read_all(&minute_key().with_granularity(Granularity::Hourly))
            .unwrap();
        assert_eq!(hourly.len(), 1);
        let SeriesRecord::Compressed(record) = &hourly[0] else {
            panic!("expected a compressed record, got {:?}", hourly[0]);
        };
        assert_eq!(record.timestamp, ts(14, 0, 0));
        assert_eq!(record.price_open, 85_000.0);
        assert_eq!(record.price_close, 85_590.0);
        assert_eq!(record.price_min, 85_000.0);
        assert_eq!(record.price_max, 85_590.0);
        assert!((record.price_avg - 85_295.0).abs() < 1e-6);
        assert!((record.change_pct_cumulative - 17.7).abs() < 1e-9);
        assert_eq!(record.data_points, 60);

        // source records are not removed
        assert_eq!(store.len(&minute_key()).unwrap(), 60);
    }

    #[test]
    fn test_compress_empty_series_is_noop() {
        let store = SeriesStore::in_memory();
        let report = RollupEngine::new(store.clone())
            .compress("btc_price", date(), Granularity::Minute)
            .unwrap();

        assert_eq!(report.source_records, 0);
        assert_eq!(report.buckets_written, 0);
        assert!(
            store
                .enumerate_keys("btc_price")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_compress_daily_is_rejected() {
        let engine = RollupEngine::new(SeriesStore::in_memory());
        assert!(matches!(
            engine.compress("btc_price", date(), Granularity::Daily),
            Err(TimeSeriesError::NoCoarserGranularity(Granularity::Daily))
        ));
    }

    #[test]
    fn test_out_of_order_appends_use_timestamp_order() {
        let records: Vec<SeriesRecord> = vec![
            RawRecord::new(ts(9, 30, 0), 3.0).into(),
            RawRecord::new(ts(9, 0, 0), 1.0).into(),
            RawRecord::new(ts(9, 59, 59), 2.0).into(),
            RawRecord::new(ts(10, 0, 0), 7.0).into(),
        ];
        let compressed = bucketize(&records, Granularity::Hourly);

        assert_eq!(compressed.len(), 2);
        assert_eq!(compressed[0].timestamp, ts(9, 0, 0));
        assert_eq!(compressed[0].price_open, 1.0);
        assert_eq!(compressed[0].price_close, 2.0);
        assert_eq!(compressed[0].data_points, 3);
        assert_eq!(compressed[1].timestamp, ts(10, 0, 0));
        assert_eq!(compressed[1].data_points, 1);
    }

    #[test]
    fn test_rerun_appends_duplicates_by_default() {
        let store = SeriesStore::in_memory();
        store
            .append(&minute_key(), &RawRecord::new(ts(14, 0, 0), 1.0).into())
            .unwrap();
        let engine = RollupEngine::new(store.clone());
        engine.compress("btc_price", date(), Granularity::Minute).unwrap();
        engine.compress("btc_price", date(), Granularity::Minute).unwrap();

        let hourly_key = minute_key().with_granularity(Granularity::Hourly);
        assert_eq!(store.len(&hourly_key).unwrap(), 2);
    }

    #[test]
    fn test_skip_existing_buckets() {
        let store = SeriesStore::in_memory();
        store
            .append(&minute_key(), &RawRecord::new(ts(14, 0, 0), 1.0).into())
            .unwrap();
        let engine = RollupEngine::with_config(
            store.clone(),
            RollupConfig {
                skip_existing_buckets: true,
            },
        );
        engine.compress("btc_price", date(), Granularity::Minute).unwrap();

        store
            .append(&minute_key(), &RawRecord::new(ts(15, 0, 0), 2.0).into())
            .unwrap();
        let report = engine
            .compress("btc_price", date(), Granularity::Minute)
            .unwrap();

        assert_eq!(report.buckets_written, 1);
        assert_eq!(report.buckets_skipped, 1);
        let hourly_key = minute_key().with_granularity(Granularity::Hourly);
        assert_eq!(store.len(&hourly_key).unwrap(), 2);
    }

    #[test]
    fn test_compress_chain_reaches_daily() {
        let store = SeriesStore::in_memory();
        for h in [9, 10, 11] {
            for m in [0, 15, 30, 45] {
                let price = f64::from(h * 100 + m);
                store
                    .append(&minute_key(), &RawRecord::new(ts(h, m, 0), price).into())
                    .unwrap();
            }
        }

        let reports = RollupEngine::new(store.clone())
            .compress_chain("btc_price", date())
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].buckets_written, 3);
        assert_eq!(reports[1].source_records, 3);
        assert_eq!(reports[1].buckets_written, 1);

        let daily = store
            .read_all(&minute_key().with_granularity(Granularity::Daily))
            .unwrap();
        let SeriesRecord::Compressed(day) = &daily[0] else {
            panic!("expected a compressed record");
        };
        assert_eq!(day.timestamp, ts(0, 0, 0));
        assert_eq!(day.data_points, 12);
        assert_eq!(day.price_open, 900.0);
        assert_eq!(day.price_close, 1145.0);
        assert_eq!(day.price_min, 900.0);
        assert_eq!(day.price_max, 1145.0);
        assert!((day.price_avg - 1022.5).abs() < 1e-9);
    }

    #[test]
    fn test_random_buckets_hold_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut records: Vec<SeriesRecord> = Vec::new();
        let mut first_price = None;
        let mut last_price = 0.0;
        let n: u32 = 200;
        for i in 0..n {
            let price = rng.random_range(10.0..100_000.0);
            first_price.get_or_insert(price);
            last_price = price;
            records.push(RawRecord::new(ts(14, i / 4, (i % 4) * 15), price).into());
        }

        let compressed = bucketize(&records, Granularity::Hourly);
        assert_eq!(compressed.len(), 1);
        let bucket = &compressed[0];
        assert_eq!(bucket.data_points, u64::from(n));
        assert!(bucket.price_min <= bucket.price_avg);
        assert!(bucket.price_avg <= bucket.price_max);
        assert_eq!(Some(bucket.price_open), first_price);
        assert_eq!(bucket.price_close, last_price);
    }
}
