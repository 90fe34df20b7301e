//! OHLC aggregate accumulated while rolling a bucket up.

use chrono::NaiveDateTime;
use strata::{CompressedRecord, RawRecord, SeriesRecord};

/// Running statistics for one bucket.
///
/// Samples must be fed in timestamp order: the first one fixes `open`, the
/// last one seen sets `close`.
///
/// # Fields
///
/// - `open`/`close`: first and last price in the bucket
/// - `min`/`max`: price extrema
/// - `weighted_sum`: sum of prices, each weighted by the data points it stands for
/// - `change_pct`: sum of the samples' `change_pct`
/// - `count`: number of underlying data points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcAggregate {
    /// Price of the first sample.
    pub open: f64,
    /// Price of the last sample.
    pub close: f64,
    /// Lowest price.
    pub min: f64,
    /// Highest price.
    pub max: f64,
    /// Sum of prices weighted by data points.
    pub weighted_sum: f64,
    /// Cumulative `change_pct`.
    pub change_pct: f64,
    /// Number of data points aggregated.
    pub count: u64,
}

impl OhlcAggregate {
    /// Creates an aggregate from a single price.
    pub fn from_price(price: f64, change_pct: f64) -> Self {
        Self {
            open: price,
            close: price,
            min: price,
            max: price,
            weighted_sum: price,
            change_pct,
            count: 1,
        }
    }

    /// Creates an empty aggregate (used as a starting point for accumulation).
    pub fn empty() -> Self {
        Self {
            open: 0.0,
            close: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            weighted_sum: 0.0,
            change_pct: 0.0,
            count: 0,
        }
    }

    /// Accumulates one raw sample. A missing `change_pct` counts as 0.
    pub fn accumulate(&mut self, record: &RawRecord) {
        let change = record.change_pct.unwrap_or(0.0);
        if self.count == 0 {
            *self = Self::from_price(record.price, change);
        } else {
            self.min = self.min.min(record.price);
            self.max = self.max.max(record.price);
            self.weighted_sum += record.price;
            self.change_pct += change;
            self.count += 1;
            self.close = record.price;
        }
    }

    /// Merges an already compressed record into this one.
    #[allow(clippy::cast_precision_loss)]
    pub fn merge(&mut self, record: &CompressedRecord) {
        if record.data_points == 0 {
            return;
        }
        let other = Self {
            open: record.price_open,
            close: record.price_close,
            min: record.price_min,
            max: record.price_max,
            weighted_sum: record.price_avg * record.data_points as f64,
            change_pct: record.change_pct_cumulative,
            count: record.data_points,
        };
        if self.count == 0 {
            *self = other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.weighted_sum += other.weighted_sum;
        self.change_pct += other.change_pct;
        self.count += other.count;
        self.close = other.close;
    }

    /// Folds in either kind of series record.
    pub fn add(&mut self, record: &SeriesRecord) {
        match record {
            SeriesRecord::Raw(raw) => self.accumulate(raw),
            SeriesRecord::Compressed(compressed) => self.merge(compressed),
        }
    }

    /// Mean price, kept within `[min, max]` against rounding drift.
    ///
    /// Returns `0.0` if count is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.weighted_sum / self.count as f64).clamp(self.min, self.max)
        }
    }

    /// Returns true if this aggregate contains no data points.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Converts into the stored record for the bucket starting at `bucket_start`.
    ///
    /// Returns `None` for an empty aggregate.
    pub fn into_record(self, bucket_start: NaiveDateTime) -> Option<CompressedRecord> {
        if self.is_empty() {
            return None;
        }
        Some(CompressedRecord {
            timestamp: bucket_start,
            price_avg: self.average(),
            price_min: self.min,
            price_max: self.max,
            price_open: self.open,
            price_close: self.close,
            change_pct_cumulative: self.change_pct,
            data_points: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_accumulate() {
        let mut agg = OhlcAggregate::empty();
        agg.accumulate(&RawRecord::new(ts(14, 0), 10.0).with_change_pct(0.5));
        agg.accumulate(&RawRecord::new(ts(14, 1), 20.0));
        agg.accumulate(&RawRecord::new(ts(14, 2), 5.0).with_change_pct(-0.25));
        agg.accumulate(&RawRecord::new(ts(14, 3), 15.0));

        assert_eq!(agg.open, 10.0);
        assert_eq!(agg.close, 15.0);
        assert_eq!(agg.min, 5.0);
        assert_eq!(agg.max, 20.0);
        assert_eq!(agg.count, 4);
        assert_eq!(agg.average(), 12.5);
        assert!((agg.change_pct - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_merge_weights_by_data_points() {
        let mut agg = OhlcAggregate::empty();
        agg.merge(&CompressedRecord {
            timestamp: ts(0, 0),
            price_avg: 10.0,
            price_min: 8.0,
            price_max: 12.0,
            price_open: 9.0,
            price_close: 11.0,
            change_pct_cumulative: 1.0,
            data_points: 30,
        });
        agg.merge(&CompressedRecord {
            timestamp: ts(1, 0),
            price_avg: 20.0,
            price_min: 18.0,
            price_max: 25.0,
            price_open: 19.0,
            price_close: 24.0,
            change_pct_cumulative: 2.0,
            data_points: 10,
        });

        assert_eq!(agg.open, 9.0);
        assert_eq!(agg.close, 24.0);
        assert_eq!(agg.min, 8.0);
        assert_eq!(agg.max, 25.0);
        assert_eq!(agg.count, 40);
        assert_eq!(agg.average(), 12.5); // (300 + 200) / 40
        assert_eq!(agg.change_pct, 3.0);
    }

    #[test]
    fn test_single_sample_record() {
        let mut agg = OhlcAggregate::empty();
        agg.accumulate(&RawRecord::new(ts(14, 7), 0.1));
        let record = agg.into_record(ts(14, 0)).unwrap();

        assert_eq!(record.price_open, 0.1);
        assert_eq!(record.price_close, 0.1);
        assert_eq!(record.price_avg, 0.1);
        assert_eq!(record.price_min, 0.1);
        assert_eq!(record.price_max, 0.1);
        assert_eq!(record.data_points, 1);
        assert_eq!(record.change_pct_cumulative, 0.0);
    }

    #[test]
    fn test_average_clamped() {
        // 0.1 summed ten times drifts away from 1.0
        let mut agg = OhlcAggregate::empty();
        for m in 0..10 {
            agg.accumulate(&RawRecord::new(ts(14, m), 0.1));
        }
        let avg = agg.average();
        assert!(agg.min <= avg && avg <= agg.max);
    }

    #[test]
    fn test_empty() {
        let agg = OhlcAggregate::empty();
        assert!(agg.is_empty());
        assert_eq!(agg.average(), 0.0);
        assert!(agg.into_record(ts(14, 0)).is_none());
    }
}
