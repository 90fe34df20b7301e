//! The series store: typed records on top of a [`KvBackend`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backends::{FileBackend, KvBackend, MemoryBackend};
use crate::error::StoreError;
use crate::granularity::Granularity;
use crate::key::{SeriesKey, metric_prefix, validate_metric};
use crate::record::SeriesRecord;

/// Handle to a series store.
///
/// Cloning is cheap; clones share the same backend. Components receive a
/// handle in their constructor instead of reaching for global state.
#[derive(Clone)]
pub struct SeriesStore {
    backend: Arc<dyn KvBackend>,
    refresh_expiry: bool,
}

impl SeriesStore {
    /// Returns a builder for configuring a store.
    pub fn builder() -> SeriesStoreBuilder {
        SeriesStoreBuilder::new()
    }

    /// Creates a store backed by process memory.
    pub fn in_memory() -> Self {
        Self::builder().in_memory()
    }

    /// Opens a store persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::builder().open(path)
    }

    /// Shared handle to the underlying backend.
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Appends a record to the series at `key`.
    ///
    /// The key is created on first append and its expiry is (re)set to the
    /// granularity's retention period in the same backend write. Records are
    /// validated first; a rejected or failed append leaves the series untouched.
    pub fn append(&self, key: &SeriesKey, record: &SeriesRecord) -> Result<(), StoreError> {
        record.validate()?;
        let raw_key = key.to_string();
        let bytes = serde_json::to_vec(record)?;
        if self.refresh_expiry {
            self.backend
                .push_with_ttl(&raw_key, &bytes, key.granularity().retention())?;
        } else {
            self.backend.push(&raw_key, &bytes)?;
        }
        Ok(())
    }

    /// Returns every record of the series at `key` in append order.
    ///
    /// A series that does not exist reads as empty. An entry that decodes as
    /// neither a raw nor a compressed record fails the whole read with
    /// [`StoreError::Serialization`].
    pub fn read_all(&self, key: &SeriesKey) -> Result<Vec<SeriesRecord>, StoreError> {
        self.read_list(&key.to_string())
    }

    /// Number of records in the series at `key`.
    pub fn len(&self, key: &SeriesKey) -> Result<u64, StoreError> {
        self.backend.len(&key.to_string())
    }

    /// Deletes the series at `key`. Deleting a missing series succeeds.
    pub fn delete(&self, key: &SeriesKey) -> Result<(), StoreError> {
        self.backend.delete(&key.to_string())?;
        Ok(())
    }

    /// Lists every series of `metric`, ordered by date then granularity.
    pub fn enumerate_keys(&self, metric: &str) -> Result<Vec<SeriesKey>, StoreError> {
        validate_metric(metric)?;
        let mut keys: Vec<SeriesKey> = self
            .backend
            .keys_with_prefix(&metric_prefix(metric))?
            .iter()
            .filter_map(|raw| parse_series_key(raw))
            .filter(|key| key.metric() == metric)
            .collect();
        keys.sort_by_key(|key| (key.date(), key.granularity()));
        Ok(keys)
    }

    /// Lists every metric that has at least one series.
    pub fn enumerate_metrics(&self) -> Result<Vec<String>, StoreError> {
        let mut metrics: Vec<String> = self
            .backend
            .keys_with_prefix("")?
            .iter()
            .filter_map(|raw| parse_series_key(raw))
            .map(|key| key.metric().to_string())
            .collect();
        metrics.sort();
        metrics.dedup();
        Ok(metrics)
    }

    /// Convenience for building a key and appending in one call.
    pub fn append_at(
        &self,
        metric: &str,
        date: NaiveDate,
        granularity: Granularity,
        record: &SeriesRecord,
    ) -> Result<(), StoreError> {
        self.append(&SeriesKey::new(metric, date, granularity)?, record)
    }

    /// Appends any serializable record to an unpartitioned list.
    ///
    /// Unpartitioned lists carry no expiry.
    pub fn push_list<R: Serialize>(&self, name: &str, record: &R) -> Result<u64, StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.backend.push(name, &bytes)
    }

    /// Reads an unpartitioned list in append order.
    pub fn read_list<R: DeserializeOwned>(&self, name: &str) -> Result<Vec<R>, StoreError> {
        self.backend
            .range_all(name)?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }

    /// Length of an unpartitioned list.
    pub fn list_len(&self, name: &str) -> Result<u64, StoreError> {
        self.backend.len(name)
    }

    /// Stores a single serializable value, optionally expiring after `ttl`.
    pub fn put_value<R: Serialize>(
        &self,
        key: &str,
        value: &R,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(key, &bytes)?;
        if let Some(ttl) = ttl {
            self.backend.expire(key, ttl)?;
        }
        Ok(())
    }

    /// Reads a single value.
    pub fn get_value<R: DeserializeOwned>(&self, key: &str) -> Result<Option<R>, StoreError> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lists every live key (list or value) starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.backend.keys_with_prefix(prefix)
    }

    /// Reads every value whose key starts with `prefix`, sorted by key.
    pub fn scan_values<R: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, R)>, StoreError> {
        let mut values = Vec::new();
        for key in self.backend.keys_with_prefix(prefix)? {
            // the key may expire or be deleted between enumeration and read
            if let Some(value) = self.get_value(&key)? {
                values.push((key, value));
            }
        }
        Ok(values)
    }

    /// Removes every expired key from the backend.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.backend.purge_expired()
    }
}

fn parse_series_key(raw: &str) -> Option<SeriesKey> {
    let key = SeriesKey::parse(raw);
    #[cfg(feature = "logging")]
    if key.is_none() {
        log::debug!("skipping non-series key '{raw}'");
    }
    key
}

/// Builder for configuring and opening a [`SeriesStore`].
///
/// # Example
///
/// ```rust,no_run
/// use strata::SeriesStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SeriesStore::builder()
///     .refresh_expiry(true)
///     .open("prices.strata")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SeriesStoreBuilder {
    refresh_expiry: bool,
}

impl SeriesStoreBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            refresh_expiry: true,
        }
    }

    /// Whether each append refreshes the key's expiry to the granularity's
    /// retention period.
    ///
    /// Default: `true`
    #[must_use]
    pub fn refresh_expiry(mut self, refresh: bool) -> Self {
        self.refresh_expiry = refresh;
        self
    }

    /// Builds a store on a fresh [`MemoryBackend`].
    pub fn in_memory(self) -> SeriesStore {
        self.with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Opens or creates a [`FileBackend`] at `path`.
    pub fn open(self, path: impl AsRef<Path>) -> Result<SeriesStore, StoreError> {
        Ok(self.with_backend(Arc::new(FileBackend::open(path)?)))
    }

    /// Builds a store on an existing backend.
    pub fn with_backend(self, backend: Arc<dyn KvBackend>) -> SeriesStore {
        SeriesStore {
            backend,
            refresh_expiry: self.refresh_expiry,
        }
    }
}

impl Default for SeriesStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CompressedRecord, RawRecord};
    use chrono::NaiveDateTime;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        date(d).and_hms_opt(h, m, 0).unwrap()
    }

    fn key(metric: &str, d: u32, g: Granularity) -> SeriesKey {
        SeriesKey::new(metric, date(d), g).unwrap()
    }

    #[test]
    fn test_append_then_read_all() {
        let store = SeriesStore::in_memory();
        let k = key("btc_price", 15, Granularity::Minute);

        let first = SeriesRecord::from(RawRecord::new(ts(15, 14, 0), 85_000.0));
        let second = SeriesRecord::from(
            RawRecord::new(ts(15, 14, 1), 85_010.123_456_789)
                .with_change_pct(0.011_764_7)
                .with_field("regime", "ranging"),
        );
        store.append(&k, &first).unwrap();
        store.append(&k, &second).unwrap();

        let records = store.read_all(&k).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], first);
        assert_eq!(records.last(), Some(&second));
        assert_eq!(store.len(&k).unwrap(), 2);
    }

    #[test]
    fn test_read_missing_series_is_empty() {
        let store = SeriesStore::in_memory();
        let records = store.read_all(&key("btc_price", 13, Granularity::Daily)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_delete_twice_succeeds() {
        let store = SeriesStore::in_memory();
        let k = key("btc_price", 15, Granularity::Hourly);
        store
            .append(&k, &RawRecord::new(ts(15, 14, 0), 1.0).into())
            .unwrap();

        store.delete(&k).unwrap();
        assert!(store.read_all(&k).unwrap().is_empty());
        store.delete(&k).unwrap();
        assert!(store.read_all(&k).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_record_not_written() {
        let store = SeriesStore::in_memory();
        let k = key("btc_price", 15, Granularity::Minute);
        let result = store.append(&k, &RawRecord::new(ts(15, 14, 0), f64::INFINITY).into());

        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert_eq!(store.len(&k).unwrap(), 0);
    }

    #[test]
    fn test_enumerate_keys_only_for_metric() {
        let store = SeriesStore::in_memory();
        let record: SeriesRecord = RawRecord::new(ts(15, 14, 0), 1.0).into();
        store.append(&key("btc", 16, Granularity::Minute), &record).unwrap();
        store.append(&key("btc", 15, Granularity::Hourly), &record).unwrap();
        store.append(&key("btc", 15, Granularity::Minute), &record).unwrap();
        store.append(&key("btc_price", 15, Granularity::Minute), &record).unwrap();
        store.push_list("btc", &record).unwrap();

        let keys = store.enumerate_keys("btc").unwrap();
        assert_eq!(
            keys,
            vec![
                key("btc", 15, Granularity::Minute),
                key("btc", 15, Granularity::Hourly),
                key("btc", 16, Granularity::Minute),
            ]
        );
        assert_eq!(
            store.enumerate_metrics().unwrap(),
            vec!["btc".to_string(), "btc_price".to_string()]
        );
    }

    #[test]
    fn test_entry_without_price_fails_read() {
        let store = SeriesStore::in_memory();
        let k = key("trap_count", 15, Granularity::Minute);
        store
            .append(&k, &RawRecord::new(ts(15, 14, 0), 3.0).with_field("label", "bull_trap").into())
            .unwrap();
        store
            .push_list(&k.to_string(), &serde_json::json!({"timestamp": "2024-01-15T14:01:00", "label": "bear_trap"}))
            .unwrap();

        assert!(matches!(store.read_all(&k), Err(StoreError::Serialization(_))));
        assert_eq!(store.len(&k).unwrap(), 2);
    }

    #[test]
    fn test_compressed_record_round_trip() {
        let store = SeriesStore::in_memory();
        let k = key("btc", 15, Granularity::Hourly);
        let record = SeriesRecord::from(CompressedRecord {
            timestamp: ts(15, 14, 0),
            price_avg: 85_295.0,
            price_min: 85_000.0,
            price_max: 85_590.0,
            price_open: 85_000.0,
            price_close: 85_590.0,
            change_pct_cumulative: 17.7,
            data_points: 60,
        });
        store.append(&k, &record).unwrap();
        assert_eq!(store.read_all(&k).unwrap(), vec![record]);
    }

    #[test]
    fn test_values_and_scan() {
        let store = SeriesStore::in_memory();
        store.put_value("snap:2", &2.5f64, None).unwrap();
        store.put_value("snap:1", &1.5f64, None).unwrap();
        store.put_value("other:1", &9.0f64, None).unwrap();

        let values: Vec<(String, f64)> = store.scan_values("snap:").unwrap();
        assert_eq!(
            values,
            vec![("snap:1".to_string(), 1.5), ("snap:2".to_string(), 2.5)]
        );
        assert_eq!(store.get_value::<f64>("missing").unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.strata");
        let k = key("btc", 15, Granularity::Minute);
        let record = SeriesRecord::from(RawRecord::new(ts(15, 14, 0), 85_000.0).with_change_pct(0.0));

        {
            let store = SeriesStore::open(&path).unwrap();
            store.append(&k, &record).unwrap();
        }

        let store = SeriesStore::open(&path).unwrap();
        assert_eq!(store.read_all(&k).unwrap(), vec![record]);
    }
}
