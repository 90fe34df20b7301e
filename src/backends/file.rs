use std::path::Path;
use std::time::Duration;

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use super::{KvBackend, deadline_ms, now_ms};
use crate::StoreError;

const LISTS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("strata_lists");
const VALUES: TableDefinition<&str, &[u8]> = TableDefinition::new("strata_values");
const EXPIRY: TableDefinition<&str, u64> = TableDefinition::new("strata_expiry");

const CHECKSUM_LEN: usize = 4;

/// Persistent backend stored in a single `redb` file.
///
/// List elements are keyed by `(key, sequence)` so a range scan returns them in
/// append order. Every payload is prefixed with its CRC32 and verified on read.
pub struct FileBackend {
    db: Database,
}

impl FileBackend {
    /// Opens or creates the backend file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(redb::Error::from)?;
        let backend = Self { db };
        // Create the tables up front so read transactions never see them missing
        let txn = backend.begin_write()?;
        {
            txn.open_table(LISTS).map_err(redb::Error::from)?;
            txn.open_table(VALUES).map_err(redb::Error::from)?;
            txn.open_table(EXPIRY).map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(backend)
    }

    /// Pushes `value` and, when `ttl` is set, moves the key's deadline in the
    /// same write transaction.
    fn append(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<u64, StoreError> {
        let txn = self.begin_write()?;
        let len = {
            drop_if_expired(&txn, key, now_ms())?;

            let values = txn.open_table(VALUES).map_err(redb::Error::from)?;
            if values.get(key).map_err(redb::Error::from)?.is_some() {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                });
            }

            let mut lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
            let next_seq = list_len(&lists, key)?;
            lists
                .insert((key, next_seq), frame(value).as_slice())
                .map_err(redb::Error::from)?;
            if let Some(ttl) = ttl {
                let mut expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
                expiry
                    .insert(key, deadline_ms(ttl))
                    .map_err(redb::Error::from)?;
            }
            next_seq + 1
        };
        Self::commit(txn)?;
        Ok(len)
    }

    fn begin_write(&self) -> Result<WriteTransaction, StoreError> {
        Ok(self.db.begin_write().map_err(redb::Error::from)?)
    }

    fn commit(txn: WriteTransaction) -> Result<(), StoreError> {
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(CHECKSUM_LEN + payload.len());
    framed.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    framed.extend_from_slice(payload);
    framed
}

fn unframe(key: &str, framed: &[u8]) -> Result<Vec<u8>, StoreError> {
    if framed.len() < CHECKSUM_LEN {
        return Err(StoreError::Corrupted {
            key: key.to_string(),
        });
    }
    let (checksum, payload) = framed.split_at(CHECKSUM_LEN);
    let expected = u32::from_le_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
    if crc32fast::hash(payload) != expected {
        #[cfg(feature = "logging")]
        log::warn!("checksum mismatch in entry under '{key}'");
        return Err(StoreError::Corrupted {
            key: key.to_string(),
        });
    }
    Ok(payload.to_vec())
}

fn is_expired(deadline: Option<u64>, now: u64) -> bool {
    deadline.is_some_and(|d| now >= d)
}

/// Length of the list at `key`, read from its last sequence number.
///
/// Sequences are contiguous from 0: elements are only ever removed together
/// with their whole key.
fn list_len(
    lists: &impl ReadableTable<(&'static str, u64), &'static [u8]>,
    key: &str,
) -> Result<u64, redb::Error> {
    match lists.range((key, 0u64)..=(key, u64::MAX))?.next_back() {
        Some(item) => Ok(item?.0.value().1 + 1),
        None => Ok(0),
    }
}

/// Removes every trace of `key` inside an open write transaction.
fn remove_key(txn: &WriteTransaction, key: &str) -> Result<bool, redb::Error> {
    let mut lists = txn.open_table(LISTS)?;
    let mut sequences = Vec::new();
    for item in lists.range((key, 0u64)..=(key, u64::MAX))? {
        let (k, _) = item?;
        sequences.push(k.value().1);
    }
    for seq in &sequences {
        lists.remove((key, *seq))?;
    }

    let mut values = txn.open_table(VALUES)?;
    let had_value = values.remove(key)?.is_some();

    let mut expiry = txn.open_table(EXPIRY)?;
    expiry.remove(key)?;

    Ok(!sequences.is_empty() || had_value)
}

/// Drops `key` if it has expired. Returns `true` if it was dropped.
fn drop_if_expired(txn: &WriteTransaction, key: &str, now: u64) -> Result<bool, redb::Error> {
    let deadline = {
        let expiry = txn.open_table(EXPIRY)?;
        expiry.get(key)?.map(|d| d.value())
    };
    if is_expired(deadline, now) {
        remove_key(txn, key)?;
        return Ok(true);
    }
    Ok(false)
}

impl KvBackend for FileBackend {
    fn push(&self, key: &str, value: &[u8]) -> Result<u64, StoreError> {
        self.append(key, value, None)
    }

    fn push_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<u64, StoreError> {
        self.append(key, value, Some(ttl))
    }

    fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;

        let expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
        let deadline = expiry.get(key).map_err(redb::Error::from)?.map(|d| d.value());
        if is_expired(deadline, now_ms()) {
            return Ok(Vec::new());
        }

        let values = txn.open_table(VALUES).map_err(redb::Error::from)?;
        if values.get(key).map_err(redb::Error::from)?.is_some() {
            return Err(StoreError::WrongType {
                key: key.to_string(),
            });
        }

        let lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
        let mut items = Vec::new();
        for item in lists
            .range((key, 0u64)..=(key, u64::MAX))
            .map_err(redb::Error::from)?
        {
            let (_, v) = item.map_err(redb::Error::from)?;
            items.push(unframe(key, v.value())?);
        }
        Ok(items)
    }

    fn len(&self, key: &str) -> Result<u64, StoreError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;

        let expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
        let deadline = expiry.get(key).map_err(redb::Error::from)?.map(|d| d.value());
        if is_expired(deadline, now_ms()) {
            return Ok(0);
        }

        let lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
        Ok(list_len(&lists, key)?)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let txn = self.begin_write()?;
        let removed = if drop_if_expired(&txn, key, now_ms())? {
            false
        } else {
            remove_key(&txn, key)?
        };
        Self::commit(txn)?;
        Ok(removed)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let txn = self.begin_write()?;
        {
            if !drop_if_expired(&txn, key, now_ms())? {
                let exists = {
                    let values = txn.open_table(VALUES).map_err(redb::Error::from)?;
                    let lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
                    values.get(key).map_err(redb::Error::from)?.is_some()
                        || lists
                            .range((key, 0u64)..=(key, u64::MAX))
                            .map_err(redb::Error::from)?
                            .next()
                            .is_some()
                };
                if exists {
                    let mut expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
                    expiry
                        .insert(key, deadline_ms(ttl))
                        .map_err(redb::Error::from)?;
                }
            }
        }
        Self::commit(txn)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let txn = self.begin_write()?;
        {
            drop_if_expired(&txn, key, now_ms())?;

            let lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
            let is_list = lists
                .range((key, 0u64)..=(key, u64::MAX))
                .map_err(redb::Error::from)?
                .next()
                .is_some();
            drop(lists);
            if is_list {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                });
            }

            let mut values = txn.open_table(VALUES).map_err(redb::Error::from)?;
            values
                .insert(key, frame(value).as_slice())
                .map_err(redb::Error::from)?;
            let mut expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
            expiry.remove(key).map_err(redb::Error::from)?;
        }
        Self::commit(txn)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;

        let expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
        let deadline = expiry.get(key).map_err(redb::Error::from)?.map(|d| d.value());
        if is_expired(deadline, now_ms()) {
            return Ok(None);
        }

        let values = txn.open_table(VALUES).map_err(redb::Error::from)?;
        if let Some(v) = values.get(key).map_err(redb::Error::from)? {
            return Ok(Some(unframe(key, v.value())?));
        }

        let lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
        if lists
            .range((key, 0u64)..=(key, u64::MAX))
            .map_err(redb::Error::from)?
            .next()
            .is_some()
        {
            return Err(StoreError::WrongType {
                key: key.to_string(),
            });
        }
        Ok(None)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let now = now_ms();
        let expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
        let mut keys: Vec<String> = Vec::new();

        let lists = txn.open_table(LISTS).map_err(redb::Error::from)?;
        for item in lists.range((prefix, 0u64)..).map_err(redb::Error::from)? {
            let (k, _) = item.map_err(redb::Error::from)?;
            let (name, _) = k.value();
            if !name.starts_with(prefix) {
                break;
            }
            if keys.last().is_none_or(|last| last != name) {
                keys.push(name.to_string());
            }
        }

        let values = txn.open_table(VALUES).map_err(redb::Error::from)?;
        for item in values.range(prefix..).map_err(redb::Error::from)? {
            let (k, _) = item.map_err(redb::Error::from)?;
            let name = k.value();
            if !name.starts_with(prefix) {
                break;
            }
            keys.push(name.to_string());
        }

        let mut live = Vec::with_capacity(keys.len());
        for key in keys {
            let deadline = expiry
                .get(key.as_str())
                .map_err(redb::Error::from)?
                .map(|d| d.value());
            if !is_expired(deadline, now) {
                live.push(key);
            }
        }
        live.sort();
        live.dedup();
        Ok(live)
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let txn = self.begin_write()?;
        let now = now_ms();
        let purged = {
            let expired: Vec<String> = {
                let expiry = txn.open_table(EXPIRY).map_err(redb::Error::from)?;
                let mut expired = Vec::new();
                for item in expiry.iter().map_err(redb::Error::from)? {
                    let (k, d) = item.map_err(redb::Error::from)?;
                    if now >= d.value() {
                        expired.push(k.value().to_string());
                    }
                }
                expired
            };
            for key in &expired {
                remove_key(&txn, key)?;
            }
            expired.len()
        };
        Self::commit(txn)?;

        #[cfg(feature = "logging")]
        if purged > 0 {
            log::info!("purged {purged} expired keys");
        }
        Ok(purged)
    }
}
