use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::{KvBackend, deadline_ms, now_ms};
use crate::StoreError;

#[derive(Debug)]
enum Data {
    List(Vec<Vec<u8>>),
    Value(Vec<u8>),
}

#[derive(Debug)]
struct Entry {
    data: Data,
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at_ms.is_none_or(|deadline| now < deadline)
    }
}

/// In-process backend holding every key in a `HashMap`.
///
/// Nothing survives the process. Expired keys are skipped on read and dropped
/// on the next write to the same key or on [`KvBackend::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .read()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".to_string()))
    }

    fn append(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut entries = self.write()?;
        if entries.get(key).is_some_and(|e| !e.is_live(now_ms())) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            data: Data::List(Vec::new()),
            expires_at_ms: None,
        });
        match &mut entry.data {
            Data::List(items) => {
                items.push(value.to_vec());
                if let Some(ttl) = ttl {
                    entry.expires_at_ms = Some(deadline_ms(ttl));
                }
                Ok(items.len() as u64)
            }
            Data::Value(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }
}

fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
    entries.get(key).filter(|e| e.is_live(now_ms()))
}

impl KvBackend for MemoryBackend {
    fn push(&self, key: &str, value: &[u8]) -> Result<u64, StoreError> {
        self.append(key, value, None)
    }

    fn push_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<u64, StoreError> {
        self.append(key, value, Some(ttl))
    }

    fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let entries = self.read()?;
        match live(&entries, key).map(|e| &e.data) {
            None => Ok(Vec::new()),
            Some(Data::List(items)) => Ok(items.clone()),
            Some(Data::Value(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn len(&self, key: &str) -> Result<u64, StoreError> {
        let entries = self.read()?;
        match live(&entries, key).map(|e| &e.data) {
            None => Ok(0),
            Some(Data::List(items)) => Ok(items.len() as u64),
            Some(Data::Value(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.write()?;
        let now = now_ms();
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.write()?;
        let now = now_ms();
        if let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) {
            entry.expires_at_ms = Some(deadline_ms(ttl));
        }
        Ok(())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.write()?;
        let now = now_ms();
        if let Some(Entry {
            data: Data::List(_),
            ..
        }) = entries.get(key).filter(|e| e.is_live(now))
        {
            return Err(StoreError::WrongType {
                key: key.to_string(),
            });
        }
        entries.insert(
            key.to_string(),
            Entry {
                data: Data::Value(value.to_vec()),
                expires_at_ms: None,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.read()?;
        match live(&entries, key).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::Value(value)) => Ok(Some(value.clone())),
            Some(Data::List(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.read()?;
        let now = now_ms();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.write()?;
        let now = now_ms();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}
