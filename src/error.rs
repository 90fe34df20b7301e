use std::fmt;

/// Errors returned by the series store and its backends.
#[derive(Debug)]
pub enum StoreError {
    /// The backend could not be reached or failed mid-operation.
    ///
    /// This is the only retryable failure. The store never retries on its own.
    Unavailable(String),
    /// A stored entry failed its checksum.
    Corrupted {
        /// Key holding the corrupted entry.
        key: String,
    },
    /// A list operation was issued against a value key, or the other way round.
    WrongType {
        /// Key that holds the other kind of entry.
        key: String,
    },
    /// A record could not be encoded or decoded.
    Serialization(serde_json::Error),
    /// A record was rejected before it reached the backend.
    InvalidRecord(String),
    /// A metric name or key string is not addressable.
    InvalidKey(String),
}

impl StoreError {
    /// Returns `true` if the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "backend unavailable: {msg}"),
            StoreError::Corrupted { key } => write!(f, "checksum mismatch in entry under '{key}'"),
            StoreError::WrongType { key } => {
                write!(f, "operation against a key holding the wrong kind of entry: '{key}'")
            }
            StoreError::Serialization(e) => write!(f, "record serialization error: {e}"),
            StoreError::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            StoreError::InvalidKey(msg) => write!(f, "invalid key: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
