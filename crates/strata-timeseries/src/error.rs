use std::fmt;

use strata::{Granularity, StoreError};

/// Errors returned by rollups and sweeps.
#[derive(Debug)]
pub enum TimeSeriesError {
    /// The series store failed.
    Store(StoreError),
    /// There is no coarser granularity to roll this one up into.
    NoCoarserGranularity(Granularity),
}

impl fmt::Display for TimeSeriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSeriesError::Store(e) => write!(f, "store error: {e}"),
            TimeSeriesError::NoCoarserGranularity(g) => {
                write!(f, "'{g}' is the coarsest granularity and cannot be rolled up")
            }
        }
    }
}

impl std::error::Error for TimeSeriesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeSeriesError::Store(e) => Some(e),
            TimeSeriesError::NoCoarserGranularity(_) => None,
        }
    }
}

impl From<StoreError> for TimeSeriesError {
    fn from(err: StoreError) -> Self {
        TimeSeriesError::Store(err)
    }
}
