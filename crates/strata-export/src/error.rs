use std::fmt;

use strata::StoreError;

/// Reasons a training sample is rejected before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A flattened feature holds something other than an integer or a float.
    NonNumericFeature {
        /// Feature name after flattening.
        name: String,
        /// JSON kind that was found instead (`"string"`, `"bool"`, ...).
        kind: &'static str,
    },
    /// Two nested groups produced the same feature name.
    DuplicateFeature(String),
    /// Confidence outside `[0, 1]`.
    ConfidenceOutOfRange(f64),
    /// The classification label is empty.
    EmptyLabel,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NonNumericFeature { name, kind } => {
                write!(f, "feature '{name}' is a {kind}, expected a number")
            }
            ValidationError::DuplicateFeature(name) => {
                write!(f, "feature '{name}' appears more than once")
            }
            ValidationError::ConfidenceOutOfRange(value) => {
                write!(f, "confidence {value} is outside [0, 1]")
            }
            ValidationError::EmptyLabel => write!(f, "label is empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors returned by the export adapters.
#[derive(Debug)]
pub enum ExportError {
    /// The sample was rejected; nothing was stored.
    Validation(ValidationError),
    /// The series store failed.
    Store(StoreError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Validation(e) => write!(f, "validation error: {e}"),
            ExportError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Validation(e) => Some(e),
            ExportError::Store(e) => Some(e),
        }
    }
}

impl From<ValidationError> for ExportError {
    fn from(err: ValidationError) -> Self {
        ExportError::Validation(err)
    }
}

impl From<StoreError> for ExportError {
    fn from(err: StoreError) -> Self {
        ExportError::Store(err)
    }
}
