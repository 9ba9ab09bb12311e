//! Error types for the relevance/redundancy pipeline.
//!
//! Every variant is fatal for the unit of work that raised it. Degenerate
//! (empty) slices never surface here: the sampler resamples them locally.

use thiserror::Error;

/// Result type used throughout the pipeline modules
pub type Result<T> = std::result::Result<T, HicsError>;

/// Errors raised by the dataset cache, profiler, sampler, engine and storage.
#[derive(Debug, Error)]
pub enum HicsError {
    /// The durable dataset file is missing, unreadable or not numeric.
    #[error("dataset '{dataset_id}' is unavailable: {reason}")]
    DatasetUnavailable { dataset_id: String, reason: String },

    /// The caller asked for an empty subset where one is required, or mixed
    /// mutually exclusive engine modes.
    #[error("invalid subset request: {0}")]
    InvalidSubsetRequest(String),

    /// A relevancy or redundancy evaluated to NaN or an infinite value.
    #[error("numeric instability: {what} evaluated to {value}")]
    NumericInstability { what: String, value: f64 },

    /// More than one stored record exists for a key that must be unique.
    #[error("found {count} {kind} records for {key} in result set {result_set}")]
    ConcurrentDuplicateResult {
        kind: &'static str,
        key: String,
        result_set: u64,
        count: usize,
    },

    #[error("column '{0}' not found in dataset")]
    ColumnNotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("calculation {0} not found")]
    CalculationNotFound(u64),

    #[error("result set {0} not found")]
    ResultSetNotFound(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HicsError {
    pub(crate) fn unavailable(dataset_id: impl Into<String>, reason: impl Into<String>) -> Self {
        HicsError::DatasetUnavailable {
            dataset_id: dataset_id.into(),
            reason: reason.into(),
        }
    }

    /// Reject a value that is NaN or infinite instead of persisting it.
    pub(crate) fn check_finite(what: impl FnOnce() -> String, value: f64) -> Result<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(HicsError::NumericInstability {
                what: what(),
                value,
            })
        }
    }
}
