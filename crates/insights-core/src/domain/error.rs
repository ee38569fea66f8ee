//! Domain-level error taxonomy for Comment Insights.

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::report::ReportError;

/// Errors produced by value-object factories.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("{field} must not be empty")]
    EmptyLabel { field: &'static str },
}

impl ValidationError {
    /// Check that `value` is finite and inside `[0, 1]`.
    pub fn check_unit(
        field: &'static str,
        value: f64,
    ) -> std::result::Result<f64, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite { field });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::OutOfRange {
                field,
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(value)
    }

    /// Trimmed label, rejected when blank.
    pub fn check_label<'a>(
        field: &'static str,
        label: &'a str,
    ) -> std::result::Result<&'a str, ValidationError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ValidationError::EmptyLabel { field });
        }
        Ok(label)
    }
}

/// Comment Insights errors.
#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
    #[error("no comments to analyze")]
    EmptyInput,

    #[error("all {batches} batches failed; last error: {last_error}")]
    AllBatchesFailed { batches: usize, last_error: String },

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("AI client error: {0}")]
    Client(#[from] ClientError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Comment Insights operations.
pub type Result<T> = std::result::Result<T, InsightsError>;
