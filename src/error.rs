//! Error taxonomy for the scoring pipeline.
//!
//! Validation errors (`SchemaMismatch`, `EmptyBatch`, `InvalidValue`) halt a batch.
//! Explainability errors (`AttributionShapeMismatch`, [`AttributionRenderError`])
//! only degrade the report.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while processing one uploaded batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema mismatch: missing columns [{}], unexpected columns [{}]", missing.join(", "), unexpected.join(", "))]
    SchemaMismatch {
        /// Required features absent from the upload, in schema order
        missing: Vec<String>,
        /// Columns that cannot be accepted (duplicated features, reserved output names)
        unexpected: Vec<String>,
    },

    #[error("batch contains no rows")]
    EmptyBatch,

    #[error("attribution shape mismatch: expected {expected}, got {actual}")]
    AttributionShapeMismatch { expected: String, actual: String },

    #[error(transparent)]
    AttributionRender(#[from] AttributionRenderError),

    #[error("invalid value {value:?} in row {row}, column {column}")]
    InvalidValue {
        /// 1-based data row (header excluded)
        row: usize,
        column: String,
        value: String,
    },

    #[error("invalid feature schema: {0}")]
    InvalidSchema(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::AttributionShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether this error halts the batch before predictions are delivered.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::AttributionShapeMismatch { .. } | Self::AttributionRender(_)
        )
    }
}

/// A single record's explanation could not be produced.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[error("could not explain record {record}: {reason}")]
pub struct AttributionRenderError {
    /// 0-based row index within the batch
    pub record: usize,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_names_columns() {
        let err = PipelineError::SchemaMismatch {
            missing: vec!["avg_txn_amount".to_string(), "txn_count_30d".to_string()],
            unexpected: vec!["prediction".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("avg_txn_amount, txn_count_30d"));
        assert!(msg.contains("prediction"));
    }

    #[test]
    fn test_fatality() {
        assert!(PipelineError::EmptyBatch.is_fatal());
        assert!(!PipelineError::shape_mismatch("8 columns", "7 columns").is_fatal());

        let render = AttributionRenderError {
            record: 2,
            reason: "backend failed".to_string(),
        };
        assert!(!PipelineError::from(render).is_fatal());
    }
}
