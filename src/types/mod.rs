//! Type definitions for the scoring pipeline

pub mod account;
pub mod attribution;
pub mod prediction;

pub use account::{AccountRecord, AlignedBatch};
pub use attribution::AttributionResult;
pub use prediction::{KpiSummary, PredictionLabel, PredictionResult};
