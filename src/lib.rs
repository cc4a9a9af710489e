//! Suspicious Account Detector Library
//!
//! Scores uploaded bank-account tables with a trained classifier, explains
//! the suspicious-class predictions with feature attributions, and renders
//! a report plus a downloadable results table.

pub mod config;
pub mod context;
pub mod error;
pub mod explain;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod table;
pub mod types;

pub use config::AppConfig;
pub use context::ModelContext;
pub use error::{AttributionRenderError, PipelineError};
pub use pipeline::{BatchOutcome, Pipeline, Stage};
pub use report::Report;
pub use schema::FeatureSchema;
pub use table::UploadTable;
pub use types::{AttributionResult, KpiSummary, PredictionLabel, PredictionResult};
