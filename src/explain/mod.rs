//! Feature attribution for the suspicious class

pub mod backend;
pub mod engine;
pub mod importance;
pub mod onnx;
pub mod sampling;
pub mod shape;

pub use backend::{AttributionBackend, RawAttribution, RawBaseValue, RawExplanation};
pub use engine::{AttributionEngine, RecordExplanation};
pub use importance::{FeatureImportance, ImportanceAggregator};
pub use onnx::OnnxExplainer;
pub use sampling::SamplingExplainer;
pub use shape::ResolvedAttribution;
