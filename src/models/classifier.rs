//! Classifier seam between the pipeline and the trained model

use crate::error::Result;
use ndarray::ArrayView2;

/// Raw model output for a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    /// Suspicious-class probability per row
    pub probabilities: Vec<f64>,
    /// Predicted class index per row, when the model exposes its own decision
    pub labels: Option<Vec<i64>>,
}

/// A trained binary classifier over schema-ordered features.
///
/// Implementations are loaded once and shared read-only across batches.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Score every row of `features` (rows × schema features).
    fn classify(&self, features: ArrayView2<'_, f32>) -> Result<ClassifierOutput>;
}
