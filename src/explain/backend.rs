//! Attribution backends and the raw shapes they return

use crate::error::Result;
use ndarray::{Array2, Array3, ArrayView2};

/// Attribution values as a backend reports them
#[derive(Debug, Clone, PartialEq)]
pub enum RawAttribution {
    /// rows × features, already for the positive class
    Matrix(Array2<f64>),
    /// One rows × features matrix per class
    ClassPair(Vec<Array2<f64>>),
    /// rows × features × classes
    Tensor(Array3<f64>),
}

impl RawAttribution {
    /// Shape description for logs and errors
    pub fn describe(&self) -> String {
        match self {
            RawAttribution::Matrix(m) => format!("matrix {:?}", m.shape()),
            RawAttribution::ClassPair(ms) => format!(
                "{} class matrices {:?}",
                ms.len(),
                ms.iter().map(|m| m.shape().to_vec()).collect::<Vec<_>>()
            ),
            RawAttribution::Tensor(t) => format!("tensor {:?}", t.shape()),
        }
    }
}

/// Expected model output as a backend reports it
#[derive(Debug, Clone, PartialEq)]
pub enum RawBaseValue {
    Scalar(f64),
    PerClass(Vec<f64>),
}

/// Backend output for one call
#[derive(Debug, Clone, PartialEq)]
pub struct RawExplanation {
    pub values: RawAttribution,
    pub base: RawBaseValue,
}

/// Computes feature attributions for a trained model.
pub trait AttributionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Attributions for every row of `instances`. `background` is the batch
    /// the instances come from, for backends that estimate expectations.
    fn attribute(
        &self,
        instances: ArrayView2<'_, f32>,
        background: ArrayView2<'_, f32>,
    ) -> Result<RawExplanation>;
}
