//! Normalization of backend output to a rows × features matrix

use crate::error::{PipelineError, Result};
use crate::explain::backend::{RawAttribution, RawBaseValue, RawExplanation};
use ndarray::{s, Array2};
use tracing::debug;

/// Positive-class attributions, one row per record, one column per feature
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribution {
    pub matrix: Array2<f64>,
    pub base_value: f64,
}

impl RawExplanation {
    /// Resolve to the positive class and check the result against the
    /// expected number of rows and schema features.
    pub fn resolve(
        self,
        class_index: usize,
        n_rows: usize,
        n_features: usize,
    ) -> Result<ResolvedAttribution> {
        let described = self.values.describe();

        let matrix = match self.values {
            RawAttribution::Matrix(matrix) => matrix,
            RawAttribution::ClassPair(mut matrices) => {
                if class_index >= matrices.len() {
                    return Err(PipelineError::shape_mismatch(
                        format!("matrix for class {}", class_index),
                        described,
                    ));
                }
                matrices.swap_remove(class_index)
            }
            RawAttribution::Tensor(tensor) => {
                if class_index >= tensor.shape()[2] {
                    return Err(PipelineError::shape_mismatch(
                        format!("class axis containing class {}", class_index),
                        described,
                    ));
                }
                tensor.slice(s![.., .., class_index]).to_owned()
            }
        };

        if matrix.ncols() != n_features || matrix.nrows() != n_rows {
            return Err(PipelineError::shape_mismatch(
                format!("{} rows × {} features", n_rows, n_features),
                format!("{} rows × {} features (from {})", matrix.nrows(), matrix.ncols(), described),
            ));
        }

        let base_value = match self.base {
            RawBaseValue::Scalar(v) => v,
            RawBaseValue::PerClass(values) => *values.get(class_index).ok_or_else(|| {
                PipelineError::shape_mismatch(
                    format!("base value for class {}", class_index),
                    format!("{} base values", values.len()),
                )
            })?,
        };

        debug!(source = %described, class_index, "Attribution shape resolved");

        Ok(ResolvedAttribution { matrix, base_value })
    }
}
