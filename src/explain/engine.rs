//! Attribution engine: batch and per-record explanations

use crate::error::{AttributionRenderError, PipelineError, Result};
use crate::explain::backend::AttributionBackend;
use crate::schema::FeatureSchema;
use crate::types::{AlignedBatch, AttributionResult};
use ndarray::ArrayView2;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Outcome of one per-record explanation
pub type RecordExplanation = std::result::Result<AttributionResult, AttributionRenderError>;

/// Runs a backend and hands back only schema-aligned attributions.
///
/// Backend panics are caught and reported like any other backend failure.
pub struct AttributionEngine<'a> {
    backend: &'a dyn AttributionBackend,
    schema: &'a FeatureSchema,
    class_index: usize,
    /// Reference rows; the batch itself is used when unset
    background: Option<&'a AlignedBatch>,
}

impl<'a> AttributionEngine<'a> {
    pub fn new(
        backend: &'a dyn AttributionBackend,
        schema: &'a FeatureSchema,
        class_index: usize,
    ) -> Self {
        Self {
            backend,
            schema,
            class_index,
            background: None,
        }
    }

    pub fn with_background(mut self, background: Option<&'a AlignedBatch>) -> Self {
        self.background = background;
        self
    }

    fn background_for<'b>(&'b self, batch: &'b AlignedBatch) -> ArrayView2<'b, f32> {
        self.background.unwrap_or(batch).view()
    }

    /// One attribution per row of the batch.
    pub fn explain_batch(&self, batch: &AlignedBatch) -> Result<Vec<AttributionResult>> {
        let raw = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend.attribute(batch.view(), self.background_for(batch))
        }))
        .map_err(|payload| {
            PipelineError::model(format!(
                "{} panicked: {}",
                self.backend.name(),
                panic_message(payload.as_ref())
            ))
        })??;
        let resolved = raw.resolve(self.class_index, batch.rows(), self.schema.len())?;

        Ok(resolved
            .matrix
            .outer_iter()
            .enumerate()
            .map(|(record, row)| AttributionResult {
                record,
                base_value: resolved.base_value,
                values: row.to_vec(),
            })
            .collect())
    }

    /// Explain each listed record on its own. A failure is reported for that
    /// record and the rest still run.
    pub fn explain_records(&self, batch: &AlignedBatch, records: &[usize]) -> Vec<RecordExplanation> {
        records
            .iter()
            .map(|&record| {
                self.explain_record(batch, record).map_err(|e| {
                    warn!(record, backend = %self.backend.name(), error = %e, "Record explanation failed");
                    match e {
                        PipelineError::AttributionRender(err) => err,
                        other => AttributionRenderError {
                            record,
                            reason: other.to_string(),
                        },
                    }
                })
            })
            .collect()
    }

    fn explain_record(&self, batch: &AlignedBatch, record: usize) -> Result<AttributionResult> {
        let instance = batch.record_view(record).ok_or_else(|| {
            PipelineError::model(format!("record {} outside batch of {}", record, batch.rows()))
        })?;

        let raw = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend.attribute(instance, self.background_for(batch))
        }))
        .map_err(|payload| AttributionRenderError {
            record,
            reason: format!(
                "{} panicked: {}",
                self.backend.name(),
                panic_message(payload.as_ref())
            ),
        })??;
        let resolved = raw.resolve(self.class_index, 1, self.schema.len())?;

        debug!(record, base_value = resolved.base_value, "Record explained");

        Ok(AttributionResult {
            record,
            base_value: resolved.base_value,
            values: resolved.matrix.row(0).to_vec(),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::backend::{RawAttribution, RawBaseValue, RawExplanation};
    use ndarray::{Array2, Array3, ArrayView2};

    /// Tensor backend returning `features` columns and 3 classes; fails on
    /// single-row calls whose first feature is negative.
    struct TensorBackend {
        features: usize,
    }

    impl AttributionBackend for TensorBackend {
        fn name(&self) -> &str {
            "tensor"
        }

        fn attribute(
            &self,
            instances: ArrayView2<'_, f32>,
            _background: ArrayView2<'_, f32>,
        ) -> Result<RawExplanation> {
            if instances.nrows() == 1 && instances[[0, 0]] < 0.0 {
                return Err(PipelineError::model("backend crashed"));
            }
            let tensor = Array3::from_shape_fn((instances.nrows(), self.features, 3), |(r, f, c)| {
                instances[[r, 0]] as f64 * (c as f64) + f as f64
            });
            Ok(RawExplanation {
                values: RawAttribution::Tensor(tensor),
                base: RawBaseValue::PerClass(vec![0.6, 0.3, 0.1]),
            })
        }
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["a", "b"]).unwrap()
    }

    fn batch() -> AlignedBatch {
        AlignedBatch::from_rows(&[vec![1.0, 0.0], vec![-1.0, 0.0], vec![2.0, 0.0]], 2).unwrap()
    }

    #[test]
    fn test_explain_batch_selects_class_one() {
        let backend = TensorBackend { features: 2 };
        let schema = schema();
        let engine = AttributionEngine::new(&backend, &schema, 1);

        let results = engine.explain_batch(&batch()).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].values, vec![1.0, 2.0]);
        assert_eq!(results[2].values, vec![2.0, 3.0]);
        assert_eq!(results[2].base_value, 0.3);
        assert!(results.iter().all(|r| r.values.len() == schema.len()));
    }

    #[test]
    fn test_global_shape_mismatch() {
        let backend = TensorBackend { features: 3 };
        let schema = schema();
        let engine = AttributionEngine::new(&backend, &schema, 1);

        let err = engine.explain_batch(&batch()).unwrap_err();
        assert!(matches!(err, PipelineError::AttributionShapeMismatch { .. }));
    }

    #[test]
    fn test_record_failures_are_isolated() {
        let backend = TensorBackend { features: 2 };
        let schema = schema();
        let engine = AttributionEngine::new(&backend, &schema, 1);

        let outcomes = engine.explain_records(&batch(), &[0, 1, 2, 7]);

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].as_ref().unwrap().values, vec![1.0, 2.0]);
        assert_eq!(outcomes[1].as_ref().unwrap_err().record, 1);
        assert!(outcomes[1].as_ref().unwrap_err().reason.contains("backend crashed"));
        assert_eq!(outcomes[2].as_ref().unwrap().record, 2);
        assert_eq!(outcomes[3].as_ref().unwrap_err().record, 7);
    }

    #[test]
    fn test_record_shape_mismatch_reported_per_record() {
        let backend = TensorBackend { features: 5 };
        let schema = schema();
        let engine = AttributionEngine::new(&backend, &schema, 1);

        let outcomes = engine.explain_records(&batch(), &[0, 2]);
        assert!(outcomes.iter().all(|o| o.is_err()));
        assert!(outcomes[0].as_ref().unwrap_err().reason.contains("shape mismatch"));
    }

    /// Panics on multi-row calls and on records whose first feature exceeds 1.5
    struct PanickingBackend;

    impl AttributionBackend for PanickingBackend {
        fn name(&self) -> &str {
            "panicking"
        }

        fn attribute(
            &self,
            instances: ArrayView2<'_, f32>,
            _background: ArrayView2<'_, f32>,
        ) -> Result<RawExplanation> {
            if instances.nrows() > 1 || instances[[0, 0]] > 1.5 {
                panic!("attribution buffer exhausted");
            }
            Ok(RawExplanation {
                values: RawAttribution::Matrix(Array2::from_elem((instances.nrows(), 2), 0.1)),
                base: RawBaseValue::Scalar(0.2),
            })
        }
    }

    #[test]
    fn test_backend_panic_is_contained() {
        let schema = schema();
        let engine = AttributionEngine::new(&PanickingBackend, &schema, 1);

        let err = engine.explain_batch(&batch()).unwrap_err();
        assert!(err.to_string().contains("panicking panicked"));

        let outcomes = engine.explain_records(&batch(), &[0, 1, 2]);
        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_ok());
        let failed = outcomes[2].as_ref().unwrap_err();
        assert_eq!(failed.record, 2);
        assert!(failed.reason.contains("panicked"));
    }

    /// Reports the background row count as every attribution
    struct BackgroundSizeBackend;

    impl AttributionBackend for BackgroundSizeBackend {
        fn name(&self) -> &str {
            "background_size"
        }

        fn attribute(
            &self,
            instances: ArrayView2<'_, f32>,
            background: ArrayView2<'_, f32>,
        ) -> Result<RawExplanation> {
            Ok(RawExplanation {
                values: RawAttribution::Matrix(Array2::from_elem(
                    (instances.nrows(), 2),
                    background.nrows() as f64,
                )),
                base: RawBaseValue::Scalar(0.0),
            })
        }
    }

    #[test]
    fn test_reference_background_replaces_batch() {
        let schema = schema();
        let reference = AlignedBatch::from_rows(&vec![vec![0.0, 0.0]; 5], 2).unwrap();

        let engine = AttributionEngine::new(&BackgroundSizeBackend, &schema, 1);
        assert_eq!(engine.explain_batch(&batch()).unwrap()[0].values, vec![3.0, 3.0]);

        let engine = engine.with_background(Some(&reference));
        assert_eq!(engine.explain_batch(&batch()).unwrap()[0].values, vec![5.0, 5.0]);
        let outcomes = engine.explain_records(&batch(), &[1]);
        assert_eq!(outcomes[0].as_ref().unwrap().values, vec![5.0, 5.0]);
    }

    #[test]
    fn test_matrix_backend() {
        struct MatrixBackend;
        impl AttributionBackend for MatrixBackend {
            fn name(&self) -> &str {
                "matrix"
            }
            fn attribute(
                &self,
                instances: ArrayView2<'_, f32>,
                _background: ArrayView2<'_, f32>,
            ) -> Result<RawExplanation> {
                Ok(RawExplanation {
                    values: RawAttribution::Matrix(Array2::from_elem((instances.nrows(), 2), 0.5)),
                    base: RawBaseValue::Scalar(0.1),
                })
            }
        }

        let schema = schema();
        let engine = AttributionEngine::new(&MatrixBackend, &schema, 1);
        let results = engine.explain_batch(&batch()).unwrap();
        assert!((results[0].output() - 1.1).abs() < 1e-12);
    }
}
