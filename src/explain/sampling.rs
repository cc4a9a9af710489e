//! Model-agnostic Shapley estimates by permutation sampling.
//!
//! For each permutation a background row is walked toward the instance one
//! feature at a time; the change in suspicious probability at each step is
//! that feature's marginal contribution. All coalitions for one record go
//! to the classifier as a single batch.

use crate::error::{PipelineError, Result};
use crate::explain::backend::{AttributionBackend, RawAttribution, RawBaseValue, RawExplanation};
use crate::models::Classifier;
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::debug;

/// Sampling explainer over any [`Classifier`]
pub struct SamplingExplainer {
    classifier: Arc<dyn Classifier>,
    /// Permutations per record
    samples: usize,
    /// Background rows used for expectations
    background_rows: usize,
    seed: u64,
}

impl SamplingExplainer {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            samples: 64,
            background_rows: 50,
            seed: 42,
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_background_rows(mut self, rows: usize) -> Self {
        self.background_rows = rows.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn probabilities(&self, features: ArrayView2<'_, f32>) -> Result<Vec<f64>> {
        let output = self.classifier.classify(features)?;
        if output.probabilities.len() != features.nrows() {
            return Err(PipelineError::model(format!(
                "{} returned {} probabilities for {} rows",
                self.classifier.name(),
                output.probabilities.len(),
                features.nrows()
            )));
        }
        Ok(output.probabilities)
    }

    fn explain_instance(
        &self,
        instance: ArrayView1<'_, f32>,
        background: ArrayView2<'_, f32>,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        let n_features = instance.len();
        let steps = n_features + 1;
        let mut coalitions = Vec::with_capacity(self.samples * steps * n_features);
        let mut orders = Vec::with_capacity(self.samples);

        for _ in 0..self.samples {
            let mut order: Vec<usize> = (0..n_features).collect();
            order.shuffle(rng);

            let start = rng.gen_range(0..background.nrows());
            let mut current = background.row(start).to_vec();
            coalitions.extend_from_slice(&current);
            for &feature in &order {
                current[feature] = instance[feature];
                coalitions.extend_from_slice(&current);
            }
            orders.push(order);
        }

        let matrix = Array2::from_shape_vec((self.samples * steps, n_features), coalitions)
            .map_err(|e| PipelineError::model(format!("coalition matrix: {}", e)))?;
        let probs = self.probabilities(matrix.view())?;

        let mut contributions = vec![0.0; n_features];
        for (sample, order) in orders.iter().enumerate() {
            let walk = &probs[sample * steps..(sample + 1) * steps];
            for (step, &feature) in order.iter().enumerate() {
                contributions[feature] += walk[step + 1] - walk[step];
            }
        }
        for c in &mut contributions {
            *c /= self.samples as f64;
        }

        Ok(contributions)
    }
}

impl AttributionBackend for SamplingExplainer {
    fn name(&self) -> &str {
        "sampling"
    }

    fn attribute(
        &self,
        instances: ArrayView2<'_, f32>,
        background: ArrayView2<'_, f32>,
    ) -> Result<RawExplanation> {
        if background.nrows() == 0 {
            return Err(PipelineError::model("sampling explainer needs background rows"));
        }
        if background.ncols() != instances.ncols() {
            return Err(PipelineError::shape_mismatch(
                format!("background with {} features", instances.ncols()),
                format!("{} features", background.ncols()),
            ));
        }

        let background = background.slice(s![..self.background_rows.min(background.nrows()), ..]);
        // A single distinct reference point makes every marginal contribution zero
        let first = background.row(0);
        if background.rows().into_iter().all(|row| row == first) {
            return Err(PipelineError::model(
                "sampling explainer needs at least 2 distinct background rows",
            ));
        }
        let base_probs = self.probabilities(background)?;
        let base_value = base_probs.iter().sum::<f64>() / base_probs.len() as f64;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut values = Vec::with_capacity(instances.len());
        for instance in instances.rows() {
            values.extend(self.explain_instance(instance, background, &mut rng)?);
        }

        let matrix = Array2::from_shape_vec((instances.nrows(), instances.ncols()), values)
            .map_err(|e| PipelineError::model(format!("attribution matrix: {}", e)))?;

        debug!(
            rows = instances.nrows(),
            background = background.nrows(),
            samples = self.samples,
            base_value,
            "Sampling attributions computed"
        );

        Ok(RawExplanation {
            values: RawAttribution::Matrix(matrix),
            base: RawBaseValue::Scalar(base_value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassifierOutput;
    use ndarray::array;

    /// p = clamp(0.1 * x0 + 0.2 * x1), additive so Shapley values are exact
    struct LinearClassifier;

    impl Classifier for LinearClassifier {
        fn name(&self) -> &str {
            "linear"
        }

        fn classify(&self, features: ArrayView2<'_, f32>) -> Result<ClassifierOutput> {
            Ok(ClassifierOutput {
                probabilities: features
                    .rows()
                    .into_iter()
                    .map(|r| (0.1 * r[0] as f64 + 0.2 * r[1] as f64).clamp(0.0, 1.0))
                    .collect(),
                labels: None,
            })
        }
    }

    #[test]
    fn test_additive_model_exact() {
        let explainer = SamplingExplainer::new(Arc::new(LinearClassifier)).with_samples(8);
        // x0 is constant across the background, so its attribution is exact
        let background = array![[0.0f32, 0.0], [0.0, 1.0]];
        let instances = array![[1.0f32, 2.0], [2.0, 1.0]];

        let raw = explainer.attribute(instances.view(), background.view()).unwrap();
        let resolved = raw.resolve(1, 2, 2).unwrap();

        assert!((resolved.base_value - 0.1).abs() < 1e-6);
        assert!((resolved.matrix[[0, 0]] - 0.1).abs() < 1e-6);
        assert!((resolved.matrix[[1, 0]] - 0.2).abs() < 1e-6);
        assert!(resolved.matrix[[0, 1]] >= 0.2 - 1e-6 && resolved.matrix[[0, 1]] <= 0.4 + 1e-6);
        assert!(resolved.matrix[[1, 1]] >= -1e-6 && resolved.matrix[[1, 1]] <= 0.2 + 1e-6);
    }

    #[test]
    fn test_degenerate_background_rejected() {
        let explainer = SamplingExplainer::new(Arc::new(LinearClassifier));
        let instance = array![[2.0f32, 1.0]];

        let single = array![[2.0f32, 1.0]];
        let err = explainer.attribute(instance.view(), single.view()).unwrap_err();
        assert!(err.to_string().contains("2 distinct background rows"));

        let identical = array![[0.5f32, 0.5], [0.5, 0.5], [0.5, 0.5]];
        assert!(explainer.attribute(instance.view(), identical.view()).is_err());
    }

    #[test]
    fn test_contributions_sum_to_output_minus_base() {
        let explainer = SamplingExplainer::new(Arc::new(LinearClassifier)).with_samples(200);
        let background = array![[0.0f32, 0.0], [1.0, 1.0], [0.5, 0.5]];
        let instance = array![[2.0f32, 1.5]];

        let resolved = explainer
            .attribute(instance.view(), background.view())
            .unwrap()
            .resolve(1, 1, 2)
            .unwrap();

        // base = mean(0.0, 0.3, 0.15) = 0.15, output = 0.5
        let total: f64 = resolved.matrix.row(0).sum();
        assert!((resolved.base_value - 0.15).abs() < 1e-6);
        assert!((resolved.base_value + total - 0.5).abs() < 0.1);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let explainer = SamplingExplainer::new(Arc::new(LinearClassifier)).with_seed(7);
        let background = array![[0.0f32, 0.0], [1.0, 3.0]];
        let instance = array![[2.0f32, 1.0]];

        let a = explainer.attribute(instance.view(), background.view()).unwrap();
        let b = explainer.attribute(instance.view(), background.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_background_rejected() {
        let explainer = SamplingExplainer::new(Arc::new(LinearClassifier));
        let background = Array2::<f32>::zeros((0, 2));
        let instance = array![[2.0f32, 1.0]];
        assert!(explainer.attribute(instance.view(), background.view()).is_err());
    }
}
