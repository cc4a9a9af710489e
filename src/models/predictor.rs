//! Predictor adapter: labels and KPIs from the trained classifier

use crate::config::PredictionConfig;
use crate::error::{PipelineError, Result};
use crate::models::classifier::Classifier;
use crate::types::{AlignedBatch, KpiSummary, PredictionLabel, PredictionResult};
use tracing::debug;

/// Wraps a classifier with the configured decision rule
pub struct Predictor<'a> {
    classifier: &'a dyn Classifier,
    config: &'a PredictionConfig,
}

impl<'a> Predictor<'a> {
    pub fn new(classifier: &'a dyn Classifier, config: &'a PredictionConfig) -> Self {
        Self { classifier, config }
    }

    /// One prediction per row. The model's own labels win when it reports
    /// them; otherwise the probability threshold decides.
    pub fn predict(&self, batch: &AlignedBatch) -> Result<Vec<PredictionResult>> {
        if batch.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let output = self.classifier.classify(batch.view())?;

        if output.probabilities.len() != batch.rows() {
            return Err(PipelineError::model(format!(
                "{} returned {} probabilities for {} rows",
                self.classifier.name(),
                output.probabilities.len(),
                batch.rows()
            )));
        }

        let labels: Vec<PredictionLabel> = match &output.labels {
            Some(classes) if classes.len() == batch.rows() => classes
                .iter()
                .map(|&c| PredictionLabel::from_class(c, self.config.suspicious_class))
                .collect(),
            Some(classes) => {
                return Err(PipelineError::model(format!(
                    "{} returned {} labels for {} rows",
                    self.classifier.name(),
                    classes.len(),
                    batch.rows()
                )))
            }
            None => output
                .probabilities
                .iter()
                .map(|&p| PredictionLabel::from_probability(p, self.config.threshold))
                .collect(),
        };

        debug!(
            model = %self.classifier.name(),
            rows = batch.rows(),
            model_labels = output.labels.is_some(),
            "Predictions computed"
        );

        Ok(labels
            .into_iter()
            .zip(output.probabilities)
            .enumerate()
            .map(|(record, (label, probability))| PredictionResult {
                record,
                label,
                probability,
            })
            .collect())
    }

    /// KPI summary over a prediction set.
    pub fn summarize(&self, results: &[PredictionResult]) -> Result<KpiSummary> {
        KpiSummary::from_predictions(results)
    }
}
