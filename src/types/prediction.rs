//! Prediction labels, per-record results, and batch KPIs

use crate::config::PredictionConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Download column holding the binary label
pub const PREDICTION_COLUMN: &str = "prediction";
/// Download column holding the human-readable label
pub const LABEL_COLUMN: &str = "prediction_label";

/// Binary account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionLabel {
    Normal,
    Suspicious,
}

impl PredictionLabel {
    /// Label from a suspicious-class probability. Ties go to `Normal`,
    /// matching argmax over two classes.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability > threshold {
            PredictionLabel::Suspicious
        } else {
            PredictionLabel::Normal
        }
    }

    /// Label from the class index the model predicted.
    pub fn from_class(class: i64, suspicious_class: usize) -> Self {
        if usize::try_from(class).is_ok_and(|c| c == suspicious_class) {
            PredictionLabel::Suspicious
        } else {
            PredictionLabel::Normal
        }
    }

    /// Value written to the `prediction` column
    pub fn flag(self) -> u8 {
        match self {
            PredictionLabel::Normal => 0,
            PredictionLabel::Suspicious => 1,
        }
    }

    /// Value written to the `prediction_label` column
    pub fn text(self, config: &PredictionConfig) -> &str {
        match self {
            PredictionLabel::Normal => &config.normal_label,
            PredictionLabel::Suspicious => &config.suspicious_label,
        }
    }
}

/// Prediction attached to one account record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 0-based row index within the batch
    pub record: usize,
    pub label: PredictionLabel,
    /// Suspicious-class probability
    pub probability: f64,
}

/// Aggregate counts over one batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total: usize,
    pub suspicious: usize,
    pub normal: usize,
    /// Suspicious share in percent, 0.0 - 100.0
    pub rate: f64,
}

impl KpiSummary {
    /// Summarize a batch of labels. An empty batch has no rate.
    pub fn from_labels(labels: impl IntoIterator<Item = PredictionLabel>) -> Result<Self> {
        let (total, suspicious) = labels.into_iter().fold((0, 0), |(total, suspicious), label| {
            (total + 1, suspicious + usize::from(label == PredictionLabel::Suspicious))
        });

        if total == 0 {
            return Err(PipelineError::EmptyBatch);
        }

        Ok(Self {
            total,
            suspicious,
            normal: total - suspicious,
            rate: 100.0 * suspicious as f64 / total as f64,
        })
    }

    pub fn from_predictions(results: &[PredictionResult]) -> Result<Self> {
        Self::from_labels(results.iter().map(|r| r.label))
    }

    /// Rate formatted for display, e.g. `40.00%`
    pub fn rate_display(&self) -> String {
        format!("{:.2}%", self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(flags: &[u8]) -> Vec<PredictionLabel> {
        flags
            .iter()
            .map(|&f| {
                if f == 1 {
                    PredictionLabel::Suspicious
                } else {
                    PredictionLabel::Normal
                }
            })
            .collect()
    }

    #[test]
    fn test_label_from_probability() {
        assert_eq!(PredictionLabel::from_probability(0.8, 0.5), PredictionLabel::Suspicious);
        assert_eq!(PredictionLabel::from_probability(0.5, 0.5), PredictionLabel::Normal);
        assert_eq!(PredictionLabel::from_probability(0.1, 0.5), PredictionLabel::Normal);
    }

    #[test]
    fn test_label_from_class() {
        assert_eq!(PredictionLabel::from_class(1, 1), PredictionLabel::Suspicious);
        assert_eq!(PredictionLabel::from_class(0, 1), PredictionLabel::Normal);
        assert_eq!(PredictionLabel::from_class(0, 0), PredictionLabel::Suspicious);
        assert_eq!(PredictionLabel::from_class(-1, 1), PredictionLabel::Normal);
    }

    #[test]
    fn test_label_text() {
        let config = PredictionConfig::default();
        assert_eq!(PredictionLabel::Suspicious.text(&config), "Suspicious");
        assert_eq!(PredictionLabel::Normal.text(&config), "Normal");
        assert_eq!(PredictionLabel::Suspicious.flag(), 1);
    }

    #[test]
    fn test_kpis_five_rows() {
        let kpis = KpiSummary::from_labels(labels(&[0, 1, 0, 1, 0])).unwrap();
        assert_eq!(kpis.total, 5);
        assert_eq!(kpis.suspicious, 2);
        assert_eq!(kpis.normal, 3);
        assert_eq!(kpis.rate_display(), "40.00%");
    }

    #[test]
    fn test_kpis_empty_batch() {
        let err = KpiSummary::from_labels(Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));
    }

    #[test]
    fn test_kpis_invariants() {
        for flags in [vec![1], vec![0], vec![1, 1, 1], vec![0, 1, 1, 0, 0, 0, 1]] {
            let kpis = KpiSummary::from_labels(labels(&flags)).unwrap();
            assert_eq!(kpis.suspicious + kpis.normal, kpis.total);
            assert!((0.0..=100.0).contains(&kpis.rate));
        }
    }
}
