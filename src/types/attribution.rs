//! Resolved per-record attributions

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Attribution for one record, aligned 1:1 with the feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// 0-based row index within the batch
    pub record: usize,
    /// Expected model output before any feature is taken into account
    pub base_value: f64,
    /// One value per schema feature, in schema order
    pub values: Vec<f64>,
}

impl AttributionResult {
    /// Base value plus all contributions
    pub fn output(&self) -> f64 {
        self.base_value + self.values.iter().sum::<f64>()
    }

    /// Feature indices ordered by attribution magnitude, largest first
    pub fn ranked_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.values.len()).collect();
        indices.sort_by(|&a, &b| {
            self.values[b]
                .abs()
                .partial_cmp(&self.values[a].abs())
                .unwrap_or(Ordering::Equal)
        });
        indices
    }
}
