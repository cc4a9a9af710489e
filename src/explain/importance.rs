//! Global feature importance from per-record attributions

use crate::schema::FeatureSchema;
use crate::types::AttributionResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One feature's aggregate attribution over a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Mean absolute attribution
    pub mean_abs: f64,
    /// Mean signed attribution; positive pushes toward suspicious
    pub mean: f64,
}

/// Aggregates attribution magnitudes across a batch into a ranking.
pub struct ImportanceAggregator<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> ImportanceAggregator<'a> {
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    /// Features ranked by mean absolute attribution, largest first.
    ///
    /// Results shorter than the schema are skipped; the engine never
    /// produces them.
    pub fn rank(&self, results: &[AttributionResult]) -> Vec<FeatureImportance> {
        let n = self.schema.len();
        let mut abs_sum = vec![0.0; n];
        let mut sum = vec![0.0; n];
        let mut count = 0usize;

        for result in results.iter().filter(|r| r.values.len() == n) {
            for (i, &v) in result.values.iter().enumerate() {
                abs_sum[i] += v.abs();
                sum[i] += v;
            }
            count += 1;
        }

        if count == 0 {
            return Vec::new();
        }

        let mut ranking: Vec<FeatureImportance> = self
            .schema
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| FeatureImportance {
                feature: name.clone(),
                mean_abs: abs_sum[i] / count as f64,
                mean: sum[i] / count as f64,
            })
            .collect();

        ranking.sort_by(|a, b| {
            b.mean_abs
                .partial_cmp(&a.mean_abs)
                .unwrap_or(Ordering::Equal)
        });
        ranking
    }
}
