//! Per-batch metrics: stage timings and the probability distribution

use crate::pipeline::Stage;
use crate::types::PredictionResult;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Number of probability histogram buckets
pub const PROBABILITY_BUCKETS: usize = 10;

/// Time spent reaching a stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_us: u64,
}

/// Metrics for one batch; discarded with it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub stages: Vec<StageTiming>,
    /// Suspicious-probability histogram, bucket i covers [i/10, (i+1)/10)
    pub probability_buckets: [u64; PROBABILITY_BUCKETS],
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the time taken to reach a stage
    pub fn record_stage(&mut self, stage: Stage, elapsed: Duration) {
        self.stages.push(StageTiming {
            stage,
            elapsed_us: elapsed.as_micros() as u64,
        });
    }

    /// Bucket every prediction's probability.
    ///
    /// Model probabilities are f32; bucketing at that precision keeps 0.9
    /// in the 0.9 bucket after widening.
    pub fn record_probabilities(&mut self, results: &[PredictionResult]) {
        for result in results {
            let p = (result.probability as f32).clamp(0.0, 1.0);
            let bucket = (p * PROBABILITY_BUCKETS as f32).min((PROBABILITY_BUCKETS - 1) as f32) as usize;
            self.probability_buckets[bucket] += 1;
        }
    }

    /// Total time across recorded stages
    pub fn total_us(&self) -> u64 {
        self.stages.iter().map(|s| s.elapsed_us).sum()
    }

    pub fn stage_us(&self, stage: Stage) -> Option<u64> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.elapsed_us)
    }

    /// Log a one-line summary
    pub fn log_summary(&self) {
        info!(
            total_us = self.total_us(),
            aligned_us = self.stage_us(Stage::Aligned),
            predicted_us = self.stage_us(Stage::Predicted),
            explained_us = self.stage_us(Stage::Explained),
            buckets = ?self.probability_buckets,
            "Batch timings"
        );
    }
}
