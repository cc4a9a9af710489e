//! Batch pipeline: align, predict, explain, render

use crate::config::{AppConfig, RecordSelection};
use crate::context::ModelContext;
use crate::error::{AttributionRenderError, PipelineError, Result};
use crate::explain::{AttributionEngine, ImportanceAggregator, RecordExplanation};
use crate::metrics::BatchMetrics;
use crate::models::Predictor;
use crate::report::{GlobalImportance, LabelTexts, RecordView, Report, ResultsTable};
use crate::table::UploadTable;
use crate::types::{AlignedBatch, PredictionResult};
use chrono::Utc;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Processing state of one batch. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Uploaded,
    Aligned,
    Predicted,
    Explained,
    Rendered,
}

/// Tracks the current stage and times each transition
struct StageTracker {
    batch_id: Uuid,
    stage: Stage,
    since: Instant,
    metrics: BatchMetrics,
}

impl StageTracker {
    fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            stage: Stage::Idle,
            since: Instant::now(),
            metrics: BatchMetrics::new(),
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        let elapsed = self.since.elapsed();
        self.metrics.record_stage(next, elapsed);
        debug!(
            batch_id = %self.batch_id,
            from = ?self.stage,
            to = ?next,
            elapsed_us = elapsed.as_micros() as u64,
            "Stage transition"
        );
        self.stage = next;
        self.since = Instant::now();
    }

    fn halt(&self, err: PipelineError) -> PipelineError {
        error!(
            batch_id = %self.batch_id,
            stage = ?self.stage,
            fatal = err.is_fatal(),
            error = %err,
            "Batch halted"
        );
        err
    }
}

/// A rendered batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub report: Report,
    pub stage: Stage,
}

/// Runs uploads through the shared model context
pub struct Pipeline<'a> {
    context: &'a ModelContext,
    config: &'a AppConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(context: &'a ModelContext, config: &'a AppConfig) -> Self {
        Self { context, config }
    }

    /// Read a delimited file and process it
    pub fn process_path<P: AsRef<Path>>(&self, path: P, delimiter: u8) -> Result<BatchOutcome> {
        let path = path.as_ref();
        let upload = UploadTable::from_path(path, delimiter)?;
        self.process(upload, Some(path.display().to_string()))
    }

    /// Process one upload. Validation and prediction failures halt the
    /// batch; attribution failures only degrade the report.
    pub fn process(&self, upload: UploadTable, source: Option<String>) -> Result<BatchOutcome> {
        let mut tracker = StageTracker::new(Uuid::new_v4());
        tracker.advance(Stage::Uploaded);

        let schema = self.context.schema();
        let batch = schema.align(&upload).map_err(|e| tracker.halt(e))?;
        if batch.is_empty() {
            return Err(tracker.halt(PipelineError::EmptyBatch));
        }
        tracker.advance(Stage::Aligned);

        let predictor = Predictor::new(self.context.classifier(), &self.config.prediction);
        let predictions = predictor.predict(&batch).map_err(|e| tracker.halt(e))?;
        let kpis = predictor
            .summarize(&predictions)
            .map_err(|e| tracker.halt(e))?;
        tracker.metrics.record_probabilities(&predictions);
        tracker.advance(Stage::Predicted);

        info!(
            batch_id = %tracker.batch_id,
            total = kpis.total,
            suspicious = kpis.suspicious,
            rate = %kpis.rate_display(),
            "Batch scored"
        );

        let (global_importance, outcomes) = self.explain(&batch, &predictions);
        let accounts: Vec<_> = upload.records(&batch).collect();
        let explanations = outcomes
            .iter()
            .map(|outcome| RecordView::build(outcome, schema, &accounts, &predictions))
            .collect();
        tracker.advance(Stage::Explained);

        let mut report = Report {
            batch_id: tracker.batch_id,
            generated_at: Utc::now(),
            source,
            labels: LabelTexts::from_config(&self.config.prediction),
            kpis,
            results: ResultsTable::build(&upload, &predictions, &self.config.prediction),
            global_importance,
            explanations,
            metrics: BatchMetrics::new(),
        };
        tracker.advance(Stage::Rendered);
        tracker.metrics.log_summary();
        report.metrics = tracker.metrics;

        Ok(BatchOutcome {
            report,
            stage: tracker.stage,
        })
    }

    fn explain(
        &self,
        batch: &AlignedBatch,
        predictions: &[PredictionResult],
    ) -> (GlobalImportance, Vec<RecordExplanation>) {
        let explanation = &self.config.explanation;
        let backend = match self.context.explainer() {
            Some(backend) if explanation.enabled => backend,
            _ => return (GlobalImportance::Disabled, Vec::new()),
        };

        let schema = self.context.schema();
        let engine = AttributionEngine::new(backend, schema, self.config.prediction.suspicious_class)
            .with_background(self.context.background());
        let records = select_records(predictions, explanation.selection, explanation.top_k);

        match engine.explain_batch(batch) {
            Ok(results) => {
                let ranking = ImportanceAggregator::new(schema).rank(&results);
                let outcomes = records
                    .iter()
                    .map(|&record| {
                        results.get(record).cloned().ok_or(AttributionRenderError {
                            record,
                            reason: "record missing from batch attribution".to_string(),
                        })
                    })
                    .collect();
                (GlobalImportance::Available { ranking }, outcomes)
            }
            Err(e) => {
                warn!(backend = %backend.name(), error = %e, "Global attribution unavailable");
                (
                    GlobalImportance::Unavailable {
                        reason: e.to_string(),
                    },
                    engine.explain_records(batch, &records),
                )
            }
        }
    }
}

/// Records to explain individually, at most `k` of them
pub fn select_records(
    predictions: &[PredictionResult],
    selection: RecordSelection,
    k: usize,
) -> Vec<usize> {
    match selection {
        RecordSelection::First => (0..predictions.len().min(k)).collect(),
        RecordSelection::MostSuspicious => {
            let mut order: Vec<usize> = (0..predictions.len()).collect();
            order.sort_by(|&a, &b| {
                predictions[b]
                    .probability
                    .partial_cmp(&predictions[a].probability)
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            });
            order.truncate(k);
            order
        }
    }
}
