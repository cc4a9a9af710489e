//! Report rendering: results table, KPIs, importance ranking and
//! per-record explanations, plus the download serialization.

use crate::config::PredictionConfig;
use crate::error::Result;
use crate::explain::{FeatureImportance, RecordExplanation};
use crate::metrics::{BatchMetrics, PROBABILITY_BUCKETS};
use crate::schema::FeatureSchema;
use crate::table::UploadTable;
use crate::types::prediction::{LABEL_COLUMN, PREDICTION_COLUMN};
use crate::types::{AccountRecord, KpiSummary, PredictionLabel, PredictionResult};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

const BAR_WIDTH: usize = 30;
const CELL_WIDTH: usize = 14;

/// Upload columns with the prediction columns appended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultsTable {
    pub fn build(
        table: &UploadTable,
        predictions: &[PredictionResult],
        config: &PredictionConfig,
    ) -> Self {
        let columns = table
            .headers()
            .iter()
            .map(str::to_string)
            .chain([PREDICTION_COLUMN.to_string(), LABEL_COLUMN.to_string()])
            .collect();

        let rows = table
            .rows()
            .iter()
            .zip(predictions)
            .map(|(fields, prediction)| {
                fields
                    .iter()
                    .map(str::to_string)
                    .chain([
                        prediction.label.flag().to_string(),
                        prediction.label.text(config).to_string(),
                    ])
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Delimited text with a header row and no index column
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self, delimiter: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, delimiter)?;
        Ok(buf)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, delimiter: u8) -> Result<()> {
        self.write_csv(File::create(path)?, delimiter)
    }
}

/// Global attribution view state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GlobalImportance {
    Available { ranking: Vec<FeatureImportance> },
    Unavailable { reason: String },
    Disabled,
}

/// One feature's line in a record explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f32,
    pub attribution: f64,
}

/// Rendered per-record explanation, or the reason it is missing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordView {
    Explained {
        record: usize,
        label: PredictionLabel,
        probability: f64,
        base_value: f64,
        output: f64,
        /// Sorted by attribution magnitude, largest first
        contributions: Vec<FeatureContribution>,
    },
    Failed {
        record: usize,
        reason: String,
    },
}

impl RecordView {
    pub fn build(
        outcome: &RecordExplanation,
        schema: &FeatureSchema,
        accounts: &[AccountRecord<'_>],
        predictions: &[PredictionResult],
    ) -> Self {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                return RecordView::Failed {
                    record: err.record,
                    reason: err.reason.clone(),
                }
            }
        };

        let (Some(account), Some(prediction)) =
            (accounts.get(result.record), predictions.get(result.record))
        else {
            return RecordView::Failed {
                record: result.record,
                reason: "record outside batch".to_string(),
            };
        };

        let contributions = result
            .ranked_indices()
            .into_iter()
            .filter_map(|i| {
                Some(FeatureContribution {
                    feature: schema.name(i)?.to_string(),
                    value: *account.features.get(i)?,
                    attribution: *result.values.get(i)?,
                })
            })
            .collect();

        RecordView::Explained {
            record: result.record,
            label: prediction.label,
            probability: prediction.probability,
            base_value: result.base_value,
            output: result.output(),
            contributions,
        }
    }
}

/// Label texts the report shows for each class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelTexts {
    pub suspicious: String,
    pub normal: String,
}

impl LabelTexts {
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            suspicious: config.suspicious_label.clone(),
            normal: config.normal_label.clone(),
        }
    }

    pub fn text(&self, label: PredictionLabel) -> &str {
        match label {
            PredictionLabel::Suspicious => &self.suspicious,
            PredictionLabel::Normal => &self.normal,
        }
    }
}

/// Everything rendered for one batch
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: Option<String>,
    pub labels: LabelTexts,
    pub kpis: KpiSummary,
    pub results: ResultsTable,
    pub global_importance: GlobalImportance,
    pub explanations: Vec<RecordView>,
    pub metrics: BatchMetrics,
}

impl Report {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Terminal rendering, showing at most `preview_rows` result rows
    pub fn render_text(&self, preview_rows: usize) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_text(&mut out, preview_rows);
        out
    }

    fn write_text(&self, out: &mut String, preview_rows: usize) -> fmt::Result {
        let k = &self.kpis;
        writeln!(out, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(out, "║            SUSPICIOUS ACCOUNT DETECTION - BATCH REPORT       ║")?;
        writeln!(out, "╠══════════════════════════════════════════════════════════════╣")?;
        if let Some(source) = &self.source {
            writeln!(out, "║ Source: {}", source)?;
        }
        writeln!(out, "║ Batch: {}", self.batch_id)?;
        writeln!(
            out,
            "║ Total: {:>8}  │  {}: {:>8}  │  {}: {:>8}",
            k.total, self.labels.suspicious, k.suspicious, self.labels.normal, k.normal
        )?;
        writeln!(out, "║ {} Rate: {}", self.labels.suspicious, k.rate_display())?;
        writeln!(out, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(out, "║ Distribution:")?;
        for (name, count) in [
            (self.labels.suspicious.as_str(), k.suspicious),
            (self.labels.normal.as_str(), k.normal),
        ] {
            let pct = 100.0 * count as f64 / k.total.max(1) as f64;
            writeln!(out, "║   {:10}: {:>6} ({:>6.2}%) {}", name, count, pct, bar(pct / 100.0))?;
        }
        writeln!(out, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(out, "║ Suspicious Probability:")?;
        let total: u64 = self.metrics.probability_buckets.iter().sum();
        for (i, &count) in self.metrics.probability_buckets.iter().enumerate() {
            let share = if total > 0 { count as f64 / total as f64 } else { 0.0 };
            writeln!(
                out,
                "║   {:.1}-{:.1}: {:>6} {}",
                i as f64 / PROBABILITY_BUCKETS as f64,
                (i + 1) as f64 / PROBABILITY_BUCKETS as f64,
                count,
                bar(share)
            )?;
        }
        writeln!(out, "╚══════════════════════════════════════════════════════════════╝")?;

        self.write_results(out, preview_rows)?;
        self.write_importance(out)?;
        self.write_explanations(out)
    }

    fn write_results(&self, out: &mut String, preview_rows: usize) -> fmt::Result {
        writeln!(out)?;
        writeln!(out, "Results ({} rows):", self.results.rows.len())?;
        writeln!(out, "  {}", format_row(&self.results.columns))?;
        for row in self.results.rows.iter().take(preview_rows) {
            writeln!(out, "  {}", format_row(row))?;
        }
        if self.results.rows.len() > preview_rows {
            writeln!(out, "  ... {} more rows in download", self.results.rows.len() - preview_rows)?;
        }
        Ok(())
    }

    fn write_importance(&self, out: &mut String) -> fmt::Result {
        writeln!(out)?;
        match &self.global_importance {
            GlobalImportance::Available { ranking } => {
                writeln!(out, "Global Feature Importance (mean |attribution|):")?;
                let max = ranking.first().map(|f| f.mean_abs).unwrap_or(0.0);
                for f in ranking {
                    let share = if max > 0.0 { f.mean_abs / max } else { 0.0 };
                    writeln!(out, "  {:<24} {:>10.4} {}", f.feature, f.mean_abs, bar(share))?;
                }
            }
            GlobalImportance::Unavailable { reason } => {
                writeln!(out, "Global Feature Importance unavailable: {}", reason)?;
            }
            GlobalImportance::Disabled => {
                writeln!(out, "Explanations disabled")?;
            }
        }
        Ok(())
    }

    fn write_explanations(&self, out: &mut String) -> fmt::Result {
        for view in &self.explanations {
            writeln!(out)?;
            match view {
                RecordView::Explained {
                    record,
                    label,
                    probability,
                    base_value,
                    output,
                    contributions,
                } => {
                    writeln!(
                        out,
                        "Record {} - {} (p={:.3}), base {:.4} -> output {:.4}",
                        record + 1,
                        self.labels.text(*label),
                        probability,
                        base_value,
                        output
                    )?;
                    let max = contributions
                        .first()
                        .map(|c| c.attribution.abs())
                        .unwrap_or(0.0);
                    for c in contributions {
                        let share = if max > 0.0 { c.attribution.abs() / max } else { 0.0 };
                        let sign = if c.attribution >= 0.0 { '+' } else { '-' };
                        writeln!(
                            out,
                            "  {:<24} {:>12.4} {}{:<9.4} {}",
                            c.feature,
                            c.value,
                            sign,
                            c.attribution.abs(),
                            bar(share)
                        )?;
                    }
                }
                RecordView::Failed { record, reason } => {
                    writeln!(out, "Record {} - explanation unavailable: {}", record + 1, reason)?;
                }
            }
        }
        Ok(())
    }
}

fn bar(share: f64) -> String {
    "█".repeat((share.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize)
}

fn format_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| {
            if c.chars().count() > CELL_WIDTH {
                let cut: String = c.chars().take(CELL_WIDTH - 1).collect();
                format!("{}…", cut)
            } else {
                format!("{:<width$}", c, width = CELL_WIDTH)
            }
        })
        .collect::<Vec<_>>()
        .join(" │ ")
}
