//! Feature schema and upload alignment.
//!
//! The schema is the ordered feature list the model was trained on. Every
//! upload is validated and reordered against it; missing features are an
//! error, never imputed.

use crate::error::{PipelineError, Result};
use crate::table::UploadTable;
use crate::types::prediction::{LABEL_COLUMN, PREDICTION_COLUMN};
use crate::types::AlignedBatch;
use ndarray::Array2;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Schema artifact layouts written by the training side
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    List(Vec<String>),
    Info { feature_names: Vec<String> },
}

/// Ordered feature names fixed at training time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Arc<[String]>,
}

impl FeatureSchema {
    /// Create a schema; names must be non-empty and unique.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(PipelineError::InvalidSchema("no features".to_string()));
        }
        if let Some(blank) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(PipelineError::InvalidSchema(format!(
                "feature {} has an empty name",
                blank
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(PipelineError::InvalidSchema(format!(
                "feature {:?} listed twice",
                dup
            )));
        }

        Ok(Self {
            names: names.into(),
        })
    }

    /// Load the schema artifact: a JSON list of names, or an object with a
    /// `feature_names` list.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let names = match serde_json::from_str::<SchemaFile>(&raw)? {
            SchemaFile::List(names) => names,
            SchemaFile::Info { feature_names } => feature_names,
        };

        let schema = Self::new(names)?;
        info!(path = %path.display(), features = schema.len(), "Feature schema loaded");
        Ok(schema)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Validate an upload and extract its features in schema order.
    ///
    /// Columns outside the schema pass through untouched, except the
    /// reserved download column names, which are rejected as unexpected.
    pub fn align(&self, table: &UploadTable) -> Result<AlignedBatch> {
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, header) in table.headers().iter().enumerate() {
            positions.entry(header.trim()).or_default().push(idx);
        }

        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|name| !positions.contains_key(name.as_str()))
            .cloned()
            .collect();

        // Duplicated features are ambiguous; reserved names would collide with
        // the appended prediction columns.
        let mut unexpected: Vec<String> = self
            .names
            .iter()
            .filter(|name| positions.get(name.as_str()).is_some_and(|p| p.len() > 1))
            .cloned()
            .collect();
        unexpected.extend(
            [PREDICTION_COLUMN, LABEL_COLUMN]
                .into_iter()
                .filter(|reserved| positions.contains_key(reserved))
                .map(str::to_string),
        );

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                missing,
                unexpected,
            });
        }

        let source_columns: Vec<usize> = self
            .names
            .iter()
            .map(|name| positions[name.as_str()][0])
            .collect();

        let mut values = Vec::with_capacity(table.len() * self.len());
        for (row_idx, row) in table.rows().iter().enumerate() {
            for (feature, &col) in self.names.iter().zip(&source_columns) {
                let cell = row.get(col).unwrap_or_default();
                values.push(parse_feature(cell).ok_or_else(|| PipelineError::InvalidValue {
                    row: row_idx + 1,
                    column: feature.clone(),
                    value: cell.to_string(),
                })?);
            }
        }

        let features = Array2::from_shape_vec((table.len(), self.len()), values)
            .map_err(|e| PipelineError::model(format!("feature matrix: {}", e)))?;

        debug!(
            rows = table.len(),
            features = self.len(),
            passthrough = table.headers().len() - self.len(),
            "Upload aligned to schema"
        );

        Ok(AlignedBatch::new(features))
    }
}

/// Finite numeric cell; empty, textual and non-finite values are rejected.
fn parse_feature(cell: &str) -> Option<f32> {
    cell.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::StringRecord;
    use std::io::Write;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["txn_count_30d", "avg_txn_amount", "night_txn_ratio"]).unwrap()
    }

    fn table(csv: &str) -> UploadTable {
        UploadTable::from_reader(csv.as_bytes(), b',').unwrap()
    }

    #[test]
    fn test_schema_rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(Vec::<String>::new()).is_err());
        assert!(FeatureSchema::new(["a", "b", "a"]).is_err());
        assert!(FeatureSchema::new(["a", " "]).is_err());
    }

    #[test]
    fn test_align_reorders_to_schema() {
        let upload = table(
            "night_txn_ratio,account_id,avg_txn_amount,txn_count_30d\n0.1,acc_1,40.5,12\n0.9,acc_2,900,3\n",
        );
        let batch = schema().align(&upload).unwrap();

        assert_eq!(batch.rows(), 2);
        assert_eq!(batch.row(0).unwrap().to_vec(), vec![12.0, 40.5, 0.1]);
        assert_eq!(batch.row(1).unwrap().to_vec(), vec![3.0, 900.0, 0.9]);
    }

    #[test]
    fn test_align_any_column_order() {
        let orders = [
            ["txn_count_30d", "avg_txn_amount", "night_txn_ratio"],
            ["avg_txn_amount", "night_txn_ratio", "txn_count_30d"],
            ["night_txn_ratio", "txn_count_30d", "avg_txn_amount"],
        ];
        let values: HashMap<&str, &str> =
            [("txn_count_30d", "1"), ("avg_txn_amount", "2"), ("night_txn_ratio", "3")].into();

        for order in orders {
            let headers = StringRecord::from(order.to_vec());
            let row = StringRecord::from(order.iter().map(|h| values[h]).collect::<Vec<_>>());
            let batch = schema().align(&UploadTable::new(headers, vec![row])).unwrap();
            assert_eq!(batch.row(0).unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_align_missing_column() {
        let upload = table("txn_count_30d,night_txn_ratio\n12,0.1\n");
        match schema().align(&upload) {
            Err(PipelineError::SchemaMismatch { missing, unexpected }) => {
                assert_eq!(missing, vec!["avg_txn_amount".to_string()]);
                assert!(unexpected.is_empty());
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_align_names_every_missing_column() {
        let upload = table("account_id\nacc_1\n");
        match schema().align(&upload) {
            Err(PipelineError::SchemaMismatch { missing, .. }) => {
                assert_eq!(missing, schema().names().to_vec());
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_align_rejects_reserved_and_duplicate_columns() {
        let upload = table(
            "txn_count_30d,avg_txn_amount,night_txn_ratio,avg_txn_amount,prediction\n1,2,3,4,0\n",
        );
        match schema().align(&upload) {
            Err(PipelineError::SchemaMismatch { missing, unexpected }) => {
                assert!(missing.is_empty());
                assert_eq!(unexpected, vec!["avg_txn_amount".to_string(), "prediction".to_string()]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_align_rejects_blank_and_text_cells() {
        let upload = table("txn_count_30d,avg_txn_amount,night_txn_ratio\n1,2,3\n4,,6\n");
        match schema().align(&upload) {
            Err(PipelineError::InvalidValue { row, column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "avg_txn_amount");
            }
            other => panic!("expected invalid value, got {:?}", other),
        }

        let upload = table("txn_count_30d,avg_txn_amount,night_txn_ratio\nNaN,2,3\n");
        assert!(matches!(
            schema().align(&upload),
            Err(PipelineError::InvalidValue { row: 1, .. })
        ));
    }

    #[test]
    fn test_align_header_only_gives_empty_batch() {
        let upload = table("txn_count_30d,avg_txn_amount,night_txn_ratio\n");
        let batch = schema().align(&upload).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.n_features(), 3);
    }

    #[test]
    fn test_load_both_layouts() {
        let mut list = tempfile::NamedTempFile::new().unwrap();
        write!(list, r#"["a", "b"]"#).unwrap();
        assert_eq!(FeatureSchema::load(list.path()).unwrap().names(), &["a", "b"]);

        let mut info = tempfile::NamedTempFile::new().unwrap();
        write!(info, r#"{{"feature_names": ["x", "y", "z"], "target": "is_suspicious"}}"#).unwrap();
        assert_eq!(FeatureSchema::load(info.path()).unwrap().len(), 3);
    }
}
