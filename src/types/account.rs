//! Account records and schema-aligned feature batches

use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};

/// One uploaded account row: its raw fields plus the schema-ordered features.
///
/// Borrowed from the upload and the aligned batch; never mutated.
#[derive(Debug, Clone, Copy)]
pub struct AccountRecord<'a> {
    /// 0-based row index within the batch
    pub index: usize,
    /// Raw input fields in upload column order, passthrough columns included
    pub fields: &'a csv::StringRecord,
    /// Feature values in schema order
    pub features: ArrayView1<'a, f32>,
}

impl<'a> AccountRecord<'a> {
    /// Raw value of an input column by position.
    pub fn field(&self, column: usize) -> Option<&'a str> {
        self.fields.get(column)
    }
}

/// Feature matrix whose columns follow the trained schema exactly.
///
/// Only the schema aligner constructs batches from uploads, so every batch
/// handed to the model has `n_features == schema.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedBatch {
    features: Array2<f32>,
}

impl AlignedBatch {
    pub(crate) fn new(features: Array2<f32>) -> Self {
        Self { features }
    }

    /// Build a batch from row vectors, all of the same width.
    pub fn from_rows(rows: &[Vec<f32>], n_features: usize) -> Option<Self> {
        if rows.iter().any(|r| r.len() != n_features) {
            return None;
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), n_features), flat)
            .ok()
            .map(Self::new)
    }

    /// Number of records
    pub fn rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.rows()).then(|| self.features.row(index))
    }

    /// Single-row view, kept two-dimensional for backends that take matrices.
    pub fn record_view(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        (index < self.rows()).then(|| self.features.slice(s![index..index + 1, ..]))
    }

    /// Iterate feature rows in upload order.
    pub fn iter_rows(&self) -> impl Iterator<Item = ArrayView1<'_, f32>> {
        self.features.axis_iter(Axis(0))
    }
}
