//! ONNX Runtime classifier

use crate::error::{PipelineError, Result as PipelineResult};
use crate::models::classifier::{Classifier, ClassifierOutput};
use crate::models::loader::{LoadedModel, ModelLoader};
use anyhow::{anyhow, bail, Context, Result};
use ndarray::ArrayView2;
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Trained classifier exported to ONNX (e.g. a random forest via skl2onnx)
pub struct OnnxClassifier {
    /// Session behind a lock: running a session needs exclusive access
    model: RwLock<LoadedModel>,
    name: String,
    suspicious_class: usize,
    probability_output: Option<String>,
    label_output: Option<String>,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel, suspicious_class: usize) -> Self {
        let probability_output = model.find_output(&["prob"]).map(str::to_string);
        let label_output = model.find_output(&["label"]).map(str::to_string);

        debug!(
            model = %model.name,
            probability_output = ?probability_output,
            label_output = ?label_output,
            "Classifier outputs resolved"
        );

        Self {
            name: model.name.clone(),
            model: RwLock::new(model),
            suspicious_class,
            probability_output,
            label_output,
        }
    }

    pub fn load<P: AsRef<Path>>(
        loader: &ModelLoader,
        path: P,
        suspicious_class: usize,
    ) -> Result<Self> {
        let model = loader.load_model(path, "classifier")?;
        Ok(Self::new(model, suspicious_class))
    }

    fn run(&self, features: ArrayView2<'_, f32>) -> Result<ClassifierOutput> {
        let rows = features.nrows();
        let shape = vec![rows as i64, features.ncols() as i64];
        let input_tensor = Tensor::from_array((shape, features.iter().copied().collect::<Vec<f32>>()))
            .context("Failed to create input tensor")?;

        let mut guard = self
            .model
            .write()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let model: &mut LoadedModel = &mut guard;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;

        let probabilities = self.extract_probabilities(&outputs, rows)?;
        let labels = self.extract_labels(&outputs, rows);

        debug!(
            model = %self.name,
            rows = rows,
            model_labels = labels.is_some(),
            "Batch inference complete"
        );

        Ok(ClassifierOutput {
            probabilities,
            labels,
        })
    }

    /// Suspicious-class probabilities from whichever output carries them.
    /// Handles tensor outputs and seq(map(int64, float)) outputs.
    fn extract_probabilities(
        &self,
        outputs: &ort::session::SessionOutputs,
        rows: usize,
    ) -> Result<Vec<f64>> {
        if let Some(output) = self
            .probability_output
            .as_deref()
            .and_then(|name| outputs.get(name))
        {
            if let Ok(probs) = self.probabilities_from_value(output, rows) {
                return Ok(probs);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            match self.probabilities_from_value(&output, rows) {
                Ok(probs) => {
                    debug!(model = %self.name, output = %name, "Probabilities extracted (fallback)");
                    return Ok(probs);
                }
                Err(e) => debug!(model = %self.name, output = %name, error = %e, "Output skipped"),
            }
        }

        bail!("No output of {} holds class probabilities", self.name)
    }

    fn probabilities_from_value(&self, output: &DynValue, rows: usize) -> Result<Vec<f64>> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return probabilities_from_tensor(&dims, data, rows, self.suspicious_class);
        }

        if DynSequenceValueType::can_downcast(output.dtype()) {
            return self.probabilities_from_sequence_map(output, rows);
        }

        bail!("Unsupported output type {:?}", output.dtype())
    }

    /// One map per row, class index -> probability
    fn probabilities_from_sequence_map(&self, output: &DynValue, rows: usize) -> Result<Vec<f64>> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        if maps.len() != rows {
            bail!("Expected {} probability maps, got {}", rows, maps.len());
        }

        maps.iter()
            .map(|map| {
                let pairs = map.try_extract_key_values::<i64, f32>()?;
                probability_from_pairs(&pairs, self.suspicious_class)
            })
            .collect()
    }

    fn extract_labels(&self, outputs: &ort::session::SessionOutputs, rows: usize) -> Option<Vec<i64>> {
        let output = outputs.get(self.label_output.as_deref()?)?;
        match output.try_extract_tensor::<i64>() {
            Ok((_, data)) if data.len() == rows => Some(data.to_vec()),
            Ok((_, data)) => {
                warn!(model = %self.name, expected = rows, got = data.len(), "Label output length mismatch, using probabilities");
                None
            }
            Err(e) => {
                warn!(model = %self.name, error = %e, "Label output unreadable, using probabilities");
                None
            }
        }
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, features: ArrayView2<'_, f32>) -> PipelineResult<ClassifierOutput> {
        self.run(features)
            .map_err(|e| PipelineError::model(format!("{}: {:#}", self.name, e)))
    }
}

/// Per-row suspicious probability from a probability tensor.
///
/// Accepts `[rows, classes]`, `[rows, 1]` and `[rows]`; a single row may
/// also come back as a flat `[classes]` vector.
fn probabilities_from_tensor(
    dims: &[i64],
    data: &[f32],
    rows: usize,
    class: usize,
) -> Result<Vec<f64>> {
    let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
    if dims.iter().product::<usize>() != data.len() {
        bail!("Tensor shape {:?} does not match {} values", dims, data.len());
    }

    match dims.as_slice() {
        [r, 1] | [r] if *r == rows => Ok(data.iter().map(|&p| p as f64).collect()),
        [r, classes] if *r == rows => {
            if class >= *classes {
                bail!("Class {} not in {} probability columns", class, classes);
            }
            Ok(data
                .chunks(*classes)
                .map(|row| row[class] as f64)
                .collect())
        }
        [classes] if rows == 1 && class < *classes => Ok(vec![data[class] as f64]),
        other => bail!("Unexpected probability shape {:?} for {} rows", other, rows),
    }
}

fn probability_from_pairs(pairs: &[(i64, f32)], class: usize) -> Result<f64> {
    let class = class as i64;
    if let Some((_, p)) = pairs.iter().find(|(c, _)| *c == class) {
        return Ok(*p as f64);
    }
    // Binary map holding only the other class
    if let [(_, other)] = pairs {
        return Ok(1.0 - *other as f64);
    }
    Err(anyhow!("No probability for class {} in map", class))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_class_tensor() {
        let data = [0.9, 0.1, 0.2, 0.8, 0.6, 0.4];
        let probs = probabilities_from_tensor(&[3, 2], &data, 3, 1).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs[1] - 0.8).abs() < 1e-6);

        let normal = probabilities_from_tensor(&[3, 2], &data, 3, 0).unwrap();
        assert!((normal[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_single_column_and_flat_tensors() {
        let probs = probabilities_from_tensor(&[2, 1], &[0.3, 0.7], 2, 1).unwrap();
        assert!((probs[1] - 0.7).abs() < 1e-6);

        let flat = probabilities_from_tensor(&[2], &[0.3, 0.7], 2, 1).unwrap();
        assert_eq!(flat.len(), 2);

        let single = probabilities_from_tensor(&[3], &[0.1, 0.7, 0.2], 1, 1).unwrap();
        assert!((single[0] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_bad_tensor_shapes() {
        assert!(probabilities_from_tensor(&[3, 2], &[0.1; 5], 3, 1).is_err());
        assert!(probabilities_from_tensor(&[4, 2], &[0.1; 8], 3, 1).is_err());
        assert!(probabilities_from_tensor(&[3, 2], &[0.1; 6], 3, 2).is_err());
    }

    #[test]
    fn test_probability_from_pairs() {
        assert!((probability_from_pairs(&[(0, 0.25), (1, 0.75)], 1).unwrap() - 0.75).abs() < 1e-6);
        assert!((probability_from_pairs(&[(0, 0.25)], 1).unwrap() - 0.75).abs() < 1e-6);
        assert!(probability_from_pairs(&[(0, 0.2), (2, 0.8)], 1).is_err());
    }
}
