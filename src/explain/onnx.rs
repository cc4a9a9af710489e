//! ONNX attribution backend.
//!
//! Wraps an exported explainer graph (for example a TreeSHAP export). Such
//! exports disagree on layout: a positive-class matrix, a sequence with one
//! matrix per class, or a rows × features × classes tensor. This adapter maps
//! each onto [`RawAttribution`] and leaves selection to the engine.

use crate::error::{PipelineError, Result as PipelineResult};
use crate::explain::backend::{AttributionBackend, RawAttribution, RawBaseValue, RawExplanation};
use crate::models::loader::{LoadedModel, ModelLoader};
use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, Array3, ArrayView2};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynSequenceValueType, DynTensorValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, warn};

const ATTRIBUTION_PATTERNS: &[&str] = &["shap", "attribution", "contrib"];
const BASE_PATTERNS: &[&str] = &["expected", "base"];

pub struct OnnxExplainer {
    model: RwLock<LoadedModel>,
    name: String,
    attribution_output: String,
    base_output: Option<String>,
}

impl OnnxExplainer {
    pub fn new(model: LoadedModel) -> Result<Self> {
        let attribution_output = model
            .find_output(ATTRIBUTION_PATTERNS)
            .or_else(|| model.output_names.first().map(String::as_str))
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Explainer {} has no outputs", model.name))?;
        let base_output = model
            .find_output(BASE_PATTERNS)
            .filter(|name| *name != attribution_output)
            .map(str::to_string);

        if base_output.is_none() {
            warn!(model = %model.name, "Explainer has no expected-value output, base value defaults to 0");
        }

        Ok(Self {
            name: model.name.clone(),
            model: RwLock::new(model),
            attribution_output,
            base_output,
        })
    }

    pub fn load<P: AsRef<Path>>(loader: &ModelLoader, path: P) -> Result<Self> {
        let model = loader.load_model(path, "explainer")?;
        Self::new(model)
    }

    fn run(&self, instances: ArrayView2<'_, f32>) -> Result<RawExplanation> {
        let shape = vec![instances.nrows() as i64, instances.ncols() as i64];
        let input_tensor = Tensor::from_array((shape, instances.iter().copied().collect::<Vec<f32>>()))
            .context("Failed to create input tensor")?;

        let mut guard = self
            .model
            .write()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let model: &mut LoadedModel = &mut guard;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;

        let attribution = outputs
            .get(&self.attribution_output)
            .ok_or_else(|| anyhow!("Output {} missing", self.attribution_output))?;
        let values = attribution_from_value(attribution)?;

        let base = match self.base_output.as_deref().and_then(|name| outputs.get(name)) {
            Some(output) => {
                let (_, data) = output
                    .try_extract_tensor::<f32>()
                    .context("Expected-value output is not a float tensor")?;
                base_from_values(data)?
            }
            None => RawBaseValue::Scalar(0.0),
        };

        debug!(model = %self.name, shape = %values.describe(), "Explainer output read");

        Ok(RawExplanation { values, base })
    }
}

impl AttributionBackend for OnnxExplainer {
    fn name(&self) -> &str {
        &self.name
    }

    /// The exported graph carries its own background; `background` is unused.
    fn attribute(
        &self,
        instances: ArrayView2<'_, f32>,
        _background: ArrayView2<'_, f32>,
    ) -> PipelineResult<RawExplanation> {
        self.run(instances)
            .map_err(|e| PipelineError::model(format!("{}: {:#}", self.name, e)))
    }
}

fn attribution_from_value(output: &DynValue) -> Result<RawAttribution> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return attribution_from_tensor(&dims, data);
    }

    if DynSequenceValueType::can_downcast(output.dtype()) {
        let allocator = Allocator::default();
        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
        let tensors = sequence.try_extract_sequence::<DynTensorValueType>(&allocator)?;

        let matrices = tensors
            .iter()
            .map(|tensor| -> Result<Array2<f64>> {
                let (shape, data) = tensor.try_extract_tensor::<f32>()?;
                let dims: Vec<i64> = shape.iter().copied().collect();
                match attribution_from_tensor(&dims, data)? {
                    RawAttribution::Matrix(m) => Ok(m),
                    other => bail!("Per-class attribution must be 2-D, got {}", other.describe()),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(RawAttribution::ClassPair(matrices));
    }

    bail!("Unsupported attribution output type {:?}", output.dtype())
}

/// Rank 2 is a positive-class matrix, rank 3 a rows × features × classes tensor.
fn attribution_from_tensor(dims: &[i64], data: &[f32]) -> Result<RawAttribution> {
    let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
    let values: Vec<f64> = data.iter().map(|&v| v as f64).collect();

    match dims.as_slice() {
        &[rows, features] => Ok(RawAttribution::Matrix(Array2::from_shape_vec(
            (rows, features),
            values,
        )?)),
        &[rows, features, classes] => Ok(RawAttribution::Tensor(Array3::from_shape_vec(
            (rows, features, classes),
            values,
        )?)),
        other => bail!("Unsupported attribution rank {} ({:?})", other.len(), other),
    }
}

fn base_from_values(data: &[f32]) -> Result<RawBaseValue> {
    match data {
        [] => bail!("Expected-value output is empty"),
        [single] => Ok(RawBaseValue::Scalar(*single as f64)),
        many => Ok(RawBaseValue::PerClass(many.iter().map(|&v| v as f64).collect())),
    }
}
