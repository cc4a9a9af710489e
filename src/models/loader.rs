//! ONNX model loader

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name, used in logs and errors
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the feature matrix
    pub input_name: String,
    /// All output names, in graph order
    pub output_names: Vec<String>,
}

impl LoadedModel {
    /// First output whose lowercased name contains any of `patterns`.
    pub fn find_output(&self, patterns: &[&str]) -> Option<&str> {
        find_named(&self.output_names, patterns)
    }
}

fn find_named<'a>(names: &'a [String], patterns: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find(|name| {
            let lower = name.to_lowercase();
            patterns.iter().any(|p| lower.contains(p))
        })
        .map(String::as_str)
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self {
            onnx_threads: onnx_threads.max(1),
        })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            anyhow::bail!("Model {} at {} has no outputs", name, path.display());
        }

        info!(
            model = %name,
            input = %input_name,
            outputs = ?output_names,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_named_output() {
        let names = vec![
            "output_label".to_string(),
            "output_probability".to_string(),
        ];
        assert_eq!(find_named(&names, &["prob"]), Some("output_probability"));
        assert_eq!(find_named(&names, &["label"]), Some("output_label"));
        assert_eq!(find_named(&names, &["shap"]), None);
    }
}
