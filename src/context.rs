//! Process-wide model context, built once at startup

use crate::config::AppConfig;
use crate::explain::{AttributionBackend, OnnxExplainer, SamplingExplainer};
use crate::models::{Classifier, ModelLoader, OnnxClassifier};
use crate::schema::FeatureSchema;
use crate::table::UploadTable;
use crate::types::AlignedBatch;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Trained artifacts shared read-only by every batch
pub struct ModelContext {
    schema: FeatureSchema,
    classifier: Arc<dyn Classifier>,
    explainer: Option<Arc<dyn AttributionBackend>>,
    /// Reference rows for attributions, aligned to the schema
    background: Option<AlignedBatch>,
}

impl ModelContext {
    pub fn new(schema: FeatureSchema, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            schema,
            classifier,
            explainer: None,
            background: None,
        }
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn AttributionBackend>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn with_background(mut self, background: AlignedBatch) -> Self {
        self.background = Some(background);
        self
    }

    /// Load schema, classifier and (when enabled) the attribution backend.
    pub fn load(config: &AppConfig) -> Result<Self> {
        let artifacts = &config.artifacts;

        let schema = FeatureSchema::load(&artifacts.schema_path).with_context(|| {
            format!("Failed to load feature schema from {}", artifacts.schema_path.display())
        })?;

        let loader = ModelLoader::with_threads(artifacts.onnx_threads)?;
        let classifier: Arc<dyn Classifier> = Arc::new(OnnxClassifier::load(
            &loader,
            &artifacts.model_path,
            config.prediction.suspicious_class,
        )?);

        let mut context = Self::new(schema, classifier.clone());

        if config.explanation.enabled {
            let explainer: Arc<dyn AttributionBackend> = match &artifacts.explainer_path {
                Some(path) => Arc::new(OnnxExplainer::load(&loader, path)?),
                None => Arc::new(
                    SamplingExplainer::new(classifier)
                        .with_samples(config.explanation.samples)
                        .with_background_rows(config.explanation.background_rows)
                        .with_seed(config.explanation.seed),
                ),
            };
            context = context.with_explainer(explainer);

            if let Some(path) = &config.explanation.background_path {
                let table = UploadTable::from_path(path, config.table.delimiter_byte()?)
                    .with_context(|| format!("Failed to read background from {}", path.display()))?;
                let background = context
                    .schema
                    .align(&table)
                    .with_context(|| format!("Background {} does not fit the schema", path.display()))?;
                anyhow::ensure!(!background.is_empty(), "Background {} has no rows", path.display());
                info!(rows = background.rows(), path = %path.display(), "Attribution background loaded");
                context = context.with_background(background);
            }
        }

        info!(
            features = context.schema.len(),
            classifier = %context.classifier.name(),
            explainer = context.explainer.as_ref().map(|e| e.name()).unwrap_or("disabled"),
            "Model context ready"
        );

        Ok(context)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn explainer(&self) -> Option<&dyn AttributionBackend> {
        self.explainer.as_deref()
    }

    pub fn background(&self) -> Option<&AlignedBatch> {
        self.background.as_ref()
    }
}
