//! Configuration management for the suspicious account detector

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, FileSourceFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// How records are picked for per-record explanations
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSelection {
    /// First records in upload order
    #[default]
    First,
    /// Records with the highest suspicious probability
    MostSuspicious,
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    pub prediction: PredictionConfig,
    pub explanation: ExplanationConfig,
    pub table: TableConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Trained model artifacts, produced by the training process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// ONNX export of the trained classifier
    pub model_path: PathBuf,
    /// JSON list of feature names in training order
    pub schema_path: PathBuf,
    /// ONNX attribution model; the sampling explainer is used when unset
    pub explainer_path: Option<PathBuf>,
    /// Number of threads for ONNX inference
    pub onnx_threads: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/suspicious_model.onnx"),
            schema_path: PathBuf::from("model/feature_names.json"),
            explainer_path: None,
            onnx_threads: 1,
        }
    }
}

/// Decision and labelling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Class index the model uses for "suspicious"
    pub suspicious_class: usize,
    /// Probability above which a record is suspicious, used only when
    /// the model exposes no label output
    pub threshold: f64,
    pub suspicious_label: String,
    pub normal_label: String,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            suspicious_class: 1,
            threshold: 0.5,
            suspicious_label: "Suspicious".to_string(),
            normal_label: "Normal".to_string(),
        }
    }
}

/// Attribution configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    pub enabled: bool,
    /// Number of per-record explanations
    pub top_k: usize,
    pub selection: RecordSelection,
    /// Permutations per record for the sampling explainer
    pub samples: usize,
    /// Reference rows (delimited, schema columns) the attributions are
    /// measured against; the upload itself is used when unset
    pub background_path: Option<PathBuf>,
    /// Maximum background rows for the sampling explainer
    pub background_rows: usize,
    pub seed: u64,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
            selection: RecordSelection::First,
            samples: 64,
            background_path: None,
            background_rows: 50,
            seed: 42,
        }
    }
}

/// Report and download configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub download_path: PathBuf,
    /// JSON report destination, skipped when unset
    pub report_path: Option<PathBuf>,
    /// Rows shown in the terminal results table
    pub preview_rows: usize,
}

/// Delimited-table format, shared by uploads, the background file and the download
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub delimiter: char,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("predicted_output.csv"),
            report_path: None,
            preview_rows: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TableConfig {
    /// Delimiter as the single byte the CSV reader and writer expect.
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .with_context(|| format!("Delimiter {:?} is not a single ASCII character", self.delimiter))
    }
}

impl AppConfig {
    /// Load configuration from the default file, if present
    pub fn load() -> Result<Self> {
        Self::build(File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false))
    }

    /// Load configuration from a specific path, with `SAD__SECTION__KEY` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()))
    }

    fn build(file: File<FileSourceFile, FileFormat>) -> Result<Self> {
        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("SAD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
