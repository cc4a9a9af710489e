//! Suspicious Account Detector - Main Entry Point
//!
//! Scores uploaded account tables and writes the report and download.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use suspicious_account_detector::config::{AppConfig, LogFormat};
use suspicious_account_detector::{BatchOutcome, FeatureSchema, ModelContext, Pipeline};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "suspicious-account-detector",
    about = "Flags suspicious bank accounts in uploaded tables and explains why."
)]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one or more uploads
    Score {
        /// Delimited account tables with a header row
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Download destination, overrides output.download_path
        #[arg(long)]
        output: Option<PathBuf>,

        /// JSON report destination, overrides output.report_path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Skip feature attributions
        #[arg(long)]
        no_explain: bool,
    },

    /// Print the feature schema the classifier expects
    Schema,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config)?;

    match cli.command {
        Commands::Score {
            inputs,
            output,
            report,
            no_explain,
        } => {
            if let Some(path) = output {
                config.output.download_path = path;
            }
            if report.is_some() {
                config.output.report_path = report;
            }
            if no_explain {
                config.explanation.enabled = false;
            }
            cmd_score(&config, &inputs)
        }
        Commands::Schema => cmd_schema(&config),
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn cmd_schema(config: &AppConfig) -> Result<ExitCode> {
    let schema = FeatureSchema::load(&config.artifacts.schema_path).with_context(|| {
        format!(
            "Failed to load feature schema from {}",
            config.artifacts.schema_path.display()
        )
    })?;

    println!("{} features:", schema.len());
    for (i, name) in schema.names().iter().enumerate() {
        println!("  {:>3}. {}", i + 1, name);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_score(config: &AppConfig, inputs: &[PathBuf]) -> Result<ExitCode> {
    info!("Starting Suspicious Account Detector");

    let delimiter = config.table.delimiter_byte()?;
    let context = ModelContext::load(config)?;
    let pipeline = Pipeline::new(&context, config);

    let mut failed = 0usize;
    for input in inputs {
        let result = pipeline
            .process_path(input, delimiter)
            .map_err(anyhow::Error::from)
            .and_then(|outcome| deliver(config, input, inputs.len(), &outcome, delimiter));

        if let Err(e) = result {
            failed += 1;
            error!(input = %input.display(), error = %e, "Upload failed");
            eprintln!("{}: {:#}", input.display(), e);
        }
    }

    info!(uploads = inputs.len(), failed, "Scoring complete");
    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Print the report and write the download (and JSON report when configured)
fn deliver(
    config: &AppConfig,
    input: &Path,
    uploads: usize,
    outcome: &BatchOutcome,
    delimiter: u8,
) -> Result<()> {
    let report = &outcome.report;
    println!("{}", report.render_text(config.output.preview_rows));

    let download = output_path(&config.output.download_path, input, uploads);
    report
        .results
        .save(&download, delimiter)
        .with_context(|| format!("Failed to write download to {}", download.display()))?;
    info!(path = %download.display(), rows = report.results.rows.len(), "Download written");

    if let Some(path) = &config.output.report_path {
        let path = output_path(path, input, uploads);
        report
            .save_json(&path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }
    Ok(())
}

/// With several uploads, prefix each output file with its input's stem
fn output_path(configured: &Path, input: &Path, uploads: usize) -> PathBuf {
    if uploads <= 1 {
        return configured.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let name = configured
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    configured.with_file_name(format!("{}_{}", stem, name))
}
