//! Fraud Anomaly Pipeline - Main Entry Point
//!
//! Loads a labeled transaction table, trains the three anomaly detectors,
//! prints the comparison report and exports the best model's predictions.

use anyhow::{Context, Result};
use clap::Parser;
use fraud_anomaly_pipeline::{config::AppConfig, pipeline::Pipeline, report};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "config/config.toml";

#[derive(Parser, Debug)]
#[command(name = "fraud-anomaly-pipeline")]
#[command(about = "Benchmark unsupervised fraud detectors on a transaction table")]
struct Args {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input CSV, overrides data.dataset_path
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Predictions CSV, overrides data.output_path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for confusion matrices and the run summary
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Split and model seed
    #[arg(long)]
    seed: Option<u64>,

    /// Train models one after another
    #[arg(long)]
    sequential: bool,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None if PathBuf::from(DEFAULT_CONFIG).exists() => AppConfig::load()?,
        None => AppConfig::default(),
    };

    if let Some(dataset) = &args.dataset {
        config.data.dataset_path = dataset.clone();
    }
    if let Some(output) = &args.output {
        config.data.output_path = output.clone();
    }
    if let Some(artifacts) = &args.artifacts {
        config.data.artifacts_dir = artifacts.clone();
    }
    if let Some(seed) = args.seed {
        config.split.seed = seed;
    }
    if args.sequential {
        config.pipeline.parallel = false;
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("fraud_anomaly_pipeline={}", config.logging.level).parse()?);

    if config.logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!("Starting Fraud Anomaly Pipeline");
    info!(
        "Dataset: {}, test fraction: {:.2}, seed: {}",
        config.data.dataset_path.display(),
        config.split.test_fraction,
        config.split.seed
    );
    info!(
        "Trainers run {} with {} workers",
        if config.pipeline.parallel { "in parallel" } else { "sequentially" },
        config.pipeline.workers
    );

    let start = Instant::now();
    let pipeline = Pipeline::new(config.clone());
    let outcome = pipeline
        .run()
        .await
        .with_context(|| format!("Pipeline failed on {}", config.data.dataset_path.display()))?;

    println!("{}", report::render(&outcome.table, &outcome.failures));

    match outcome.export(&config) {
        Ok(artifacts) => {
            info!(
                predictions = %artifacts.predictions.display(),
                matrices = artifacts.confusion_matrices.len(),
                summary = %artifacts.summary.display(),
                "Artifacts exported"
            );
        }
        Err(e) => {
            error!(error = %e, "Export failed");
            return Err(e.into());
        }
    }

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Pipeline finished");
    Ok(())
}
