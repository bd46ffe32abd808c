//! Synthetic Dataset Generator
//!
//! Writes a credit-card-like transaction CSV for local runs of the pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use fraud_anomaly_pipeline::synthetic::{self, SyntheticConfig};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "generate_dataset")]
#[command(about = "Generate a synthetic labeled transaction table")]
struct Args {
    /// Output CSV path
    #[arg(short, long, default_value = "data/creditcard.csv")]
    output: PathBuf,

    /// Number of transactions
    #[arg(short, long, default_value_t = 10_000)]
    rows: usize,

    /// Number of fraudulent transactions
    #[arg(short, long, default_value_t = 17)]
    fraud: usize,

    /// Number of anonymized V columns
    #[arg(long, default_value_t = 28)]
    features: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = SyntheticConfig {
        rows: args.rows,
        fraud: args.fraud,
        pca_features: args.features,
        seed: args.seed,
    };

    info!(
        rows = config.rows,
        fraud = config.fraud.min(config.rows),
        features = config.pca_features,
        seed = config.seed,
        "Generating transactions"
    );

    let table = config.generate();

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    synthetic::write_csv(&table, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(path = %args.output.display(), rows = table.len(), "Dataset written");
    Ok(())
}
