//! Fraud Anomaly Pipeline Library
//!
//! Unsupervised credit card fraud detection benchmark. A labeled transaction
//! table is scaled, split with stratification, and used to fit an Isolation
//! Forest, a One-Class SVM and a dense autoencoder. Each model is scored on
//! the held-out split and ranked by ROC-AUC.

pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod selection;
pub mod split;
pub mod synthetic;
pub mod types;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use metrics::{ClassificationMetrics, ConfusionMatrix};
pub use models::{FraudDetector, ModelKind, Trainer};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use preprocess::Preprocessor;
pub use selection::ComparisonTable;
pub use split::{stratified_split, DatasetSplit};
pub use types::{LabeledDataset, ModelFailure, ModelResult, TransactionTable};
