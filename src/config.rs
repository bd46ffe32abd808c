//! Configuration management for the fraud benchmark pipeline

use crate::error::PipelineError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub isolation_forest: IsolationForestConfig,
    pub svm: SvmConfig,
    pub autoencoder: AutoencoderConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Input and output locations
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Labeled transaction CSV
    pub dataset_path: PathBuf,
    /// Predictions CSV written for the best model
    pub output_path: PathBuf,
    /// Directory for confusion matrices and the run summary
    pub artifacts_dir: PathBuf,
}

/// Train/test split configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows held out for testing
    pub test_fraction: f64,
    /// Seed shared by the splitter and every trainer
    pub seed: u64,
}

/// Isolation Forest configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IsolationForestConfig {
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Sub-sample size per tree
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_max_samples() -> usize {
    256
}

/// Kernel used by the One-Class SVM
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SvmKernel {
    #[default]
    Rbf,
    Linear,
}

/// RBF kernel coefficient
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Gamma {
    /// `scale` or `auto`
    Named(GammaRule),
    /// Fixed coefficient
    Value(f64),
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GammaRule {
    /// 1 / (n_features * Var(X))
    Scale,
    /// 1 / n_features
    Auto,
}

impl Default for Gamma {
    fn default() -> Self {
        Gamma::Named(GammaRule::Scale)
    }
}

/// One-Class SVM configuration
///
/// Fitting cost grows with the cube of the training rows and the kernel
/// matrix with their square, so training rows are capped by
/// `max_train_samples` (sampled with the run seed).
#[derive(Debug, Clone, Deserialize)]
pub struct SvmConfig {
    #[serde(default)]
    pub kernel: SvmKernel,
    #[serde(default)]
    pub gamma: Gamma,
    #[serde(default = "default_max_train_samples")]
    pub max_train_samples: usize,
    /// Lower bound applied to nu when the contamination ratio is tiny or zero
    #[serde(default = "default_min_nu")]
    pub min_nu: f64,
    /// Stopping tolerance on the maximal KKT violation
    #[serde(default = "default_svm_tol")]
    pub tol: f64,
    #[serde(default = "default_svm_max_iter")]
    pub max_iter: usize,
}

fn default_max_train_samples() -> usize {
    2000
}

fn default_min_nu() -> f64 {
    1e-3
}

fn default_svm_tol() -> f64 {
    1e-3
}

fn default_svm_max_iter() -> usize {
    1_000_000
}

/// Autoencoder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AutoencoderConfig {
    /// Hidden layer widths; the output layer always matches the input width
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Trailing fraction of training rows used for validation loss
    pub validation_split: f64,
    /// Reconstruction error percentile used as the fraud threshold
    pub threshold_percentile: f64,
}

/// Pipeline execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Run trainers concurrently on the blocking pool
    pub parallel: bool,
    /// Maximum trainers running at once
    pub workers: usize,
    /// Per-trainer timeout in milliseconds (0 disables)
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `FRAUD__SECTION__KEY`
    /// environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FRAUD").separator("__").try_parsing(true))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return invalid("split.test_fraction must be in (0, 1)");
        }
        if self.isolation_forest.n_estimators == 0 {
            return invalid("isolation_forest.n_estimators must be positive");
        }
        if self.isolation_forest.max_samples < 2 {
            return invalid("isolation_forest.max_samples must be at least 2");
        }
        if self.svm.max_train_samples == 0 {
            return invalid("svm.max_train_samples must be positive");
        }
        if !(self.svm.min_nu > 0.0 && self.svm.min_nu <= 1.0) {
            return invalid("svm.min_nu must be in (0, 1]");
        }
        if let Gamma::Value(g) = self.svm.gamma {
            if !(g > 0.0) {
                return invalid("svm.gamma must be positive");
            }
        }
        let ae = &self.autoencoder;
        if ae.hidden_layers.is_empty() || ae.hidden_layers.contains(&0) {
            return invalid("autoencoder.hidden_layers must be non-empty and positive");
        }
        if ae.batch_size == 0 || ae.epochs == 0 {
            return invalid("autoencoder.batch_size and epochs must be positive");
        }
        if !(0.0..1.0).contains(&ae.validation_split) {
            return invalid("autoencoder.validation_split must be in [0, 1)");
        }
        if !(0.0..=100.0).contains(&ae.threshold_percentile) {
            return invalid("autoencoder.threshold_percentile must be in [0, 100]");
        }
        if self.pipeline.workers == 0 {
            return invalid("pipeline.workers must be positive");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                dataset_path: PathBuf::from("data/creditcard.csv"),
                output_path: PathBuf::from("output/fraud_predictions.csv"),
                artifacts_dir: PathBuf::from("output"),
            },
            split: SplitConfig {
                test_fraction: 0.20,
                seed: 42,
            },
            isolation_forest: IsolationForestConfig {
                n_estimators: 100,
                max_samples: default_max_samples(),
            },
            svm: SvmConfig {
                kernel: SvmKernel::Rbf,
                gamma: Gamma::default(),
                max_train_samples: default_max_train_samples(),
                min_nu: default_min_nu(),
                tol: default_svm_tol(),
                max_iter: default_svm_max_iter(),
            },
            autoencoder: AutoencoderConfig {
                hidden_layers: vec![16, 8, 16],
                epochs: 10,
                batch_size: 256,
                learning_rate: 1e-3,
                validation_split: 0.10,
                threshold_percentile: 95.0,
            },
            pipeline: PipelineConfig {
                parallel: true,
                workers: 3,
                timeout_ms: 0,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.split.test_fraction, 0.20);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.isolation_forest.n_estimators, 100);
        assert_eq!(config.autoencoder.hidden_layers, vec![16, 8, 16]);
        assert_eq!(config.autoencoder.threshold_percentile, 95.0);
        assert_eq!(config.svm.kernel, SvmKernel::Rbf);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let mut config = AppConfig::default();
        config.split.test_fraction = 1.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[data]
dataset_path = "in.csv"
output_path = "out/preds.csv"
artifacts_dir = "out"

[split]
test_fraction = 0.25
seed = 7

[isolation_forest]
n_estimators = 50

[svm]
kernel = "linear"
gamma = 0.5

[autoencoder]
hidden_layers = [16, 8, 16]
epochs = 3
batch_size = 64
learning_rate = 0.001
validation_split = 0.1
threshold_percentile = 90.0

[pipeline]
parallel = false
workers = 1
timeout_ms = 0

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.svm.kernel, SvmKernel::Linear);
        assert_eq!(config.svm.gamma, Gamma::Value(0.5));
        assert_eq!(config.isolation_forest.max_samples, 256);
        assert_eq!(config.autoencoder.epochs, 3);
        assert!(!config.pipeline.parallel);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[data]
dataset_path = "in.csv"
output_path = "out/preds.csv"
artifacts_dir = "out"

[split]
test_fraction = 0.2
seed = 42

[isolation_forest]
n_estimators = 100

[svm]

[autoencoder]
hidden_layers = [16, 8, 16]
epochs = 10
batch_size = 256
learning_rate = 0.001
validation_split = 0.1
threshold_percentile = 95.0

[pipeline]
parallel = true
workers = 3
timeout_ms = 0

[logging]
level = "info"
format = "pretty"
"#
        )
        .unwrap();

        std::env::set_var("FRAUD__AUTOENCODER__THRESHOLD_PERCENTILE", "97.5");
        let config = AppConfig::load_from_path(file.path());
        std::env::remove_var("FRAUD__AUTOENCODER__THRESHOLD_PERCENTILE");

        let config = config.unwrap();
        assert_eq!(config.autoencoder.threshold_percentile, 97.5);
        assert_eq!(config.split.seed, 42);
    }
}
