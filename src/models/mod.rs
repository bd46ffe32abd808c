//! Anomaly detection models and their shared capabilities

pub mod autoencoder;
pub mod isolation_forest;
pub mod one_class_svm;

pub use autoencoder::{AutoencoderTrainer, TrainingHistory};
pub use isolation_forest::IsolationForestTrainer;
pub use one_class_svm::OneClassSvmTrainer;

use crate::config::AppConfig;
use crate::error::Result;
use crate::split::DatasetSplit;
use ndarray::{Array1, ArrayView2};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Identifies one of the benchmarked models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    IsolationForest,
    OneClassSvm,
    Autoencoder,
}

impl ModelKind {
    /// Evaluation order, which is also the tie-break order when ranking
    pub const ALL: [ModelKind; 3] = [
        ModelKind::IsolationForest,
        ModelKind::OneClassSvm,
        ModelKind::Autoencoder,
    ];

    /// Display name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::IsolationForest => "Isolation Forest",
            ModelKind::OneClassSvm => "One-Class SVM",
            ModelKind::Autoencoder => "Autoencoder",
        }
    }

    /// File-name friendly identifier
    pub fn slug(&self) -> &'static str {
        match self {
            ModelKind::IsolationForest => "isolation_forest",
            ModelKind::OneClassSvm => "one_class_svm",
            ModelKind::Autoencoder => "autoencoder",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fitted model that labels transactions as fraud (1) or not (0)
pub trait FraudDetector: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Label every row of `features`
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<u8>>;

    /// Per-epoch loss trace, for iteratively trained models
    fn training_history(&self) -> Option<&TrainingHistory> {
        None
    }
}

/// Fits a detector from a train/test split
pub trait Trainer: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn fit(&self, split: &DatasetSplit) -> Result<Box<dyn FraudDetector>>;
}

/// The three trainers in evaluation order
pub fn default_trainers(config: &AppConfig) -> Vec<Arc<dyn Trainer>> {
    vec![
        Arc::new(IsolationForestTrainer::from_config(config)),
        Arc::new(OneClassSvmTrainer::from_config(config)),
        Arc::new(AutoencoderTrainer::from_config(config)),
    ]
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in [0, 100]. Returns NaN for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values: Vec<f64> = (1..=21).map(|v| v as f64).collect();
        // rank = 0.95 * 20 = 19 -> 20.0
        assert!((percentile(&values, 95.0) - 20.0).abs() < 1e-12);

        let values = [0.0, 10.0];
        assert!((percentile(&values, 95.0) - 9.5).abs() < 1e-12);
        assert!((percentile(&values, 50.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_unsorted_input_and_bounds() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 3.0);
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_model_kind_names() {
        assert_eq!(ModelKind::OneClassSvm.to_string(), "One-Class SVM");
        assert_eq!(ModelKind::Autoencoder.slug(), "autoencoder");
        assert_eq!(ModelKind::ALL[0], ModelKind::IsolationForest);
    }
}
