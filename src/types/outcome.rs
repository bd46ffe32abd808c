//! Per-model outcomes of a benchmark run

use crate::metrics::ClassificationMetrics;
use crate::models::{FraudDetector, ModelKind};
use ndarray::Array1;
use std::fmt;
use std::time::Duration;

/// Result of fitting, predicting and scoring one model on the test split
pub struct ModelResult {
    pub kind: ModelKind,
    /// Predicted labels over the test set, in test row order
    pub predictions: Array1<u8>,
    pub metrics: ClassificationMetrics,
    /// Wall time spent fitting
    pub fit_duration: Duration,
    /// The fitted model, so exports can re-score without dispatching on name
    pub detector: Box<dyn FraudDetector>,
}

impl ModelResult {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl fmt::Debug for ModelResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelResult")
            .field("kind", &self.kind)
            .field("metrics", &self.metrics)
            .field("fit_duration", &self.fit_duration)
            .finish_non_exhaustive()
    }
}

/// A trainer that did not produce a result
#[derive(Debug, Clone)]
pub struct ModelFailure {
    pub kind: ModelKind,
    pub error: String,
}
