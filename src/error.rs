//! Error taxonomy for the benchmark pipeline

use thiserror::Error;

/// Errors raised by pipeline stages.
///
/// `MissingColumn` and `AllTrainersFailed` abort the run. `Training` is scoped
/// to a single model, `Evaluation` is downgraded to a placeholder metric, and
/// `Export` only fails the export step.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required column `{0}` in input table")]
    MissingColumn(String),

    #[error("{model} training failed: {reason}")]
    Training { model: String, reason: String },

    #[error("metric `{metric}` is undefined: {reason}")]
    Evaluation { metric: String, reason: String },

    #[error("export to {path} failed: {reason}")]
    Export { path: String, reason: String },

    #[error("all trainers failed, no comparison table produced")]
    AllTrainersFailed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse value `{value}` in column `{column}` at row {row}")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Training {
            model: model.into(),
            reason: reason.into(),
        }
    }

    pub fn export(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        PipelineError::Export {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::MissingColumn("Amount".to_string());
        assert_eq!(err.to_string(), "missing required column `Amount` in input table");

        let err = PipelineError::training("One-Class SVM", "kernel produced NaN");
        assert_eq!(err.to_string(), "One-Class SVM training failed: kernel produced NaN");
    }
}
