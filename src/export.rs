//! Writers for run artifacts: best-model predictions, confusion matrices and
//! the run summary

use crate::error::{PipelineError, Result};
use crate::models::{ModelKind, TrainingHistory};
use crate::report::ConfusionMatrixView;
use crate::selection::ComparisonTable;
use crate::split::DatasetSplit;
use crate::types::outcome::{ModelFailure, ModelResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const ACTUAL_COLUMN: &str = "Actual_Fraud";
pub const PREDICTED_COLUMN: &str = "Predicted_Fraud";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::export(parent, e))?;
    }
    Ok(())
}

/// Write the test features with actual and predicted labels, one row per
/// test transaction. Labels are recomputed through the model's own detector.
pub fn write_predictions(path: &Path, split: &DatasetSplit, best: &ModelResult) -> Result<usize> {
    ensure_parent(path)?;
    let predicted = best.detector.predict(split.x_test.view())?;

    let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::export(path, e))?;

    let mut header: Vec<&str> = split.feature_names.iter().map(String::as_str).collect();
    header.push(ACTUAL_COLUMN);
    header.push(PREDICTED_COLUMN);
    writer
        .write_record(&header)
        .map_err(|e| PipelineError::export(path, e))?;

    for ((row, actual), predicted) in split
        .x_test
        .outer_iter()
        .zip(split.y_test.iter())
        .zip(predicted.iter())
    {
        let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        record.push(actual.to_string());
        record.push(predicted.to_string());
        writer
            .write_record(&record)
            .map_err(|e| PipelineError::export(path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::export(path, e))?;

    info!(
        path = %path.display(),
        model = %best.name(),
        rows = predicted.len(),
        "Predictions exported"
    );
    Ok(predicted.len())
}

/// One `<model>_confusion_matrix.json` per model
pub fn write_confusion_matrices(dir: &Path, table: &ComparisonTable) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::export(dir, e))?;

    table
        .rows()
        .iter()
        .map(|result| {
            let path = dir.join(format!("{}_confusion_matrix.json", result.kind.slug()));
            let view = ConfusionMatrixView::new(result.kind, &result.metrics.confusion);
            write_json(&path, &view)?;
            debug!(path = %path.display(), model = %result.name(), "Confusion matrix written");
            Ok(path)
        })
        .collect()
}

/// Metrics or failure for one model in the run summary
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub model: ModelKind,
    pub name: &'static str,
    pub rank: Option<usize>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub roc_auc: Option<f64>,
    pub fit_seconds: Option<f64>,
    pub training_history: Option<TrainingHistory>,
    pub error: Option<String>,
}

/// Machine-readable summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub n_features: usize,
    pub contamination: f64,
    pub models: Vec<ModelSummary>,
    pub best_model: Option<String>,
}

impl RunSummary {
    pub fn new(split: &DatasetSplit, table: &ComparisonTable, failures: &[ModelFailure]) -> Self {
        let mut models: Vec<ModelSummary> = Vec::new();
        for kind in ModelKind::ALL {
            if let Some((rank, r)) = table.rows().iter().enumerate().find(|(_, r)| r.kind == kind) {
                let finite = |v: f64| v.is_finite().then_some(v);
                models.push(ModelSummary {
                    model: kind,
                    name: kind.name(),
                    rank: Some(rank + 1),
                    precision: Some(r.metrics.precision),
                    recall: Some(r.metrics.recall),
                    f1: Some(r.metrics.f1),
                    roc_auc: finite(r.metrics.roc_auc),
                    fit_seconds: Some(r.fit_duration.as_secs_f64()),
                    training_history: r.detector.training_history().cloned(),
                    error: None,
                });
            } else if let Some(f) = failures.iter().find(|f| f.kind == kind) {
                models.push(ModelSummary {
                    model: kind,
                    name: kind.name(),
                    rank: None,
                    precision: None,
                    recall: None,
                    f1: None,
                    roc_auc: None,
                    fit_seconds: None,
                    training_history: None,
                    error: Some(f.error.clone()),
                });
            }
        }

        Self {
            run_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            train_rows: split.x_train.nrows(),
            test_rows: split.x_test.nrows(),
            n_features: split.n_features(),
            contamination: split.contamination,
            models,
            best_model: table.best().map(|b| b.name().to_string()),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json(path, self)?;
        info!(path = %path.display(), run_id = %self.run_id, "Run summary written");
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| PipelineError::export(path, e))?;
    serde_json::to_writer_pretty(file, value).map_err(|e| PipelineError::export(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ClassificationMetrics, ConfusionMatrix};
    use crate::models::FraudDetector;
    use ndarray::{array, Array1, ArrayView2};
    use std::time::Duration;

    struct FirstColumnDetector;

    impl FraudDetector for FirstColumnDetector {
        fn kind(&self) -> ModelKind {
            ModelKind::IsolationForest
        }

        fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<u8>> {
            Ok(features.column(0).mapv(|v| u8::from(v > 0.5)))
        }
    }

    fn split() -> DatasetSplit {
        DatasetSplit {
            feature_names: vec!["scaled_amount".into(), "V1".into()],
            x_train: array![[0.0, 0.0]],
            x_test: array![[1.0, 2.0], [0.0, 3.0], [0.9, 4.0]],
            y_train: array![0],
            y_test: array![1, 0, 0],
            contamination: 0.0,
        }
    }

    fn result() -> ModelResult {
        ModelResult {
            kind: ModelKind::IsolationForest,
            predictions: array![1, 0, 1],
            metrics: ClassificationMetrics {
                precision: 0.5,
                recall: 1.0,
                f1: 2.0 / 3.0,
                roc_auc: 0.75,
                confusion: ConfusionMatrix {
                    tn: 1,
                    fp: 1,
                    fn_: 0,
                    tp: 1,
                },
            },
            fit_duration: Duration::from_millis(10),
            detector: Box::new(FirstColumnDetector),
        }
    }

    #[test]
    fn test_write_predictions_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preds.csv");

        let rows = write_predictions(&path, &split(), &result()).unwrap();
        assert_eq!(rows, 3);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "scaled_amount,V1,Actual_Fraud,Predicted_Fraud");
        assert_eq!(lines[1], "1,2,1,1");
        assert_eq!(lines[2], "0,3,0,0");
        assert_eq!(lines[3], "0.9,4,0,1");
    }

    #[test]
    fn test_confusion_matrix_files() {
        let dir = tempfile::tempdir().unwrap();
        let table = ComparisonTable::from_results(vec![result()]);

        let paths = write_confusion_matrices(dir.path(), &table).unwrap();
        assert_eq!(paths.len(), 1);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["labels"][1], "Fraud");
        assert_eq!(json["matrix"][0][1], 1);
    }

    #[test]
    fn test_run_summary_includes_failures() {
        let table = ComparisonTable::from_results(vec![result()]);
        let failures = vec![ModelFailure {
            kind: ModelKind::Autoencoder,
            error: "diverged".to_string(),
        }];
        let summary = RunSummary::new(&split(), &table, &failures);

        assert_eq!(summary.models.len(), 2);
        assert_eq!(summary.best_model.as_deref(), Some("Isolation Forest"));
        assert_eq!(summary.models[1].error.as_deref(), Some("diverged"));
        assert_eq!(summary.test_rows, 3);
    }

    #[test]
    fn test_nan_roc_auc_is_null_in_summary() {
        let mut r = result();
        r.metrics.roc_auc = f64::NAN;
        let table = ComparisonTable::from_results(vec![r]);
        let summary = RunSummary::new(&split(), &table, &[]);

        assert_eq!(summary.models[0].roc_auc, None);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["models"][0]["roc_auc"].is_null());
        assert_eq!(json["models"][0]["precision"], 0.5);
    }

    #[test]
    fn test_unwritable_path_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = write_predictions(&blocker.join("preds.csv"), &split(), &result()).unwrap_err();
        assert!(matches!(err, PipelineError::Export { .. }));
    }
}
