//! Console report: per-model metric blocks, confusion matrices and the
//! ranked comparison table

use crate::metrics::ConfusionMatrix;
use crate::models::ModelKind;
use crate::selection::ComparisonTable;
use crate::types::outcome::{ModelFailure, ModelResult};
use serde::Serialize;
use std::fmt::Write;

/// Axis labels shared by every confusion matrix rendering
pub const CLASS_LABELS: [&str; 2] = ["Non-Fraud", "Fraud"];

/// Renderable 2x2 confusion matrix for one model.
///
/// Rows are the actual class and columns the predicted class, both ordered
/// as [`CLASS_LABELS`]. Display and file output belong to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrixView {
    pub model: String,
    pub labels: [&'static str; 2],
    pub matrix: [[usize; 2]; 2],
}

impl ConfusionMatrixView {
    pub fn new(kind: ModelKind, confusion: &ConfusionMatrix) -> Self {
        Self {
            model: kind.name().to_string(),
            labels: CLASS_LABELS,
            matrix: confusion.as_matrix(),
        }
    }

    /// Plain-text grid
    pub fn render(&self) -> String {
        let [[tn, fp], [fn_, tp]] = self.matrix;
        let mut out = String::new();
        let _ = writeln!(out, "Confusion Matrix - {}", self.model);
        let _ = writeln!(out, "{:>18} | {:>10} {:>10}", "Actual \\ Predicted", self.labels[0], self.labels[1]);
        let _ = writeln!(out, "{:->18}-+-{:->10}-{:->10}", "", "", "");
        let _ = writeln!(out, "{:>18} | {:>10} {:>10}", self.labels[0], tn, fp);
        let _ = writeln!(out, "{:>18} | {:>10} {:>10}", self.labels[1], fn_, tp);
        out
    }
}

/// Metric block printed after a model is evaluated
pub fn metric_block(result: &ModelResult) -> String {
    let m = &result.metrics;
    let mut out = String::new();
    let _ = writeln!(out, "{} Results:", result.name());
    let _ = writeln!(out, "  Precision: {:.4}", m.precision);
    let _ = writeln!(out, "  Recall:    {:.4}", m.recall);
    let _ = writeln!(out, "  F1-score:  {:.4}", m.f1);
    let _ = writeln!(out, "  ROC-AUC:   {:.4}", m.roc_auc);
    out
}

/// Ranked table of every successful model
pub fn comparison_table(table: &ComparisonTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "╔══════════════════════════════════════════════════════════════════════╗");
    let _ = writeln!(out, "║                   MODEL COMPARISON (by ROC-AUC)                      ║");
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════════════════╣");
    let _ = writeln!(
        out,
        "║ {:<18} {:>9} {:>9} {:>9} {:>9} {:>10} ║",
        "Model", "Precision", "Recall", "F1", "ROC-AUC", "Fit (s)"
    );
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════════════════╣");
    for row in table.rows() {
        let m = &row.metrics;
        let _ = writeln!(
            out,
            "║ {:<18} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>10.2} ║",
            row.name(),
            m.precision,
            m.recall,
            m.f1,
            m.roc_auc,
            row.fit_duration.as_secs_f64()
        );
    }
    let _ = writeln!(out, "╚══════════════════════════════════════════════════════════════════════╝");
    out
}

/// Full console report for a run
pub fn render(table: &ComparisonTable, failures: &[ModelFailure]) -> String {
    let mut out = String::new();

    for kind in ModelKind::ALL {
        if let Some(result) = table.rows().iter().find(|r| r.kind == kind) {
            out.push_str(&metric_block(result));
            out.push('\n');
            out.push_str(&ConfusionMatrixView::new(kind, &result.metrics.confusion).render());
            out.push('\n');
        }
    }

    for failure in failures {
        let _ = writeln!(out, "{} FAILED: {}", failure.kind.name(), failure.error);
    }
    if !failures.is_empty() {
        out.push('\n');
    }

    out.push_str(&comparison_table(table));
    if let Some(best) = table.best() {
        let _ = writeln!(out, "Best Model: {}", best.name());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::metrics::ClassificationMetrics;
    use crate::models::FraudDetector;
    use ndarray::{Array1, ArrayView2};
    use std::time::Duration;

    struct NullDetector;

    impl FraudDetector for NullDetector {
        fn kind(&self) -> ModelKind {
            ModelKind::Autoencoder
        }

        fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<u8>> {
            Ok(Array1::zeros(features.nrows()))
        }
    }

    fn result(kind: ModelKind, roc_auc: f64) -> ModelResult {
        ModelResult {
            kind,
            predictions: Array1::zeros(0),
            metrics: ClassificationMetrics {
                precision: 0.5,
                recall: 0.25,
                f1: 1.0 / 3.0,
                roc_auc,
                confusion: ConfusionMatrix {
                    tn: 90,
                    fp: 2,
                    fn_: 6,
                    tp: 2,
                },
            },
            fit_duration: Duration::from_millis(1500),
            detector: Box::new(NullDetector),
        }
    }

    #[test]
    fn test_metric_block_four_decimals() {
        let block = metric_block(&result(ModelKind::IsolationForest, 0.61234));
        assert!(block.contains("Isolation Forest Results:"));
        assert!(block.contains("Precision: 0.5000"));
        assert!(block.contains("F1-score:  0.3333"));
        assert!(block.contains("ROC-AUC:   0.6123"));
    }

    #[test]
    fn test_confusion_matrix_view() {
        let view = ConfusionMatrixView::new(
            ModelKind::OneClassSvm,
            &ConfusionMatrix {
                tn: 5,
                fp: 1,
                fn_: 2,
                tp: 3,
            },
        );
        assert_eq!(view.matrix, [[5, 1], [2, 3]]);
        assert_eq!(view.labels, ["Non-Fraud", "Fraud"]);
        let text = view.render();
        assert!(text.contains("Non-Fraud"));
        assert!(text.contains("One-Class SVM"));
    }

    #[test]
    fn test_report_lists_best_model_and_failures() {
        let table = ComparisonTable::from_results(vec![
            result(ModelKind::IsolationForest, 0.7),
            result(ModelKind::Autoencoder, 0.8),
        ]);
        let failures = vec![ModelFailure {
            kind: ModelKind::OneClassSvm,
            error: "timed out".to_string(),
        }];

        let text = render(&table, &failures);
        assert!(text.contains("Best Model: Autoencoder"));
        assert!(text.contains("One-Class SVM FAILED: timed out"));
        let ae = text.find("║ Autoencoder").unwrap();
        let iso = text.find("║ Isolation Forest").unwrap();
        assert!(ae < iso);
    }
}
