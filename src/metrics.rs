//! Classification metrics for evaluating fraud detectors.
//!
//! Zero-division convention: precision, recall and F1 are reported as 0.0
//! when their denominator is zero. ROC-AUC is NaN when the true labels hold a
//! single class. Each such case is surfaced as an `Evaluation` error by
//! [`ClassificationMetrics::undefined_metrics`] rather than failing the run.
//!
//! ROC-AUC is scored from hard 0/1 predictions, which reduces it to
//! `(TPR + TNR) / 2`, so it does not carry its usual ranking interpretation.

use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1};
use serde::Serialize;

/// Confusion matrix for binary fraud labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: ArrayView1<u8>, y_pred: ArrayView1<u8>) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Rows are actual (Non-Fraud, Fraud), columns predicted
    pub fn as_matrix(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    fn ratio(num: usize, denom: usize) -> Option<f64> {
        (denom > 0).then(|| num as f64 / denom as f64)
    }

    pub fn precision(&self) -> Option<f64> {
        Self::ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> Option<f64> {
        Self::ratio(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> Option<f64> {
        Self::ratio(self.tn, self.tn + self.fp)
    }
}

/// Metrics reported per model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationMetrics {
    /// Score predicted labels against true labels
    pub fn from_predictions(y_true: ArrayView1<u8>, y_pred: ArrayView1<u8>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::Evaluation {
                metric: "all".to_string(),
                reason: format!(
                    "{} true labels but {} predictions",
                    y_true.len(),
                    y_pred.len()
                ),
            });
        }
        if let Some(&bad) = y_true.iter().chain(y_pred.iter()).find(|&&v| v > 1) {
            return Err(PipelineError::Evaluation {
                metric: "all".to_string(),
                reason: format!("label {bad} is not 0 or 1"),
            });
        }

        let confusion = ConfusionMatrix::from_predictions(y_true, y_pred);
        let precision = confusion.precision().unwrap_or(0.0);
        let recall = confusion.recall().unwrap_or(0.0);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let scores: Array1<f64> = y_pred.mapv(f64::from);
        let roc_auc = roc_auc(y_true, scores.view());

        Ok(Self {
            precision,
            recall,
            f1,
            roc_auc,
            confusion,
        })
    }

    /// Metrics that fell back to a placeholder value
    pub fn undefined_metrics(&self) -> Vec<PipelineError> {
        let cm = &self.confusion;
        let mut undefined = Vec::new();
        if cm.precision().is_none() {
            undefined.push(PipelineError::Evaluation {
                metric: "precision".to_string(),
                reason: "no positive predictions, reported as 0".to_string(),
            });
        }
        if cm.recall().is_none() {
            undefined.push(PipelineError::Evaluation {
                metric: "recall".to_string(),
                reason: "no fraud rows in the test set, reported as 0".to_string(),
            });
        }
        if cm.precision().unwrap_or(0.0) + cm.recall().unwrap_or(0.0) == 0.0 {
            undefined.push(PipelineError::Evaluation {
                metric: "f1".to_string(),
                reason: "precision and recall are both 0, reported as 0".to_string(),
            });
        }
        if self.roc_auc.is_nan() {
            undefined.push(PipelineError::Evaluation {
                metric: "roc_auc".to_string(),
                reason: "true labels contain a single class, reported as NaN".to_string(),
            });
        }
        undefined
    }
}

/// Area under the ROC curve via the Mann-Whitney U statistic.
///
/// Tied scores receive their average rank. NaN when either class is absent.
pub fn roc_auc(y_true: ArrayView1<u8>, scores: ArrayView1<f64>) -> f64 {
    let n_pos = y_true.iter().filter(|&&t| t == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(y_true.iter())
        .map(|(&s, &t)| (s, t == 1))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        // ranks are 1-based: i+1 ..= j
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let positives = pairs[i..j].iter().filter(|(_, p)| *p).count();
        pos_rank_sum += avg_rank * positives as f64;
        i = j;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_confusion_matrix() {
        let y_true = array![1u8, 1, 0, 0, 0, 1];
        let y_pred = array![1u8, 0, 0, 1, 0, 1];
        let cm = ConfusionMatrix::from_predictions(y_true.view(), y_pred.view());

        assert_eq!(cm, ConfusionMatrix { tn: 2, fp: 1, fn_: 1, tp: 2 });
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.as_matrix(), [[2, 1], [1, 2]]);
    }

    #[test]
    fn test_metrics_values() {
        let y_true = array![1u8, 1, 0, 0, 0, 1];
        let y_pred = array![1u8, 0, 0, 1, 0, 1];
        let m = ClassificationMetrics::from_predictions(y_true.view(), y_pred.view()).unwrap();

        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
        // (TPR + TNR) / 2 = (2/3 + 2/3) / 2
        assert!((m.roc_auc - 2.0 / 3.0).abs() < 1e-12);
        assert!(m.undefined_metrics().is_empty());
    }

    #[test]
    fn test_hard_label_auc_is_balanced_accuracy() {
        let y_true = array![0u8, 0, 0, 0, 1, 1];
        let y_pred = array![0u8, 0, 0, 1, 1, 0];
        let m = ClassificationMetrics::from_predictions(y_true.view(), y_pred.view()).unwrap();
        let tpr = 0.5;
        let tnr = 0.75;
        assert!((m.roc_auc - (tpr + tnr) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions() {
        let y_true = array![0u8, 1, 0, 1];
        let y_pred = array![0u8, 0, 0, 0];
        let m = ClassificationMetrics::from_predictions(y_true.view(), y_pred.view()).unwrap();

        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert!((m.roc_auc - 0.5).abs() < 1e-12);
        let undefined: Vec<String> = m
            .undefined_metrics()
            .into_iter()
            .filter_map(|e| match e {
                PipelineError::Evaluation { metric, .. } => Some(metric),
                _ => None,
            })
            .collect();
        assert_eq!(undefined, vec!["precision", "f1"]);
    }

    #[test]
    fn test_zero_f1_with_defined_precision_and_recall() {
        let y_true = array![0u8, 1, 0];
        let y_pred = array![1u8, 0, 0];
        let m = ClassificationMetrics::from_predictions(y_true.view(), y_pred.view()).unwrap();

        assert_eq!(m.f1, 0.0);
        let undefined = m.undefined_metrics();
        assert_eq!(undefined.len(), 1);
        assert!(matches!(&undefined[0], PipelineError::Evaluation { metric, .. } if metric == "f1"));
    }

    #[test]
    fn test_single_class_truth_gives_nan_auc() {
        let y_true = array![0u8, 0, 0];
        let y_pred = array![0u8, 1, 0];
        let m = ClassificationMetrics::from_predictions(y_true.view(), y_pred.view()).unwrap();

        assert!(m.roc_auc.is_nan());
        // recall, f1 and roc_auc
        assert_eq!(m.undefined_metrics().len(), 3);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let y_true = array![0u8, 1];
        let y_pred = array![0u8];
        assert!(ClassificationMetrics::from_predictions(y_true.view(), y_pred.view()).is_err());
    }

    #[test]
    fn test_roc_auc_continuous_scores() {
        let y_true = array![0u8, 0, 1, 1];
        let scores = array![0.1, 0.4, 0.35, 0.8];
        assert!((roc_auc(y_true.view(), scores.view()) - 0.75).abs() < 1e-12);

        let perfect = array![0.0, 0.1, 0.9, 1.0];
        assert_eq!(roc_auc(y_true.view(), perfect.view()), 1.0);
    }
}
