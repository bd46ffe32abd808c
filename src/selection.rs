//! Ranking of model results by ROC-AUC

use crate::types::outcome::ModelResult;
use std::cmp::Ordering;

/// Descending by score, NaN last
fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Stable sort by `score` descending; equal scores keep their input order
pub fn rank_by<T>(mut items: Vec<T>, score: impl Fn(&T) -> f64) -> Vec<T> {
    items.sort_by(|a, b| descending_nan_last(score(a), score(b)));
    items
}

/// Model results ordered best first
#[derive(Debug)]
pub struct ComparisonTable {
    rows: Vec<ModelResult>,
}

impl ComparisonTable {
    /// Rank results given in evaluation order
    pub fn from_results(results: Vec<ModelResult>) -> Self {
        Self {
            rows: rank_by(results, |r| r.metrics.roc_auc),
        }
    }

    pub fn rows(&self) -> &[ModelResult] {
        &self.rows
    }

    /// Highest ROC-AUC model, `None` when the table is empty
    pub fn best(&self) -> Option<&ModelResult> {
        self.rows.first()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
