//! Stratified train/test partitioning

use crate::error::{PipelineError, Result};
use crate::types::transaction::{LabeledDataset, NON_FRAUD};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

/// Disjoint train/test partitions plus the training contamination ratio
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<u8>,
    pub y_test: Array1<u8>,
    /// Fraud count in the training split divided by its size
    pub contamination: f64,
}

impl DatasetSplit {
    /// Training rows labeled non-fraud
    pub fn normal_training_rows(&self) -> Array2<f64> {
        let idx: Vec<usize> = self
            .y_train
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| (l == NON_FRAUD).then_some(i))
            .collect();
        self.x_train.select(Axis(0), &idx)
    }

    pub fn n_features(&self) -> usize {
        self.x_train.ncols()
    }
}

/// Fraud fraction of a label vector, 0 when empty
pub fn contamination_ratio(labels: &Array1<u8>) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    labels.iter().map(|&l| l as usize).sum::<usize>() as f64 / labels.len() as f64
}

/// Split with class proportions preserved in both partitions.
///
/// The test set holds `ceil(test_fraction * n)` rows. Each class contributes
/// its proportional share, with leftover rows going to the classes with the
/// largest fractional share. Row order inside each partition is shuffled.
pub fn stratified_split(
    dataset: &LabeledDataset,
    test_fraction: f64,
    seed: u64,
) -> Result<DatasetSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test fraction {test_fraction} outside (0, 1)"
        )));
    }

    let n = dataset.len();
    let n_test = ((test_fraction * n as f64) - 1e-9).ceil().max(0.0) as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot split {n} rows with test fraction {test_fraction}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut classes: Vec<(u8, Vec<usize>)> = Vec::new();
    for (i, &label) in dataset.labels.iter().enumerate() {
        match classes.iter_mut().find(|(l, _)| *l == label) {
            Some((_, rows)) => rows.push(i),
            None => classes.push((label, vec![i])),
        }
    }
    classes.sort_by_key(|(l, _)| *l);

    let allocation = allocate_test_rows(
        &classes.iter().map(|(_, rows)| rows.len()).collect::<Vec<_>>(),
        n_test,
    );

    let mut train_idx = Vec::with_capacity(n - n_test);
    let mut test_idx = Vec::with_capacity(n_test);
    for ((_, rows), take) in classes.iter_mut().zip(allocation) {
        rows.shuffle(&mut rng);
        test_idx.extend_from_slice(&rows[..take]);
        train_idx.extend_from_slice(&rows[take..]);
    }
    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    let y_train = dataset.labels.select(Axis(0), &train_idx);
    let y_test = dataset.labels.select(Axis(0), &test_idx);
    let contamination = contamination_ratio(&y_train);

    info!(
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        train_fraud = y_train.iter().filter(|&&l| l != NON_FRAUD).count(),
        test_fraud = y_test.iter().filter(|&&l| l != NON_FRAUD).count(),
        contamination = contamination,
        "Stratified split complete"
    );

    Ok(DatasetSplit {
        feature_names: dataset.feature_names.clone(),
        x_train: dataset.features.select(Axis(0), &train_idx),
        x_test: dataset.features.select(Axis(0), &test_idx),
        y_train,
        y_test,
        contamination,
    })
}

/// Per-class test row counts summing to `n_test`
fn allocate_test_rows(class_counts: &[usize], n_test: usize) -> Vec<usize> {
    let n: usize = class_counts.iter().sum();
    let mut allocation: Vec<usize> = class_counts.iter().map(|&c| c * n_test / n).collect();
    let mut remainders: Vec<(usize, usize)> = class_counts
        .iter()
        .enumerate()
        .map(|(i, &c)| (i, c * n_test % n))
        .collect();
    // stable: equal remainders keep class order
    remainders.sort_by(|a, b| b.1.cmp(&a.1));

    let mut missing = n_test - allocation.iter().sum::<usize>();
    for (i, _) in remainders.iter().cycle() {
        if missing == 0 {
            break;
        }
        if allocation[*i] < class_counts[*i] {
            allocation[*i] += 1;
            missing -= 1;
        }
    }
    allocation
}
