//! Isolation Forest detector
//!
//! Anomalies are isolated by fewer random axis-aligned splits, so their
//! average path length across the ensemble is shorter.

use super::{percentile, FraudDetector, ModelKind, Trainer};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::split::DatasetSplit;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Euler-Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// A node in an isolation tree
#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

/// Single isolation tree
#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    /// Build a tree over the given row indices
    fn build(data: ArrayView2<f64>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::build_node(data, rows, 0, max_depth, rng),
        }
    }

    fn build_node(
        data: ArrayView2<f64>,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> IsolationNode {
        if depth >= max_depth || rows.len() <= 1 {
            return IsolationNode::Leaf { size: rows.len() };
        }

        let feature = rng.gen_range(0..data.ncols());
        let (min_val, max_val) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &r| {
            let v = data[[r, feature]];
            (acc.0.min(v), acc.1.max(v))
        });

        if max_val - min_val < 1e-12 {
            return IsolationNode::Leaf { size: rows.len() };
        }

        let size = rows.len();
        let threshold = rng.gen_range(min_val..max_val);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| data[[r, feature]] < threshold);

        if left_rows.is_empty() || right_rows.is_empty() {
            return IsolationNode::Leaf { size };
        }

        let left = Self::build_node(data, left_rows, depth + 1, max_depth, rng);
        let right = Self::build_node(data, right_rows, depth + 1, max_depth, rng);

        IsolationNode::Internal {
            feature,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn path_length(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationNode::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted Isolation Forest
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sub_sample_size: usize,
    /// Scores strictly above this are outliers
    threshold: f64,
}

impl IsolationForest {
    /// Anomaly score in (0, 1]; higher is more anomalous
    pub fn score_samples(&self, data: ArrayView2<f64>) -> Array1<f64> {
        let c = average_path_length(self.sub_sample_size);
        data.outer_iter()
            .map(|sample| {
                let avg_path = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(sample))
                    .sum::<f64>()
                    / self.trees.len() as f64;
                if c > 0.0 {
                    2.0_f64.powf(-avg_path / c)
                } else {
                    0.5
                }
            })
            .collect()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl FraudDetector for IsolationForest {
    fn kind(&self) -> ModelKind {
        ModelKind::IsolationForest
    }

    /// Outlier → fraud (1), inlier → non-fraud (0)
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<u8>> {
        Ok(self
            .score_samples(features)
            .mapv(|s| u8::from(s > self.threshold)))
    }
}

/// Fits an Isolation Forest on all training rows, labels unused
#[derive(Debug, Clone)]
pub struct IsolationForestTrainer {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl IsolationForestTrainer {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            max_samples: 256,
            seed,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            n_estimators: config.isolation_forest.n_estimators,
            max_samples: config.isolation_forest.max_samples,
            seed: config.split.seed,
        }
    }

    /// Fit on `data` with the given expected outlier fraction
    pub fn fit_forest(&self, data: ArrayView2<f64>, contamination: f64) -> Result<IsolationForest> {
        let name = ModelKind::IsolationForest.name();
        let n_samples = data.nrows();
        if n_samples < 2 || data.ncols() == 0 {
            return Err(PipelineError::training(name, "need at least two rows and one feature"));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::training(name, "input contains non-finite values"));
        }
        let all_constant = data
            .columns()
            .into_iter()
            .all(|col| col.iter().all(|&v| (v - col[0]).abs() < 1e-12));
        if all_constant {
            return Err(PipelineError::training(name, "all features have zero variance"));
        }

        let sub_sample_size = self.max_samples.min(n_samples);
        let max_depth = (sub_sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, n_samples, sub_sample_size).into_vec();
                IsolationTree::build(data, rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            sub_sample_size,
            threshold: f64::INFINITY,
        };

        let scores = forest.score_samples(data).to_vec();
        forest.threshold = percentile(&scores, 100.0 * (1.0 - contamination.clamp(0.0, 1.0)));

        debug!(
            trees = forest.trees.len(),
            sub_sample_size,
            max_depth,
            threshold = forest.threshold,
            "Isolation forest built"
        );

        Ok(forest)
    }
}

impl Trainer for IsolationForestTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::IsolationForest
    }

    fn fit(&self, split: &DatasetSplit) -> Result<Box<dyn FraudDetector>> {
        info!(
            rows = split.x_train.nrows(),
            n_estimators = self.n_estimators,
            contamination = split.contamination,
            "Fitting Isolation Forest"
        );
        let forest = self.fit_forest(split.x_train.view(), split.contamination)?;
        Ok(Box::new(forest))
    }
}
