//! One-Class SVM detector
//!
//! Learns a boundary around legitimate transactions by solving the nu
//! one-class dual with SMO:
//!
//! ```text
//! min  1/2 a'Qa   s.t.  0 <= a_i <= 1,  sum(a) = nu * l
//! ```
//!
//! The decision value is `sum(a_i * K(x_i, x)) - rho`; negative values fall
//! outside the boundary and are labeled fraud.

use super::{FraudDetector, ModelKind, Trainer};
use crate::config::{AppConfig, Gamma, GammaRule, SvmKernel};
use crate::error::{PipelineError, Result};
use crate::split::DatasetSplit;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

/// Smallest curvature used in a pair update
const TAU: f64 = 1e-12;
/// Box constraint of the scaled dual
const UPPER: f64 = 1.0;

/// Kernel with resolved parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Rbf { gamma: f64 },
    Linear,
}

impl Kernel {
    pub fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            Kernel::Rbf { gamma } => {
                let sq_dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * sq_dist).exp()
            }
            Kernel::Linear => a.dot(&b),
        }
    }

    /// Resolve the configured kernel against the training matrix
    pub fn resolve(kernel: SvmKernel, gamma: Gamma, data: ArrayView2<f64>) -> Self {
        match kernel {
            SvmKernel::Linear => Kernel::Linear,
            SvmKernel::Rbf => {
                let n_features = data.ncols().max(1) as f64;
                let gamma = match gamma {
                    Gamma::Value(g) => g,
                    Gamma::Named(GammaRule::Auto) => 1.0 / n_features,
                    Gamma::Named(GammaRule::Scale) => {
                        let var = if data.is_empty() { 0.0 } else { data.var(0.0) };
                        if var > 0.0 {
                            1.0 / (n_features * var)
                        } else {
                            1.0
                        }
                    }
                };
                Kernel::Rbf { gamma }
            }
        }
    }
}

/// Dual solution of the one-class problem
#[derive(Debug, Clone)]
struct DualSolution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
    converged: bool,
}

/// SMO solver with maximal-violating-pair working set selection
#[derive(Debug, Clone, Copy)]
struct SmoSolver {
    tol: f64,
    max_iter: usize,
}

impl SmoSolver {
    fn solve(&self, q: &Array2<f64>, nu: f64) -> DualSolution {
        let l = q.nrows();
        let mut alpha = vec![0.0; l];

        let total = nu * l as f64;
        let n_full = (total.floor() as usize).min(l);
        for a in alpha.iter_mut().take(n_full) {
            *a = UPPER;
        }
        if n_full < l {
            alpha[n_full] = total - n_full as f64;
        }

        let mut grad: Vec<f64> = (0..l)
            .map(|i| {
                alpha
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| **a > 0.0)
                    .map(|(j, &a)| a * q[[i, j]])
                    .sum()
            })
            .collect();

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            // i: may increase (a_i < C) with the smallest gradient
            // j: may decrease (a_j > 0) with the largest gradient
            let mut i = usize::MAX;
            let mut g_max = f64::NEG_INFINITY;
            let mut j = usize::MAX;
            let mut g_min = f64::INFINITY;
            for t in 0..l {
                if alpha[t] < UPPER && -grad[t] > g_max {
                    g_max = -grad[t];
                    i = t;
                }
                if alpha[t] > 0.0 && -grad[t] < g_min {
                    g_min = -grad[t];
                    j = t;
                }
            }

            if i == usize::MAX || j == usize::MAX || g_max - g_min < self.tol {
                converged = true;
                break;
            }

            let quad = (q[[i, i]] + q[[j, j]] - 2.0 * q[[i, j]]).max(TAU);
            let step = ((g_max - g_min) / quad)
                .min(UPPER - alpha[i])
                .min(alpha[j]);

            if step == UPPER - alpha[i] {
                alpha[i] = UPPER;
            } else {
                alpha[i] += step;
            }
            if step == alpha[j] {
                alpha[j] = 0.0;
            } else {
                alpha[j] -= step;
            }

            for (k, g) in grad.iter_mut().enumerate() {
                *g += step * (q[[k, i]] - q[[k, j]]);
            }

            iterations += 1;
            if iterations % 10_000 == 0 {
                debug!(iterations, gap = g_max - g_min, "SMO progress");
            }
        }

        let rho = Self::compute_rho(&alpha, &grad);
        DualSolution {
            alpha,
            rho,
            iterations,
            converged,
        }
    }

    /// Average gradient over free variables, or the midpoint of the bounds
    fn compute_rho(alpha: &[f64], grad: &[f64]) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut n_free = 0usize;

        for (&a, &g) in alpha.iter().zip(grad) {
            if a >= UPPER {
                lower = lower.max(g);
            } else if a <= 0.0 {
                upper = upper.min(g);
            } else {
                free_sum += g;
                n_free += 1;
            }
        }

        if n_free > 0 {
            free_sum / n_free as f64
        } else if upper.is_finite() && lower.is_finite() {
            (upper + lower) / 2.0
        } else if upper.is_finite() {
            upper
        } else {
            lower
        }
    }
}

/// Fitted One-Class SVM
#[derive(Debug, Clone)]
pub struct OneClassSvm {
    kernel: Kernel,
    support_vectors: Array2<f64>,
    dual_coef: Array1<f64>,
    rho: f64,
}

impl OneClassSvm {
    /// Signed distance to the boundary; negative is outside
    pub fn decision_function(&self, features: ArrayView2<f64>) -> Array1<f64> {
        features
            .outer_iter()
            .map(|x| {
                self.support_vectors
                    .outer_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, &coef)| coef * self.kernel.eval(sv, x))
                    .sum::<f64>()
                    - self.rho
            })
            .collect()
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.nrows()
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }
}

impl FraudDetector for OneClassSvm {
    fn kind(&self) -> ModelKind {
        ModelKind::OneClassSvm
    }

    /// Outside the boundary → fraud (1), inside → non-fraud (0)
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<u8>> {
        Ok(self.decision_function(features).mapv(|d| u8::from(d < 0.0)))
    }
}

/// Fits a One-Class SVM on non-fraud training rows.
///
/// Fitting is cubic in the number of training rows, so at most
/// `max_train_samples` rows are used.
#[derive(Debug, Clone)]
pub struct OneClassSvmTrainer {
    pub kernel: SvmKernel,
    pub gamma: Gamma,
    pub max_train_samples: usize,
    pub min_nu: f64,
    pub tol: f64,
    pub max_iter: usize,
    pub seed: u64,
}

impl OneClassSvmTrainer {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            kernel: config.svm.kernel,
            gamma: config.svm.gamma,
            max_train_samples: config.svm.max_train_samples,
            min_nu: config.svm.min_nu,
            tol: config.svm.tol,
            max_iter: config.svm.max_iter,
            seed: config.split.seed,
        }
    }

    /// Fit on `data` with outlier fraction `nu`
    pub fn fit_svm(&self, data: ArrayView2<f64>, nu: f64) -> Result<OneClassSvm> {
        let name = ModelKind::OneClassSvm.name();
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(PipelineError::training(name, "no training rows"));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::training(name, "input contains non-finite values"));
        }

        let data = self.subsample(data);
        let nu = nu.clamp(self.min_nu, 1.0);
        let kernel = Kernel::resolve(self.kernel, self.gamma, data.view());

        let l = data.nrows();
        let mut q = Array2::zeros((l, l));
        for i in 0..l {
            for j in 0..=i {
                let k = kernel.eval(data.row(i), data.row(j));
                q[[i, j]] = k;
                q[[j, i]] = k;
            }
        }
        if q.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::training(name, "kernel matrix contains non-finite values"));
        }

        let solver = SmoSolver {
            tol: self.tol,
            max_iter: self.max_iter,
        };
        let solution = solver.solve(&q, nu);
        if !solution.converged {
            warn!(
                iterations = solution.iterations,
                "SMO reached the iteration limit before converging"
            );
        }

        let support: Vec<usize> = solution
            .alpha
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| (a > 0.0).then_some(i))
            .collect();
        let dual_coef: Array1<f64> = support.iter().map(|&i| solution.alpha[i]).collect();

        debug!(
            rows = l,
            nu,
            kernel = ?kernel,
            support_vectors = support.len(),
            iterations = solution.iterations,
            rho = solution.rho,
            "One-Class SVM solved"
        );

        Ok(OneClassSvm {
            kernel,
            support_vectors: data.select(Axis(0), &support),
            dual_coef,
            rho: solution.rho,
        })
    }

    fn subsample(&self, data: ArrayView2<f64>) -> Array2<f64> {
        if data.nrows() <= self.max_train_samples {
            return data.to_owned();
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut rows =
            rand::seq::index::sample(&mut rng, data.nrows(), self.max_train_samples).into_vec();
        rows.sort_unstable();
        info!(
            available = data.nrows(),
            used = rows.len(),
            "Sub-sampling One-Class SVM training rows"
        );
        data.select(Axis(0), &rows)
    }
}

impl Trainer for OneClassSvmTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::OneClassSvm
    }

    fn fit(&self, split: &DatasetSplit) -> Result<Box<dyn FraudDetector>> {
        let normal = split.normal_training_rows();
        info!(
            rows = normal.nrows(),
            nu = split.contamination,
            kernel = ?self.kernel,
            "Fitting One-Class SVM on non-fraud rows"
        );
        let svm = self.fit_svm(normal.view(), split.contamination)?;
        Ok(Box::new(svm))
    }
}
