//! Reconstruction-error detector built on a dense autoencoder.
//!
//! The network is trained on legitimate transactions only. At inference a row
//! whose mean squared reconstruction error exceeds the calibrated threshold is
//! labeled fraud.
//!
//! The threshold is the configured percentile of reconstruction error over
//! the *test* rows whose true label is non-fraud. That leaks test labels into
//! the decision rule, so reported metrics for this model are optimistic and
//! the calibration must not be reused for production scoring.

use super::{percentile, FraudDetector, ModelKind, Trainer};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::split::DatasetSplit;
use crate::types::transaction::NON_FRAUD;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::Serialize;
use tracing::{info, warn};

/// Layer activation functions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Tanh,
    Linear,
}

impl Activation {
    fn forward(&self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }

    /// Derivative with respect to the pre-activation value
    fn derivative(&self, z: f64) -> f64 {
        match self {
            Activation::Tanh => 1.0 - z.tanh().powi(2),
            Activation::Linear => 1.0,
        }
    }
}

/// Adam moment estimates for one layer
#[derive(Debug, Clone)]
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl Adam {
    fn new(learning_rate: f64, weight_dim: (usize, usize)) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m_w: Array2::zeros(weight_dim),
            v_w: Array2::zeros(weight_dim),
            m_b: Array1::zeros(weight_dim.1),
            v_b: Array1::zeros(weight_dim.1),
        }
    }

    fn step(
        &mut self,
        weights: &mut Array2<f64>,
        biases: &mut Array1<f64>,
        grad_w: &Array2<f64>,
        grad_b: &Array1<f64>,
    ) {
        self.t += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(self.t);
        let correction2 = 1.0 - b2.powi(self.t);
        let lr = self.learning_rate;
        let eps = self.epsilon;

        self.m_w.zip_mut_with(grad_w, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
        self.v_w.zip_mut_with(grad_w, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
        ndarray::Zip::from(weights)
            .and(&self.m_w)
            .and(&self.v_w)
            .for_each(|w, &m, &v| {
                *w -= lr * (m / correction1) / ((v / correction2).sqrt() + eps);
            });

        self.m_b.zip_mut_with(grad_b, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
        self.v_b.zip_mut_with(grad_b, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
        ndarray::Zip::from(biases)
            .and(&self.m_b)
            .and(&self.v_b)
            .for_each(|b, &m, &v| {
                *b -= lr * (m / correction1) / ((v / correction2).sqrt() + eps);
            });
    }
}

/// Fully connected layer operating on row batches
#[derive(Debug, Clone)]
struct DenseLayer {
    /// (input_size x output_size)
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
    optimizer: Adam,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero biases
    fn new(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        learning_rate: f64,
        rng: &mut StdRng,
    ) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = Array2::from_shape_fn((input_size, output_size), |_| dist.sample(&mut *rng));

        Self {
            weights,
            biases: Array1::zeros(output_size),
            activation,
            optimizer: Adam::new(learning_rate, (input_size, output_size)),
        }
    }

    fn pre_activation(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.biases
    }

    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let activation = self.activation;
        self.pre_activation(input).mapv(|z| activation.forward(z))
    }

    /// Apply one optimizer step and return the gradient for the layer input
    fn backward(&mut self, input: &Array2<f64>, z: &Array2<f64>, grad_output: &Array2<f64>) -> Array2<f64> {
        let activation = self.activation;
        let delta = grad_output * &z.mapv(|v| activation.derivative(v));

        let grad_w = input.t().dot(&delta);
        let grad_b = delta.sum_axis(Axis(0));
        let grad_input = delta.dot(&self.weights.t());

        self.optimizer
            .step(&mut self.weights, &mut self.biases, &grad_w, &grad_b);
        grad_input
    }
}

/// Dense encoder/decoder network
#[derive(Debug, Clone)]
pub struct Autoencoder {
    layers: Vec<DenseLayer>,
    input_size: usize,
}

impl Autoencoder {
    /// Hidden layers use tanh; the output layer is linear and matches the input width
    pub fn new(input_size: usize, hidden_layers: &[usize], learning_rate: f64, rng: &mut StdRng) -> Self {
        let mut layers = Vec::with_capacity(hidden_layers.len() + 1);
        let mut prev = input_size;
        for &width in hidden_layers {
            layers.push(DenseLayer::new(prev, width, Activation::Tanh, learning_rate, rng));
            prev = width;
        }
        layers.push(DenseLayer::new(prev, input_size, Activation::Linear, learning_rate, rng));

        Self { layers, input_size }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Layer widths from input to output
    pub fn layer_sizes(&self) -> Vec<usize> {
        std::iter::once(self.input_size)
            .chain(self.layers.iter().map(|l| l.biases.len()))
            .collect()
    }

    pub fn reconstruct(&self, input: &Array2<f64>) -> Array2<f64> {
        self.layers
            .iter()
            .fold(input.clone(), |x, layer| layer.forward(&x))
    }

    /// Mean squared error per row
    pub fn reconstruction_errors(&self, input: ArrayView2<f64>) -> Array1<f64> {
        let input = input.to_owned();
        let output = self.reconstruct(&input);
        let n_features = input.ncols().max(1) as f64;
        (&output - &input)
            .mapv(|d| d * d)
            .sum_axis(Axis(1))
            .mapv(|s| s / n_features)
    }

    /// Mean squared error over all entries
    pub fn loss(&self, input: &Array2<f64>) -> f64 {
        if input.is_empty() {
            return f64::NAN;
        }
        let output = self.reconstruct(input);
        (&output - input).mapv(|d| d * d).mean().unwrap_or(f64::NAN)
    }

    /// One optimizer step on a mini-batch; returns the batch loss before the step
    fn train_batch(&mut self, batch: &Array2<f64>) -> f64 {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());

        let mut activation = batch.clone();
        for layer in &self.layers {
            let z = layer.pre_activation(&activation);
            let next = z.mapv(|v| layer.activation.forward(v));
            inputs.push(activation);
            pre_activations.push(z);
            activation = next;
        }

        let diff = &activation - batch;
        let loss = diff.mapv(|d| d * d).mean().unwrap_or(f64::NAN);
        let mut grad = diff * (2.0 / batch.len() as f64);

        for (layer, (input, z)) in self
            .layers
            .iter_mut()
            .zip(inputs.iter().zip(pre_activations.iter()))
            .rev()
        {
            grad = layer.backward(input, z, &grad);
        }

        loss
    }
}

/// Per-epoch loss trace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    /// Empty when no validation rows were held out
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn final_train_loss(&self) -> Option<f64> {
        self.train_loss.last().copied()
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.val_loss.last().copied()
    }
}

/// Trained autoencoder with its calibrated threshold
#[derive(Debug, Clone)]
pub struct AutoencoderDetector {
    network: Autoencoder,
    threshold: f64,
    history: TrainingHistory,
}

impl AutoencoderDetector {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn network(&self) -> &Autoencoder {
        &self.network
    }
}

impl FraudDetector for AutoencoderDetector {
    fn kind(&self) -> ModelKind {
        ModelKind::Autoencoder
    }

    /// Error above threshold → fraud (1)
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<u8>> {
        Ok(self
            .network
            .reconstruction_errors(features)
            .mapv(|e| u8::from(e > self.threshold)))
    }

    fn training_history(&self) -> Option<&TrainingHistory> {
        Some(&self.history)
    }
}

/// Percentile of reconstruction error over the rows labeled non-fraud
pub fn calibrate_threshold(errors: ArrayView1<f64>, labels: ArrayView1<u8>, q: f64) -> Result<f64> {
    let normal: Vec<f64> = errors
        .iter()
        .zip(labels.iter())
        .filter_map(|(&e, &l)| (l == NON_FRAUD).then_some(e))
        .collect();
    if normal.is_empty() {
        return Err(PipelineError::training(
            ModelKind::Autoencoder.name(),
            "no non-fraud rows to calibrate the threshold",
        ));
    }
    Ok(percentile(&normal, q))
}

/// Trains the autoencoder on non-fraud training rows
#[derive(Debug, Clone)]
pub struct AutoencoderTrainer {
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub threshold_percentile: f64,
    pub seed: u64,
}

impl AutoencoderTrainer {
    pub fn from_config(config: &AppConfig) -> Self {
        let ae = &config.autoencoder;
        Self {
            hidden_layers: ae.hidden_layers.clone(),
            epochs: ae.epochs,
            batch_size: ae.batch_size,
            learning_rate: ae.learning_rate,
            validation_split: ae.validation_split,
            threshold_percentile: ae.threshold_percentile,
            seed: config.split.seed,
        }
    }

    /// Fit the network. The trailing `validation_split` share of rows is held
    /// out before shuffling; training rows are reshuffled every epoch.
    pub fn train(&self, data: ArrayView2<f64>) -> Result<(Autoencoder, TrainingHistory)> {
        let name = ModelKind::Autoencoder.name();
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(PipelineError::training(name, "no training rows"));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut network = Autoencoder::new(data.ncols(), &self.hidden_layers, self.learning_rate, &mut rng);

        let split_at = ((data.nrows() as f64) * (1.0 - self.validation_split)) as usize;
        let split_at = split_at.clamp(1, data.nrows());
        let train = data.slice(ndarray::s![..split_at, ..]);
        let validation = data.slice(ndarray::s![split_at.., ..]).to_owned();

        let mut order: Vec<usize> = (0..train.nrows()).collect();
        let mut history = TrainingHistory::default();

        for epoch in 0..self.epochs {
            order.shuffle(&mut rng);

            let mut weighted_loss = 0.0;
            for chunk in order.chunks(self.batch_size) {
                let batch = train.select(Axis(0), chunk);
                weighted_loss += network.train_batch(&batch) * chunk.len() as f64;
            }
            let train_loss = weighted_loss / train.nrows() as f64;
            if !train_loss.is_finite() {
                return Err(PipelineError::training(
                    name,
                    format!("loss diverged at epoch {}", epoch + 1),
                ));
            }
            history.train_loss.push(train_loss);

            let val_loss = if validation.nrows() > 0 {
                let loss = network.loss(&validation);
                history.val_loss.push(loss);
                Some(loss)
            } else {
                None
            };

            info!(
                epoch = epoch + 1,
                epochs = self.epochs,
                loss = train_loss,
                val_loss = ?val_loss,
                "Autoencoder epoch complete"
            );
        }

        Ok((network, history))
    }
}

impl Trainer for AutoencoderTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::Autoencoder
    }

    fn fit(&self, split: &DatasetSplit) -> Result<Box<dyn FraudDetector>> {
        let normal = split.normal_training_rows();
        info!(
            rows = normal.nrows(),
            layers = ?self.hidden_layers,
            epochs = self.epochs,
            batch_size = self.batch_size,
            "Training autoencoder on non-fraud rows"
        );

        let (network, history) = self.train(normal.view())?;

        let errors = network.reconstruction_errors(split.x_test.view());
        let threshold = calibrate_threshold(errors.view(), split.y_test.view(), self.threshold_percentile)?;
        warn!(
            percentile = self.threshold_percentile,
            threshold,
            "Autoencoder threshold calibrated on test-set labels; metrics are optimistic"
        );

        Ok(Box::new(AutoencoderDetector {
            network,
            threshold,
            history,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand_distr::Normal;

    fn trainer(epochs: usize) -> AutoencoderTrainer {
        let mut t = AutoencoderTrainer::from_config(&AppConfig::default());
        t.epochs = epochs;
        t.batch_size = 32;
        t.learning_rate = 1e-2;
        t
    }

    fn normal_rows(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Normal::new(0.0, 0.5).unwrap();
        Array2::from_shape_fn((n, d), |_| dist.sample(&mut rng))
    }

    #[test]
    fn test_threshold_is_percentile_of_normal_rows() {
        // normal errors 1..=21 interleaved with large fraud errors
        let mut errors = Vec::new();
        let mut labels = Vec::new();
        for v in 1..=21 {
            errors.push(v as f64);
            labels.push(0u8);
            errors.push(1000.0);
            labels.push(1u8);
        }
        let threshold = calibrate_threshold(
            Array1::from(errors).view(),
            Array1::from(labels).view(),
            95.0,
        )
        .unwrap();
        assert!((threshold - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_needs_normal_rows() {
        let err = calibrate_threshold(array![1.0, 2.0].view(), array![1u8, 1].view(), 95.0);
        assert!(err.is_err());
    }

    #[test]
    fn test_architecture() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = Autoencoder::new(30, &[16, 8, 16], 1e-3, &mut rng);
        assert_eq!(net.layer_sizes(), vec![30, 16, 8, 16, 30]);
        assert_eq!(net.layers.last().unwrap().activation, Activation::Linear);
        assert!(net.layers[..3].iter().all(|l| l.activation == Activation::Tanh));
    }

    #[test]
    fn test_training_reduces_loss() {
        let data = normal_rows(400, 6, 1);
        let (_, history) = trainer(15).train(data.view()).unwrap();

        assert_eq!(history.epochs(), 15);
        assert_eq!(history.val_loss.len(), 15);
        let first = history.train_loss[0];
        let last = history.final_train_loss().unwrap();
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = normal_rows(120, 4, 2);
        let (a, ha) = trainer(3).train(data.view()).unwrap();
        let (b, hb) = trainer(3).train(data.view()).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(
            a.reconstruction_errors(data.view()),
            b.reconstruction_errors(data.view())
        );
    }

    #[test]
    fn test_outlier_reconstructs_worse() {
        let data = normal_rows(400, 6, 3);
        let (net, _) = trainer(20).train(data.view()).unwrap();

        let probe = array![[0.0, 0.0, 0.0, 0.0, 0.0, 0.0], [6.0, -6.0, 6.0, -6.0, 6.0, -6.0]];
        let errors = net.reconstruction_errors(probe.view());
        assert!(errors[1] > errors[0]);
    }

    #[test]
    fn test_divergence_is_training_error() {
        let data = normal_rows(100, 4, 5);
        let mut t = trainer(2);
        t.learning_rate = 1e200;

        let err = t.train(data.view()).unwrap_err();
        match err {
            PipelineError::Training { model, reason } => {
                assert_eq!(model, "Autoencoder");
                assert!(reason.contains("diverged at epoch 1"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_detector_labels_binary() {
        let data = normal_rows(100, 3, 4);
        let (network, history) = trainer(2).train(data.view()).unwrap();
        let detector = AutoencoderDetector {
            network,
            threshold: 0.1,
            history,
        };
        let labels = detector.predict(data.view()).unwrap();
        assert_eq!(labels.len(), 100);
        assert!(labels.iter().all(|&l| l <= 1));
        assert!(detector.training_history().is_some());
    }
}
