//! Feedforward (multi-layer perceptron) regressor over a window
//!
//! Treats the window as a flat feature vector: dense ReLU hidden layers
//! followed by a single linear output unit.

use crate::config::ModelConfig;
use crate::error::Result;
use crate::models::training::{train_epochs, BatchTrainer};
use crate::models::{
    check_prediction_inputs, check_training_inputs, make_rng, ForecastModel, TrainingReport,
};
use log::info;
use ndarray::{Array1, Array2, ArrayD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use tokio_util::sync::CancellationToken;

/// Number of hidden dense layers
const HIDDEN_LAYERS: usize = 2;

/// Dense ReLU network with a linear output
#[derive(Debug, Clone)]
pub struct FeedForward {
    config: ModelConfig,
    name: String,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    window_len: Option<usize>,
}

impl FeedForward {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            name: format!("feedforward({}x{})", config.hidden_width, HIDDEN_LAYERS),
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            window_len: None,
        }
    }

    fn initialize_weights(&mut self, n_features: usize, rng: &mut StdRng) {
        self.weights.clear();
        self.biases.clear();

        let mut layer_sizes = vec![n_features];
        layer_sizes.extend(std::iter::repeat(self.config.hidden_width).take(HIDDEN_LAYERS));
        layer_sizes.push(1);

        for (i, pair) in layer_sizes.windows(2).enumerate() {
            let (n_in, n_out) = (pair[0], pair[1]);
            let is_output = i == layer_sizes.len() - 2;

            // He uniform ahead of ReLU, Glorot uniform for the linear output
            let limit = if is_output {
                (6.0 / (n_in + n_out) as f64).sqrt()
            } else {
                (6.0 / n_in as f64).sqrt()
            };
            let dist = Uniform::new(-limit, limit);

            self.weights
                .push(Array2::from_shape_fn((n_in, n_out), |_| dist.sample(rng)));
            self.biases.push(Array1::zeros(n_out));
        }
    }

    /// Activations per layer (input first) and pre-activations per layer
    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut z_values = Vec::with_capacity(self.weights.len());
        let last_layer = self.weights.len().saturating_sub(1);

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last_layer {
                z.mapv(|v| v.max(0.0))
            } else {
                z.clone()
            };
            z_values.push(z);
            activations.push(a);
        }

        (activations, z_values)
    }
}

impl BatchTrainer for FeedForward {
    fn batch_gradients(
        &self,
        inputs: &Array2<f64>,
        targets: &Array1<f64>,
        _rng: &mut StdRng,
    ) -> (f64, Vec<ArrayD<f64>>) {
        let n = targets.len() as f64;
        let (activations, z_values) = self.forward(inputs);

        let output = &activations[activations.len() - 1];
        let residual = output - &targets.view().insert_axis(Axis(1));
        let loss = residual.mapv(|r| r * r).sum() / n;

        // d(MSE)/d(output)
        let mut delta = residual * (2.0 / n);
        let mut layer_gradients = Vec::with_capacity(self.weights.len());

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            layer_gradients.push((grad_w, grad_b));

            if i > 0 {
                let relu_grad = z_values[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = delta.dot(&self.weights[i].t()) * &relu_grad;
            }
        }

        let gradients = layer_gradients
            .into_iter()
            .rev()
            .flat_map(|(w, b)| [w.into_dyn(), b.into_dyn()])
            .collect();

        (loss, gradients)
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        self.weights
            .iter_mut()
            .zip(self.biases.iter_mut())
            .flat_map(|(w, b)| [w.view_mut().into_dyn(), b.view_mut().into_dyn()])
            .collect()
    }
}

impl ForecastModel for FeedForward {
    fn fit(
        &mut self,
        inputs: &Array2<f64>,
        targets: &Array1<f64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<TrainingReport> {
        check_training_inputs(inputs, targets)?;
        self.window_len = None;

        let config = self.config.clone();
        let mut rng = make_rng(config.seed);
        self.initialize_weights(inputs.ncols(), &mut rng);

        info!(
            "Training {} on {} windows of {} for {} epochs",
            self.name,
            inputs.nrows(),
            inputs.ncols(),
            config.epochs
        );
        let name = self.name.clone();
        let report = train_epochs(self, &name, inputs, targets, &config, &mut rng, cancel)?;

        self.window_len = Some(inputs.ncols());
        Ok(report)
    }

    fn predict(&self, inputs: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_inputs(&self.name, self.window_len, inputs)?;

        let (activations, _) = self.forward(inputs);
        Ok(activations[activations.len() - 1].column(0).to_owned())
    }

    fn window_len(&self) -> Option<usize> {
        self.window_len
    }

    fn name(&self) -> &str {
        &self.name
    }
}
