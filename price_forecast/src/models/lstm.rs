//! Stacked LSTM regressor over a window
//!
//! Each window is read one time step at a time through a stack of LSTM
//! layers. Dropout is applied to every layer's output during training; the
//! final hidden state of the top layer feeds a single linear output unit.
//! Gradients are computed by backpropagation through time over the whole
//! window.

use crate::config::ModelConfig;
use crate::error::Result;
use crate::models::training::{train_epochs, BatchTrainer};
use crate::models::{
    check_prediction_inputs, check_training_inputs, make_rng, ForecastModel, TrainingReport,
};
use log::info;
use ndarray::{s, Array1, Array2, ArrayD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use tokio_util::sync::CancellationToken;

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn glorot_uniform(n_in: usize, n_out: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (n_in + n_out) as f64).sqrt();
    let dist = Uniform::new(-limit, limit);
    Array2::from_shape_fn((n_in, n_out), |_| dist.sample(rng))
}

/// One LSTM layer; gate blocks are laid out input, forget, cell, output
#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    /// (input_dim, 4 * units)
    kernel: Array2<f64>,
    /// (units, 4 * units)
    recurrent: Array2<f64>,
    bias: Array1<f64>,
}

/// Values from one forward time step needed to backpropagate through it
#[derive(Debug)]
struct StepCache {
    input: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    input_gate: Array2<f64>,
    forget_gate: Array2<f64>,
    candidate: Array2<f64>,
    output_gate: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug)]
struct LayerGradients {
    kernel: Array2<f64>,
    recurrent: Array2<f64>,
    bias: Array1<f64>,
}

impl LstmLayer {
    fn new(input_dim: usize, units: usize, rng: &mut StdRng) -> Self {
        let mut bias: Array1<f64> = Array1::zeros(4 * units);
        // Forget gate starts open
        bias.slice_mut(s![units..2 * units]).fill(1.0);

        Self {
            units,
            kernel: glorot_uniform(input_dim, 4 * units, rng),
            recurrent: glorot_uniform(units, 4 * units, rng),
            bias,
        }
    }

    /// Hidden state after every step, plus step caches when `keep_cache`
    fn forward(
        &self,
        inputs: &[Array2<f64>],
        batch: usize,
        keep_cache: bool,
    ) -> (Vec<Array2<f64>>, Vec<StepCache>) {
        let u = self.units;
        let mut h: Array2<f64> = Array2::zeros((batch, u));
        let mut c: Array2<f64> = Array2::zeros((batch, u));
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut caches = Vec::with_capacity(if keep_cache { inputs.len() } else { 0 });

        for x in inputs {
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent) + &self.bias;
            let input_gate = z.slice(s![.., 0..u]).mapv(sigmoid);
            let forget_gate = z.slice(s![.., u..2 * u]).mapv(sigmoid);
            let candidate = z.slice(s![.., 2 * u..3 * u]).mapv(f64::tanh);
            let output_gate = z.slice(s![.., 3 * u..]).mapv(sigmoid);

            let c_next = &forget_gate * &c + &input_gate * &candidate;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &output_gate * &tanh_c;
            outputs.push(h_next.clone());

            if keep_cache {
                caches.push(StepCache {
                    input: x.clone(),
                    h_prev: h,
                    c_prev: c,
                    input_gate,
                    forget_gate,
                    candidate,
                    output_gate,
                    tanh_c,
                });
            }

            h = h_next;
            c = c_next;
        }

        (outputs, caches)
    }

    /// Backpropagate gradients w.r.t. each step's hidden output
    ///
    /// Returns the parameter gradients and the gradient w.r.t. each step's
    /// input.
    fn backward(
        &self,
        caches: &[StepCache],
        output_grads: &[Array2<f64>],
    ) -> (LayerGradients, Vec<Array2<f64>>) {
        let u = self.units;
        let batch = caches.first().map_or(0, |cache| cache.h_prev.nrows());

        let mut grads = LayerGradients {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent: Array2::zeros(self.recurrent.raw_dim()),
            bias: Array1::zeros(self.bias.len()),
        };
        let mut dh_next: Array2<f64> = Array2::zeros((batch, u));
        let mut dc_next: Array2<f64> = Array2::zeros((batch, u));
        let mut input_grads = Vec::with_capacity(caches.len());

        for (cache, dh_out) in caches.iter().zip(output_grads).rev() {
            let dh = dh_out + &dh_next;
            let d_output = &dh * &cache.tanh_c;
            let dc = &dh * &cache.output_gate * &cache.tanh_c.mapv(|t| 1.0 - t * t) + &dc_next;
            let d_input = &dc * &cache.candidate;
            let d_candidate = &dc * &cache.input_gate;
            let d_forget = &dc * &cache.c_prev;
            dc_next = &dc * &cache.forget_gate;

            let mut dz: Array2<f64> = Array2::zeros((batch, 4 * u));
            dz.slice_mut(s![.., 0..u])
                .assign(&(d_input * &cache.input_gate.mapv(|s| s * (1.0 - s))));
            dz.slice_mut(s![.., u..2 * u])
                .assign(&(d_forget * &cache.forget_gate.mapv(|s| s * (1.0 - s))));
            dz.slice_mut(s![.., 2 * u..3 * u])
                .assign(&(d_candidate * &cache.candidate.mapv(|t| 1.0 - t * t)));
            dz.slice_mut(s![.., 3 * u..])
                .assign(&(d_output * &cache.output_gate.mapv(|s| s * (1.0 - s))));

            grads.kernel += &cache.input.t().dot(&dz);
            grads.recurrent += &cache.h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));

            input_grads.push(dz.dot(&self.kernel.t()));
            dh_next = dz.dot(&self.recurrent.t());
        }

        input_grads.reverse();
        (grads, input_grads)
    }
}

/// Stacked LSTM with dropout and a linear output unit
#[derive(Debug, Clone)]
pub struct StackedLstm {
    config: ModelConfig,
    name: String,
    layers: Vec<LstmLayer>,
    head_kernel: Array2<f64>,
    head_bias: Array1<f64>,
    window_len: Option<usize>,
}

impl StackedLstm {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            name: format!("lstm({}x{})", config.units, config.layers),
            config,
            layers: Vec::new(),
            head_kernel: Array2::zeros((0, 1)),
            head_bias: Array1::zeros(1),
            window_len: None,
        }
    }

    fn initialize_weights(&mut self, rng: &mut StdRng) {
        let units = self.config.units;
        self.layers = (0..self.config.layers)
            .map(|i| LstmLayer::new(if i == 0 { 1 } else { units }, units, rng))
            .collect();
        self.head_kernel = glorot_uniform(units, 1, rng);
        self.head_bias = Array1::zeros(1);
    }

    /// Inverted-dropout mask: kept units are scaled by 1 / (1 - rate)
    fn dropout_mask(&self, batch: usize, rng: &mut StdRng) -> Array2<f64> {
        let rate = self.config.dropout;
        if rate <= 0.0 {
            return Array2::ones((batch, self.config.units));
        }

        let keep = 1.0 - rate;
        Array2::from_shape_fn((batch, self.config.units), |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        })
    }

    fn head(&self, hidden: &Array2<f64>) -> Array2<f64> {
        hidden.dot(&self.head_kernel) + &self.head_bias
    }
}

/// Split a window matrix into one (batch, 1) input per time step
fn time_steps(inputs: &Array2<f64>) -> Vec<Array2<f64>> {
    (0..inputs.ncols())
        .map(|t| inputs.slice(s![.., t..t + 1]).to_owned())
        .collect()
}

impl BatchTrainer for StackedLstm {
    fn batch_gradients(
        &self,
        inputs: &Array2<f64>,
        targets: &Array1<f64>,
        rng: &mut StdRng,
    ) -> (f64, Vec<ArrayD<f64>>) {
        let batch = inputs.nrows();
        let n = targets.len() as f64;
        let units = self.config.units;
        let top = self.layers.len() - 1;

        let mut sequence = time_steps(inputs);
        let mut layer_caches = Vec::with_capacity(self.layers.len());
        let mut hidden_masks: Vec<Vec<Array2<f64>>> = Vec::with_capacity(top);
        let mut top_mask: Array2<f64> = Array2::ones((batch, units));
        let mut final_hidden: Array2<f64> = Array2::zeros((batch, units));

        for (index, layer) in self.layers.iter().enumerate() {
            let (outputs, caches) = layer.forward(&sequence, batch, true);
            layer_caches.push(caches);

            if index < top {
                let masks: Vec<Array2<f64>> =
                    outputs.iter().map(|_| self.dropout_mask(batch, rng)).collect();
                sequence = outputs.iter().zip(&masks).map(|(h, m)| h * m).collect();
                hidden_masks.push(masks);
            } else {
                top_mask = self.dropout_mask(batch, rng);
                if let Some(last) = outputs.last() {
                    final_hidden = last * &top_mask;
                }
            }
        }

        let output = self.head(&final_hidden);
        let residual = output - &targets.view().insert_axis(Axis(1));
        let loss = residual.mapv(|r| r * r).sum() / n;
        let d_output = residual * (2.0 / n);

        let d_head_kernel = final_hidden.t().dot(&d_output);
        let d_head_bias = d_output.sum_axis(Axis(0));

        // Only the last step of the top layer reaches the head
        let steps = inputs.ncols();
        let mut output_grads: Vec<Array2<f64>> =
            (0..steps).map(|_| Array2::zeros((batch, units))).collect();
        if let Some(last) = output_grads.last_mut() {
            *last = d_output.dot(&self.head_kernel.t()) * &top_mask;
        }

        let mut layer_gradients = Vec::with_capacity(self.layers.len());
        for index in (0..self.layers.len()).rev() {
            let (grads, input_grads) = self.layers[index].backward(&layer_caches[index], &output_grads);
            layer_gradients.push(grads);

            if index > 0 {
                output_grads = input_grads
                    .iter()
                    .zip(&hidden_masks[index - 1])
                    .map(|(g, m)| g * m)
                    .collect();
            }
        }

        let mut gradients: Vec<ArrayD<f64>> = layer_gradients
            .into_iter()
            .rev()
            .flat_map(|g| [g.kernel.into_dyn(), g.recurrent.into_dyn(), g.bias.into_dyn()])
            .collect();
        gradients.push(d_head_kernel.into_dyn());
        gradients.push(d_head_bias.into_dyn());

        (loss, gradients)
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut parameters: Vec<ArrayViewMutD<'_, f64>> = self
            .layers
            .iter_mut()
            .flat_map(|layer| {
                [
                    layer.kernel.view_mut().into_dyn(),
                    layer.recurrent.view_mut().into_dyn(),
                    layer.bias.view_mut().into_dyn(),
                ]
            })
            .collect();
        parameters.push(self.head_kernel.view_mut().into_dyn());
        parameters.push(self.head_bias.view_mut().into_dyn());
        parameters
    }
}

impl ForecastModel for StackedLstm {
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
        self.initialize_weights(&mut rng);

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

        let batch = inputs.nrows();
        let mut sequence = time_steps(inputs);
        for layer in &self.layers {
            let (outputs, _) = layer.forward(&sequence, batch, false);
            sequence = outputs;
        }

        let final_hidden = sequence
            .pop()
            .unwrap_or_else(|| Array2::zeros((batch, self.config.units)));
        Ok(self.head(&final_hidden).column(0).to_owned())
    }

    fn window_len(&self) -> Option<usize> {
        self.window_len
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;

    fn small_config() -> ModelConfig {
        ModelConfig {
            units: 8,
            layers: 2,
            epochs: 60,
            batch_size: 16,
            learning_rate: 0.01,
            dropout: 0.0,
            seed: Some(11),
            ..ModelConfig::default()
        }
    }

    fn ramp_windows(count: usize, width: usize) -> (Array2<f64>, Array1<f64>) {
        let total = count + width;
        let series: Vec<f64> = (0..total).map(|i| i as f64 / total as f64).collect();
        let inputs = Array2::from_shape_fn((count, width), |(i, j)| series[i + j]);
        let targets = (0..count).map(|i| series[i + width]).collect();
        (inputs, targets)
    }

    /// Central-difference check of one recurrent weight against backprop
    #[test]
    fn test_gradient_matches_finite_difference() {
        let config = ModelConfig {
            units: 3,
            layers: 2,
            dropout: 0.0,
            seed: Some(3),
            ..ModelConfig::default()
        };
        let mut model = StackedLstm::new(config);
        let mut rng = make_rng(Some(3));
        model.initialize_weights(&mut rng);

        let (inputs, targets) = ramp_windows(4, 5);
        let (_, gradients) = model.batch_gradients(&inputs, &targets, &mut rng);

        // Slot 1 is the bottom layer's recurrent kernel
        let analytic: Vec<f64> = gradients[1].iter().copied().collect();
        let eps = 1e-6;

        let mut plus = model.clone();
        plus.layers[0].recurrent[[0, 2]] += eps;
        let (loss_plus, _) = plus.batch_gradients(&inputs, &targets, &mut rng);

        let mut minus = model.clone();
        minus.layers[0].recurrent[[0, 2]] -= eps;
        let (loss_minus, _) = minus.batch_gradients(&inputs, &targets, &mut rng);

        let numeric = (loss_plus - loss_minus) / (2.0 * eps);
        assert!(
            (numeric - analytic[2]).abs() < 1e-6,
            "numeric {} vs analytic {}",
            numeric,
            analytic[2]
        );
    }

    #[test]
    fn test_training_reduces_loss() {
        let (inputs, targets) = ramp_windows(48, 6);
        let mut model = StackedLstm::new(small_config());

        let report = model.fit(&inputs, &targets, None).unwrap();

        assert_eq!(report.epochs_run, 60);
        assert!(report.final_loss().unwrap() < report.loss_history[0]);
        assert_eq!(model.window_len(), Some(6));
        assert!(model.predict(&inputs).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let (inputs, targets) = ramp_windows(10, 3);
        let token = CancellationToken::new();
        token.cancel();

        let mut model = StackedLstm::new(small_config());
        let err = model.fit(&inputs, &targets, Some(&token)).unwrap_err();

        assert!(matches!(err, ForecastError::Cancelled { epoch: 1 }));
        assert_eq!(model.window_len(), None);
    }

    #[test]
    fn test_mismatched_targets_are_rejected() {
        let (inputs, _) = ramp_windows(10, 3);
        let mut model = StackedLstm::new(small_config());

        let err = model.fit(&inputs, &Array1::zeros(4), None).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter(_)));
    }
}
