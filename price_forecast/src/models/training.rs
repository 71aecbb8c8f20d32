//! Mini-batch training loop shared by the model variants

use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::models::TrainingReport;
use log::debug;
use ndarray::{Array1, Array2, ArrayD, ArrayViewMutD, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

/// A model that can compute MSE gradients for a batch
///
/// Gradients are returned in the same order as `parameters_mut` yields the
/// parameters they belong to.
pub(crate) trait BatchTrainer {
    fn batch_gradients(
        &self,
        inputs: &Array2<f64>,
        targets: &Array1<f64>,
        rng: &mut StdRng,
    ) -> (f64, Vec<ArrayD<f64>>);

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>>;
}

/// Adam optimiser state
#[derive(Debug)]
pub(crate) struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    first_moments: Vec<ArrayD<f64>>,
    second_moments: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            first_moments: Vec::new(),
            second_moments: Vec::new(),
        }
    }

    pub fn update(&mut self, mut parameters: Vec<ArrayViewMutD<'_, f64>>, gradients: &[ArrayD<f64>]) {
        if self.first_moments.len() != gradients.len() {
            self.first_moments = gradients.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.second_moments = gradients.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        }

        self.step += 1;
        let (beta1, beta2, epsilon, learning_rate) =
            (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let first_correction = 1.0 - beta1.powi(self.step);
        let second_correction = 1.0 - beta2.powi(self.step);

        for (((param, grad), m), v) in parameters
            .iter_mut()
            .zip(gradients)
            .zip(self.first_moments.iter_mut())
            .zip(self.second_moments.iter_mut())
        {
            Zip::from(param.view_mut())
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / first_correction;
                    let v_hat = *v / second_correction;
                    *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
    }
}

/// Rescale gradients so their combined L2 norm is at most `max_norm`
pub(crate) fn clip_by_global_norm(gradients: &mut [ArrayD<f64>], max_norm: f64) {
    let norm = gradients
        .iter()
        .map(|g| g.iter().map(|v| v * v).sum::<f64>())
        .sum::<f64>()
        .sqrt();

    if norm > max_norm {
        let scale = max_norm / norm;
        for gradient in gradients.iter_mut() {
            gradient.mapv_inplace(|v| v * scale);
        }
    }
}

/// Run `config.epochs` passes of mini-batch Adam over the windows
pub(crate) fn train_epochs<M: BatchTrainer>(
    model: &mut M,
    name: &str,
    inputs: &Array2<f64>,
    targets: &Array1<f64>,
    config: &ModelConfig,
    rng: &mut StdRng,
    cancel: Option<&CancellationToken>,
) -> Result<TrainingReport> {
    let mut optimizer = Adam::new(config.learning_rate);
    let mut indices: Vec<usize> = (0..inputs.nrows()).collect();
    let mut loss_history = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        if cancel.map_or(false, |token| token.is_cancelled()) {
            return Err(ForecastError::Cancelled { epoch });
        }

        if config.shuffle {
            indices.shuffle(rng);
        }

        let mut weighted_loss = 0.0;
        for batch in indices.chunks(config.batch_size) {
            let batch_inputs = inputs.select(Axis(0), batch);
            let batch_targets = targets.select(Axis(0), batch);

            let (loss, mut gradients) = model.batch_gradients(&batch_inputs, &batch_targets, rng);
            if !loss.is_finite() {
                return Err(ForecastError::TrainingDivergence { epoch, loss });
            }

            if let Some(max_norm) = config.clip_norm {
                clip_by_global_norm(&mut gradients, max_norm);
            }
            optimizer.update(model.parameters_mut(), &gradients);

            weighted_loss += loss * batch.len() as f64;
        }

        let epoch_loss = weighted_loss / indices.len() as f64;
        let parameters_finite = model
            .parameters_mut()
            .iter()
            .all(|p| p.iter().all(|v| v.is_finite()));
        if !epoch_loss.is_finite() || !parameters_finite {
            return Err(ForecastError::TrainingDivergence {
                epoch,
                loss: epoch_loss,
            });
        }

        debug!("{} epoch {}/{}: loss {:.6}", name, epoch, config.epochs, epoch_loss);
        loss_history.push(epoch_loss);
    }

    Ok(TrainingReport {
        epochs_run: loss_history.len(),
        loss_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, IxDyn};

    #[test]
    fn test_clip_scales_to_max_norm() {
        let mut gradients = vec![
            arr1(&[3.0, 0.0]).into_dyn(),
            arr1(&[0.0, 4.0]).into_dyn(),
        ];
        clip_by_global_norm(&mut gradients, 1.0);

        let first: Vec<f64> = gradients[0].iter().copied().collect();
        let second: Vec<f64> = gradients[1].iter().copied().collect();
        assert!((first[0] - 0.6).abs() < 1e-12);
        assert!((second[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_clip_leaves_small_gradients() {
        let mut gradients = vec![arr1(&[0.1, 0.2]).into_dyn()];
        clip_by_global_norm(&mut gradients, 1.0);
        let values: Vec<f64> = gradients[0].iter().copied().collect();
        assert_eq!(values, vec![0.1, 0.2]);
    }

    #[test]
    fn test_adam_moves_against_gradient() {
        let mut param = ArrayD::from_elem(IxDyn(&[2]), 1.0);
        let gradient = vec![arr1(&[1.0, -1.0]).into_dyn()];
        let mut adam = Adam::new(0.1);

        adam.update(vec![param.view_mut()], &gradient);

        let values: Vec<f64> = param.iter().copied().collect();
        assert!(values[0] < 1.0);
        assert!(values[1] > 1.0);
    }
}
