//! Forecasting models over windowed inputs
//!
//! Both variants share one contract: `fit` trains in place on a matrix of
//! windows (one row per window, one column per time step) and their targets;
//! `predict` maps each row to one scaled output.
//!
//! Training is stochastic. Weight initialisation, shuffling and dropout draw
//! from a random generator, so two fits on identical data give different
//! parameters unless [`ModelConfig::seed`] is set.

use crate::config::{ModelConfig, ModelKind};
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use series_math::Window;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

pub mod feedforward;
pub mod lstm;
mod training;

pub use feedforward::FeedForward;
pub use lstm::StackedLstm;

/// Outcome of a completed fit
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Epochs completed
    pub epochs_run: usize,
    /// Mean training loss of each epoch, in scaled units squared
    pub loss_history: Vec<f64>,
}

impl TrainingReport {
    /// Loss of the last completed epoch
    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

/// Common interface for forecasting models
pub trait ForecastModel: Debug {
    /// Train on `inputs` (one window per row) against `targets`
    ///
    /// Blocks until training finishes. When a cancellation token is given it
    /// is checked before every epoch.
    fn fit(
        &mut self,
        inputs: &Array2<f64>,
        targets: &Array1<f64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<TrainingReport>;

    /// One output per input row; fails if the model is unfitted or the
    /// window length differs from the one used in `fit`
    fn predict(&self, inputs: &Array2<f64>) -> Result<Array1<f64>>;

    /// Window length the model was fitted on
    fn window_len(&self) -> Option<usize>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// Create an untrained model of the configured variant
pub fn build_model(config: &ModelConfig) -> Result<Box<dyn ForecastModel>> {
    config.validate()?;

    Ok(match config.kind {
        ModelKind::Sequence => Box::new(StackedLstm::new(config.clone())),
        ModelKind::Feedforward => Box::new(FeedForward::new(config.clone())),
    })
}

/// Stack windows into an input matrix and a target vector
pub fn windows_to_arrays(windows: &[Window]) -> (Array2<f64>, Array1<f64>) {
    let width = windows.first().map_or(0, |w| w.input.len());
    let inputs = Array2::from_shape_fn((windows.len(), width), |(i, j)| windows[i].input[j]);
    let targets = windows.iter().map(|w| w.target).collect();

    (inputs, targets)
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub(crate) fn check_training_inputs(inputs: &Array2<f64>, targets: &Array1<f64>) -> Result<()> {
    if inputs.nrows() == 0 || inputs.ncols() == 0 {
        return Err(ForecastError::InvalidParameter(format!(
            "training needs at least one non-empty window, got {}x{}",
            inputs.nrows(),
            inputs.ncols()
        )));
    }
    if inputs.nrows() != targets.len() {
        return Err(ForecastError::InvalidParameter(format!(
            "{} windows but {} targets",
            inputs.nrows(),
            targets.len()
        )));
    }
    if inputs.iter().chain(targets.iter()).any(|v| !v.is_finite()) {
        return Err(ForecastError::InvalidParameter(
            "training data contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_prediction_inputs(
    name: &str,
    window_len: Option<usize>,
    inputs: &Array2<f64>,
) -> Result<()> {
    let expected = window_len.ok_or_else(|| ForecastError::ModelNotFitted(name.to_string()))?;
    if inputs.ncols() != expected {
        return Err(ForecastError::WindowMismatch {
            expected,
            actual: inputs.ncols(),
        });
    }
    Ok(())
}
