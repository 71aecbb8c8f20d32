//! Autoregressive multi-step forecasting past the last known actual
//!
//! Starting from the most recent `window_len` scaled values, each step
//! predicts the next scaled value, records it in original units, drops the
//! oldest value from the window and appends the prediction. Later steps
//! therefore see earlier predictions instead of observations, and errors
//! compound over the horizon.

use crate::error::{ForecastError, Result};
use crate::models::ForecastModel;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use series_math::ScalingTransform;
use std::collections::VecDeque;

/// One forecast value in original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastStep {
    /// Steps past the last known actual, starting at 1
    pub offset: usize,
    /// Projected timestamp, when the caller supplied a time grid
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
}

/// Drives a fitted model forward beyond the end of known history
#[derive(Debug)]
pub struct IterativeExtrapolator<'a> {
    model: &'a dyn ForecastModel,
    transform: &'a ScalingTransform,
    window_len: usize,
}

impl<'a> IterativeExtrapolator<'a> {
    /// Fails if the model has not been fitted
    pub fn new(model: &'a dyn ForecastModel, transform: &'a ScalingTransform) -> Result<Self> {
        let window_len = model
            .window_len()
            .ok_or_else(|| ForecastError::ModelNotFitted(model.name().to_string()))?;

        Ok(Self {
            model,
            transform,
            window_len,
        })
    }

    /// Forecast `future_days` steps from the tail of `scaled_history`
    ///
    /// Only the last `window_len` values of the history seed the window.
    pub fn extrapolate(&self, scaled_history: &[f64], future_days: usize) -> Result<Vec<ForecastStep>> {
        if scaled_history.len() < self.window_len {
            return Err(ForecastError::InsufficientWarmup {
                available: scaled_history.len(),
                window_len: self.window_len,
            });
        }

        let seed = &scaled_history[scaled_history.len() - self.window_len..];
        let mut window: VecDeque<f64> = seed.iter().copied().collect();
        let mut steps = Vec::with_capacity(future_days);

        for offset in 1..=future_days {
            let input = Array2::from_shape_fn((1, self.window_len), |(_, j)| window[j]);
            let scaled = self
                .model
                .predict(&input)?
                .get(0)
                .copied()
                .filter(|v| v.is_finite())
                .ok_or(ForecastError::NonFinitePrediction { step: offset })?;

            let value = self.transform.invert(scaled);
            if !value.is_finite() {
                return Err(ForecastError::NonFinitePrediction { step: offset });
            }

            steps.push(ForecastStep {
                offset,
                timestamp: None,
                value,
            });

            window.pop_front();
            window.push_back(scaled);
        }

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrainingReport;
    use ndarray::{Array1, Array2};
    use tokio_util::sync::CancellationToken;

    /// Predicts the last value of the window plus a fixed step
    #[derive(Debug)]
    struct StepModel {
        window_len: Option<usize>,
        step: f64,
    }

    impl ForecastModel for StepModel {
        fn fit(
            &mut self,
            inputs: &Array2<f64>,
            _targets: &Array1<f64>,
            _cancel: Option<&CancellationToken>,
        ) -> Result<TrainingReport> {
            self.window_len = Some(inputs.ncols());
            Ok(TrainingReport {
                epochs_run: 0,
                loss_history: Vec::new(),
            })
        }

        fn predict(&self, inputs: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(inputs
                .rows()
                .into_iter()
                .map(|row| row[row.len() - 1] + self.step)
                .collect())
        }

        fn window_len(&self) -> Option<usize> {
            self.window_len
        }

        fn name(&self) -> &str {
            "step"
        }
    }

    fn transform() -> ScalingTransform {
        ScalingTransform::fit(&[0.0, 100.0]).unwrap()
    }

    #[test]
    fn test_each_step_feeds_the_next() {
        let model = StepModel {
            window_len: Some(3),
            step: 0.1,
        };
        let transform = transform();
        let extrapolator = IterativeExtrapolator::new(&model, &transform).unwrap();

        let steps = extrapolator.extrapolate(&[0.0, 0.1, 0.2, 0.3], 3).unwrap();
        let values: Vec<f64> = steps.iter().map(|s| s.value).collect();

        assert_eq!(steps.len(), 3);
        assert!((values[0] - 40.0).abs() < 1e-9);
        assert!((values[1] - 50.0).abs() < 1e-9);
        assert!((values[2] - 60.0).abs() < 1e-9);
        assert_eq!(steps.iter().map(|s| s.offset).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_step_count_matches_horizon() {
        let model = StepModel {
            window_len: Some(2),
            step: 0.01,
        };
        let transform = transform();
        let extrapolator = IterativeExtrapolator::new(&model, &transform).unwrap();

        for k in [0, 1, 5, 30] {
            let steps = extrapolator.extrapolate(&[0.5, 0.6], k).unwrap();
            assert_eq!(steps.len(), k);
            assert!(steps.iter().all(|s| s.value.is_finite()));
        }
    }

    #[test]
    fn test_insufficient_warmup() {
        let model = StepModel {
            window_len: Some(4),
            step: 0.0,
        };
        let transform = transform();
        let extrapolator = IterativeExtrapolator::new(&model, &transform).unwrap();

        let err = extrapolator.extrapolate(&[0.1, 0.2, 0.3], 1).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientWarmup {
                available: 3,
                window_len: 4
            }
        ));
    }

    #[test]
    fn test_unfitted_model_is_rejected() {
        let model = StepModel {
            window_len: None,
            step: 0.0,
        };
        let transform = transform();
        assert!(IterativeExtrapolator::new(&model, &transform).is_err());
    }

    #[test]
    fn test_non_finite_prediction_is_surfaced() {
        let model = StepModel {
            window_len: Some(1),
            step: f64::NAN,
        };
        let transform = transform();
        let extrapolator = IterativeExtrapolator::new(&model, &transform).unwrap();

        let err = extrapolator.extrapolate(&[0.5], 2).unwrap_err();
        assert!(matches!(err, ForecastError::NonFinitePrediction { step: 1 }));
    }
}
