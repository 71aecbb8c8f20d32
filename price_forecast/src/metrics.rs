//! Error metrics over the held-out window

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use series_math::percentage_change;
use statrs::statistics::Statistics;
use std::fmt;

/// Aggregate error of model predictions against held-out actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error over non-zero actuals; `None` when
    /// every actual is zero
    pub mape: Option<f64>,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
}

/// Compare predictions with actuals of the same, non-zero length
pub fn forecast_accuracy(actual: &[f64], predicted: &[f64]) -> Result<ForecastAccuracy> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::InvalidParameter(format!(
            "accuracy needs equal non-empty series, got {} actuals and {} predictions",
            actual.len(),
            predicted.len()
        )));
    }

    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| a - p)
        .collect();

    let mae = Statistics::mean(errors.iter().map(|e| e.abs()));
    let mse = Statistics::mean(errors.iter().map(|e| e * e));

    let percentage_errors: Vec<f64> = actual
        .iter()
        .zip(&errors)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, e)| e.abs() / a.abs() * 100.0)
        .collect();
    let mape = if percentage_errors.is_empty() {
        None
    } else {
        Some(Statistics::mean(percentage_errors.iter()))
    };

    let smape = Statistics::mean(actual.iter().zip(predicted).map(|(a, p)| {
        let denominator = a.abs() + p.abs();
        if denominator == 0.0 {
            0.0
        } else {
            200.0 * (a - p).abs() / denominator
        }
    }));

    Ok(ForecastAccuracy {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape,
        smape,
    })
}

/// Percentage change from the last held-out actual to its prediction
pub fn final_step_accuracy(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    match (actual.last(), predicted.last()) {
        (Some(&actual), Some(&predicted)) => Ok(percentage_change(actual, predicted)?),
        _ => Err(ForecastError::InvalidParameter(
            "accuracy needs at least one held-out value".to_string(),
        )),
    }
}

impl fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Held-out Error Metrics:")?;
        writeln!(f, "  MAE:     {:.4}", self.mae)?;
        writeln!(f, "  MSE:     {:.4}", self.mse)?;
        writeln!(f, "  RMSE:    {:.4}", self.rmse)?;
        match self.mape {
            Some(mape) => writeln!(f, "  MAPE:    {:.4}%", mape)?,
            None => writeln!(f, "  MAPE:    undefined")?,
        }
        writeln!(f, "  SMAPE:   {:.4}%", self.smape)?;
        Ok(())
    }
}
