//! Reversible min-max scaling of a price series into [0, 1]
//!
//! A [`ScalingTransform`] is fitted once on the training series and then
//! reused, unchanged, for every later transform and inversion. Values outside
//! the training range map outside [0, 1]; they are never clamped and the
//! transform is never refitted.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Affine map from original units to scaled units, fitted on a training series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingTransform {
    min: f64,
    max: f64,
}

impl ScalingTransform {
    /// Fit the transform on a training series
    ///
    /// Fails with [`MathError::EmptySeries`] when the series has fewer than
    /// two observations.
    pub fn fit(series: &[f64]) -> Result<Self> {
        if series.len() < 2 {
            return Err(MathError::EmptySeries { len: series.len() });
        }
        ensure_finite(series)?;

        Ok(Self {
            min: Statistics::min(series.iter()),
            max: Statistics::max(series.iter()),
        })
    }

    /// Smallest value of the training series
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value of the training series
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Width of the training range
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Scale a single value
    pub fn transform_value(&self, value: f64) -> Result<f64> {
        let range = self.checked_range()?;
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "cannot scale non-finite value {}",
                value
            )));
        }
        Ok((value - self.min) / range)
    }

    /// Scale a whole series with this transform
    ///
    /// Fails with [`MathError::DegenerateRange`] when the training series was
    /// constant.
    pub fn transform(&self, series: &[f64]) -> Result<Vec<f64>> {
        let range = self.checked_range()?;
        ensure_finite(series)?;

        Ok(series.iter().map(|v| (v - self.min) / range).collect())
    }

    /// Map a scaled value back to original units
    pub fn invert(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    /// Map a scaled series back to original units
    pub fn invert_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&s| self.invert(s)).collect()
    }

    fn checked_range(&self) -> Result<f64> {
        let range = self.range();
        if range == 0.0 {
            return Err(MathError::DegenerateRange { value: self.min });
        }
        Ok(range)
    }
}

fn ensure_finite(series: &[f64]) -> Result<()> {
    match series.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MathError::InvalidInput(format!(
            "non-finite value {} at position {}",
            series[index], index
        ))),
        None => Ok(()),
    }
}
