//! Percentage change between two prices

use crate::{MathError, Result};

/// Percentage change from `start` to `end`: `(end - start) / start * 100`
///
/// Fails with [`MathError::ZeroBaseline`] when `start` is zero.
pub fn percentage_change(start: f64, end: f64) -> Result<f64> {
    if !start.is_finite() || !end.is_finite() {
        return Err(MathError::InvalidInput(format!(
            "percentage change needs finite operands, got {} and {}",
            start, end
        )));
    }

    if start == 0.0 {
        return Err(MathError::ZeroBaseline { end });
    }

    Ok((end - start) / start * 100.0)
}
