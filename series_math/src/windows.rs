//! Fixed-width windowing of a series into supervised training examples

use crate::{MathError, Result};

/// One supervised example: `window_len` consecutive values and the value that follows them
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Contiguous inputs, oldest first
    pub input: Vec<f64>,
    /// The value immediately after the last input
    pub target: f64,
}

/// Slide a window of `window_len` values over `series`
///
/// Produces `series.len() - window_len` windows in chronological order. The
/// i-th window covers `series[i..i + window_len]` and targets
/// `series[i + window_len]`.
pub fn build_windows(series: &[f64], window_len: usize) -> Result<Vec<Window>> {
    if window_len == 0 {
        return Err(MathError::InvalidInput(
            "Window length must be at least 1".to_string(),
        ));
    }

    if series.len() <= window_len {
        return Err(MathError::InsufficientHistory {
            len: series.len(),
            window_len,
        });
    }

    let windows = series
        .windows(window_len + 1)
        .map(|chunk| Window {
            input: chunk[..window_len].to_vec(),
            target: chunk[window_len],
        })
        .collect();

    Ok(windows)
}
