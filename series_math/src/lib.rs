//! # Series Math
//!
//! Numeric building blocks for windowed price forecasting.
//! This crate provides the reversible min-max scaling applied to a price
//! series before training, the supervised-learning windowing of a scaled
//! series, and the percentage-change calculation used to score forecasts.

use thiserror::Error;

pub mod change;
pub mod scaling;
pub mod windows;

pub use change::percentage_change;
pub use scaling::ScalingTransform;
pub use windows::{build_windows, Window};

/// Errors that can occur in series calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Empty series: scaling needs at least 2 observations, got {len}")]
    EmptySeries { len: usize },

    #[error("Degenerate range: every training value equals {value}, scaling is undefined")]
    DegenerateRange { value: f64 },

    #[error("Insufficient history: {len} values cannot fill a window of {window_len} plus a target")]
    InsufficientHistory { len: usize, window_len: usize },

    #[error("Zero baseline: percentage change from 0 to {end} is undefined")]
    ZeroBaseline { end: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for series math operations
pub type Result<T> = std::result::Result<T, MathError>;
