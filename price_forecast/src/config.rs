//! Forecast configuration
//!
//! Every knob has a default: a 182-value window, a one-step horizon and a
//! stacked LSTM trained for 25 epochs in batches of 32. Configurations can
//! be loaded from JSON; missing fields take their defaults.

use crate::error::{ForecastError, Result};
use crate::retry::RetryPolicy;
use crate::source::Period;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default number of trailing values per window
pub const DEFAULT_WINDOW_LEN: usize = 182;
/// Default forecast horizon
pub const DEFAULT_FUTURE_DAYS: usize = 1;

/// Which model variant to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Stacked LSTM layers with dropout and a linear head
    Sequence,
    /// Two dense ReLU layers and a linear head
    Feedforward,
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Sequence
    }
}

/// Model capacity and training options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Full passes over the training windows
    pub epochs: usize,
    /// Windows per gradient step
    pub batch_size: usize,
    /// Hidden units per recurrent layer (sequence variant)
    pub units: usize,
    /// Number of stacked recurrent layers (sequence variant)
    pub layers: usize,
    /// Width of each hidden dense layer (feedforward variant)
    pub hidden_width: usize,
    /// Fraction of recurrent outputs dropped during training
    pub dropout: f64,
    /// Adam step size
    pub learning_rate: f64,
    /// Rescale gradients whose global L2 norm exceeds this
    pub clip_norm: Option<f64>,
    /// Shuffle windows before each epoch
    pub shuffle: bool,
    /// Seed for initialisation, shuffling and dropout; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Sequence,
            epochs: 25,
            batch_size: 32,
            units: 50,
            layers: 3,
            hidden_width: 64,
            dropout: 0.2,
            learning_rate: 0.001,
            clip_norm: Some(5.0),
            shuffle: true,
            seed: None,
        }
    }
}

impl ModelConfig {
    /// Default options for the feedforward variant
    pub fn feedforward() -> Self {
        Self {
            kind: ModelKind::Feedforward,
            ..Self::default()
        }
    }

    /// Check that the options describe a trainable model
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ForecastError::InvalidParameter(
                "epochs must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.units == 0 || self.layers == 0 || self.hidden_width == 0 {
            return Err(ForecastError::InvalidParameter(
                "units, layers and hidden_width must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidParameter(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if let Some(clip) = self.clip_norm {
            if !(clip > 0.0) {
                return Err(ForecastError::InvalidParameter(format!(
                    "clip_norm must be positive, got {}",
                    clip
                )));
            }
        }
        Ok(())
    }
}

/// Options for one forecast request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Lookback used when no training start date is given
    pub period: Period,
    /// Trailing values per window, identical for training and inference
    pub window_len: usize,
    /// Steps to forecast past the last known actual
    pub future_days: usize,
    pub model: ModelConfig,
    /// Retry policy for transient history-source failures
    pub retry: RetryPolicy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            period: Period::Max,
            window_len: DEFAULT_WINDOW_LEN,
            future_days: DEFAULT_FUTURE_DAYS,
            model: ModelConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ForecastConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn with_window_len(mut self, window_len: usize) -> Self {
        self.window_len = window_len;
        self
    }

    pub fn with_future_days(mut self, future_days: usize) -> Self {
        self.future_days = future_days;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check every option before any data is fetched
    pub fn validate(&self) -> Result<()> {
        if self.window_len == 0 {
            return Err(ForecastError::InvalidParameter(
                "window_len must be at least 1".to_string(),
            ));
        }
        if self.future_days == 0 {
            return Err(ForecastError::InvalidParameter(
                "future_days must be at least 1".to_string(),
            ));
        }
        self.model.validate()?;
        self.retry.validate()
    }
}
