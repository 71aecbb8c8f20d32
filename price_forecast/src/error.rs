//! Error types for the price_forecast crate

use chrono::{DateTime, Utc};
use series_math::MathError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the training history
    FetchTraining,
    /// Fitting the scaling transform and scaling the training series
    Normalize,
    /// Building training windows
    Window,
    /// Fitting the model
    Train,
    /// Fetching the held-out history
    FetchTest,
    /// Predicting and scoring the held-out window
    Evaluate,
    /// Multi-step extrapolation past the last actual
    Extrapolate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchTraining => "fetch-training",
            Stage::Normalize => "normalize",
            Stage::Window => "window",
            Stage::Train => "train",
            Stage::FetchTest => "fetch-test",
            Stage::Evaluate => "evaluate",
            Stage::Extrapolate => "extrapolate",
        };
        f.write_str(name)
    }
}

/// Custom error types for the price_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Scaling, windowing or percentage-change failure
    #[error(transparent)]
    Math(#[from] MathError),

    /// Fewer scaled values than the window needs to seed extrapolation
    #[error("Insufficient warmup: {available} scaled values cannot seed a window of {window_len}")]
    InsufficientWarmup { available: usize, window_len: usize },

    /// Lookup or transport failure in the history source
    #[error("Data source error for {identifier}: {message}")]
    DataSource {
        identifier: String,
        message: String,
        /// Whether retrying the same request may succeed
        transient: bool,
    },

    /// Training loss became non-finite
    #[error("Training diverged at epoch {epoch}: loss is {loss}")]
    TrainingDivergence { epoch: usize, loss: f64 },

    /// Model produced a non-finite value while extrapolating
    #[error("Non-finite prediction at forecast step {step}")]
    NonFinitePrediction { step: usize },

    /// Inputs do not match the window length the model was fitted on
    #[error("Window mismatch: model was fitted on windows of {expected}, got {actual}")]
    WindowMismatch { expected: usize, actual: usize },

    /// Predict called before fit
    #[error("Model {0} has not been fitted")]
    ModelNotFitted(String),

    /// Held-out history starts at or before the end of the training history
    #[error("Held-out history starting {test_start} overlaps training history ending {train_end}")]
    OverlappingHistory {
        train_end: DateTime<Utc>,
        test_start: DateTime<Utc>,
    },

    /// Training stopped by a cancellation token
    #[error("Training cancelled before epoch {epoch}")]
    Cancelled { epoch: usize },

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failure tagged with the pipeline stage that raised it
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        source: Box<ForecastError>,
    },

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON (de)serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ForecastError {
    /// Strip any stage tags and return the underlying error
    pub fn root_cause(&self) -> &ForecastError {
        match self {
            ForecastError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stage that raised this error, if it was tagged
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ForecastError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root_cause(),
            ForecastError::DataSource {
                transient: true,
                ..
            }
        )
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Tag errors with the pipeline stage they came from
pub trait StageContext<T> {
    fn at_stage(self, stage: Stage) -> Result<T>;
}

impl<T, E> StageContext<T> for std::result::Result<T, E>
where
    E: Into<ForecastError>,
{
    fn at_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|err| ForecastError::Stage {
            stage,
            source: Box::new(err.into()),
        })
    }
}
