//! # Price Forecast
//!
//! Windowed closing-price forecasting for a single security.
//!
//! ## Features
//!
//! - History sources behind one trait (in-memory maps, CSV directories)
//! - Min-max scaling fitted once on the training series
//! - Two model variants: a stacked LSTM and a feedforward network
//! - Autoregressive multi-step extrapolation
//! - Held-out accuracy, increase and error metrics
//! - Stage-tagged errors and bounded retry of transient fetch failures
//!
//! ## Pipeline
//!
//! ```text
//! fetch-training -> normalize -> window -> train
//!     -> fetch-test -> evaluate -> extrapolate
//! ```
//!
//! Every failure is returned as [`ForecastError::Stage`] naming the stage
//! that raised it; [`ForecastError::root_cause`] strips the tag.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use price_forecast::{CsvHistorySource, ForecastConfig, ForecastRequest, Forecaster};
//!
//! let config = ForecastConfig::default().with_future_days(5);
//! let forecaster = Forecaster::new(CsvHistorySource::new("data"), config)?;
//!
//! let train_end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let result = forecaster.predict(&ForecastRequest::new("ACME", train_end))?;
//!
//! println!("{}", result);
//! # Ok::<(), price_forecast::ForecastError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod extrapolation;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use crate::config::{ForecastConfig, ModelConfig, ModelKind};
pub use crate::data::{Observation, TimeSeries};
pub use crate::error::{ForecastError, Result, Stage};
pub use crate::extrapolation::{ForecastStep, IterativeExtrapolator};
pub use crate::metrics::ForecastAccuracy;
pub use crate::models::{build_model, ForecastModel, TrainingReport};
pub use crate::pipeline::{ForecastRequest, ForecastResult, Forecaster};
pub use crate::report::{CsvReportSink, VisualizationSink};
pub use crate::retry::RetryPolicy;
pub use crate::source::{CsvHistorySource, HistoryRequest, HistorySource, InMemorySource, Period};
pub use tokio_util::sync::CancellationToken;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
