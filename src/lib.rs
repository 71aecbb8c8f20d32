//! # Price Forecast Workspace
//!
//! Facade over the workspace crates:
//!
//! - [`series_math`]: scaling, windowing and percentage change
//! - [`price_forecast`]: history sources, models and the forecasting pipeline
//!
//! ## Example
//!
//! ```
//! use price_forecast_workspace::series_math::{build_windows, ScalingTransform};
//!
//! let prices = [100.0, 110.0, 120.0, 130.0];
//! let transform = ScalingTransform::fit(&prices).unwrap();
//! let scaled = transform.transform(&prices).unwrap();
//!
//! let windows = build_windows(&scaled, 2).unwrap();
//! assert_eq!(windows.len(), 2);
//! assert_eq!(transform.invert(windows[1].target), 130.0);
//! ```

pub use price_forecast;
pub use series_math;

pub use price_forecast::{ForecastConfig, ForecastError, ForecastRequest, ForecastResult, Forecaster};
pub use series_math::{percentage_change, ScalingTransform};
