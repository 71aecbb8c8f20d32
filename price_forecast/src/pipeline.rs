//! End-to-end forecast for one identifier
//!
//! A request runs these stages in order, and any failure comes back tagged with
//! the [`Stage`] that raised it:
//!
//! 1. `fetch-training`: history up to the training end date
//! 2. `normalize`: fit the scaling transform on the training values
//! 3. `window`: slice the scaled training series into windows
//! 4. `train`: build and fit the configured model
//! 5. `fetch-test`: held-out history from the training end to the present
//! 6. `evaluate`: predict the held-out values and score them
//! 7. `extrapolate`: autoregressive forecast past the last actual
//!
//! The scaling transform fitted in stage 2 is reused for every later
//! transform and inversion.

use crate::config::ForecastConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result, Stage, StageContext};
use crate::extrapolation::{ForecastStep, IterativeExtrapolator};
use crate::metrics::{final_step_accuracy, forecast_accuracy, ForecastAccuracy};
use crate::models::{build_model, windows_to_arrays, ForecastModel, TrainingReport};
use crate::report::VisualizationSink;
use crate::source::{validate_identifier, HistoryRequest, HistorySource, Period};
use crate::utils::{future_timestamps, observation_step};
use chrono::{DateTime, Utc};
use log::info;
use series_math::{build_windows, percentage_change, MathError, ScalingTransform};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// What to forecast and which history to train on
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub identifier: String,
    /// Inclusive start of the training history; when absent the configured
    /// period bounds the lookback
    pub train_start: Option<DateTime<Utc>>,
    /// Exclusive end of the training history and start of the held-out window
    pub train_end: DateTime<Utc>,
}

impl ForecastRequest {
    pub fn new(identifier: impl Into<String>, train_end: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            train_start: None,
            train_end,
        }
    }

    pub fn with_train_start(mut self, train_start: DateTime<Utc>) -> Self {
        self.train_start = Some(train_start);
        self
    }
}

/// Outcome of a successful forecast
#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub identifier: String,
    pub model_name: String,
    /// One step per forecast day, in order
    pub steps: Vec<ForecastStep>,
    /// Percentage change from the last known actual to the final step
    pub increase: f64,
    /// Percentage change from the last held-out actual to its prediction
    pub accuracy: f64,
    /// Held-out actuals in original units
    pub actual: Vec<f64>,
    /// Model predictions for the held-out actuals, in original units
    pub predicted: Vec<f64>,
    pub metrics: ForecastAccuracy,
    pub training: TrainingReport,
}

impl ForecastResult {
    /// Forecast values in original units
    pub fn values(&self) -> Vec<f64> {
        self.steps.iter().map(|step| step.value).collect()
    }

    /// Hand the held-out comparison to a rendering sink
    pub fn render_to(&self, sink: &mut dyn VisualizationSink) -> Result<()> {
        sink.render(&self.actual, &self.predicted, &self.identifier)
    }
}

impl fmt::Display for ForecastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forecast for {} ({})", self.identifier, self.model_name)?;
        for step in &self.steps {
            match step.timestamp {
                Some(timestamp) => writeln!(
                    f,
                    "  t+{:<3} {}  {:.4}",
                    step.offset,
                    timestamp.format("%Y-%m-%d"),
                    step.value
                )?,
                None => writeln!(f, "  t+{:<3} {:.4}", step.offset, step.value)?,
            }
        }
        writeln!(f, "  Increase: {:.2}%", self.increase)?;
        writeln!(f, "  Accuracy: {:.2}%", self.accuracy)?;
        write!(f, "{}", self.metrics)
    }
}

/// Runs forecasts against one history source
#[derive(Debug)]
pub struct Forecaster<S> {
    source: S,
    config: ForecastConfig,
}

impl<S: HistorySource> Forecaster<S> {
    /// Fails if the configuration is invalid
    pub fn new(source: S, config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Train, evaluate and extrapolate for one request
    pub fn predict(&self, request: &ForecastRequest) -> Result<ForecastResult> {
        self.predict_with_cancel(request, None)
    }

    /// As [`Forecaster::predict`], stopping training when `cancel` fires
    pub fn predict_with_cancel(
        &self,
        request: &ForecastRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<ForecastResult> {
        let window_len = self.config.window_len;
        let identifier = request.identifier.as_str();

        info!("Fetching training history for {}", identifier);
        validate_identifier(identifier).at_stage(Stage::FetchTraining)?;
        let training_request = HistoryRequest::new(identifier, self.config.period)
            .starting(request.train_start)
            .ending(Some(request.train_end));
        let training = self
            .fetch("training history", &training_request)
            .at_stage(Stage::FetchTraining)?;
        let training_values = training.values();

        info!("Scaling {} training values", training_values.len());
        let transform = ScalingTransform::fit(&training_values).at_stage(Stage::Normalize)?;
        let scaled_training = transform
            .transform(&training_values)
            .at_stage(Stage::Normalize)?;

        let windows = build_windows(&scaled_training, window_len).at_stage(Stage::Window)?;
        let (inputs, targets) = windows_to_arrays(&windows);
        info!("Built {} training windows of {}", windows.len(), window_len);

        let mut model = build_model(&self.config.model).at_stage(Stage::Train)?;
        let training_report = model
            .fit(&inputs, &targets, cancel)
            .at_stage(Stage::Train)?;
        info!(
            "Trained {} for {} epochs, final loss {:?}",
            model.name(),
            training_report.epochs_run,
            training_report.final_loss()
        );

        info!("Fetching held-out history for {}", identifier);
        let test_request =
            HistoryRequest::new(identifier, Period::Max).starting(Some(request.train_end));
        let test = self
            .fetch("held-out history", &test_request)
            .at_stage(Stage::FetchTest)?;
        check_no_overlap(&training, &test).at_stage(Stage::FetchTest)?;

        let actual = test.values();
        if actual.is_empty() {
            return Err(MathError::InsufficientHistory {
                len: 0,
                window_len,
            })
            .at_stage(Stage::Evaluate);
        }

        // Trailing training values warm up the first held-out window
        let mut combined = training.tail_values(window_len);
        combined.extend_from_slice(&actual);
        let scaled_combined = transform.transform(&combined).at_stage(Stage::Evaluate)?;
        let test_windows = build_windows(&scaled_combined, window_len).at_stage(Stage::Evaluate)?;
        let (test_inputs, _) = windows_to_arrays(&test_windows);

        let scaled_predictions = model.predict(&test_inputs).at_stage(Stage::Evaluate)?;
        let predicted: Vec<f64> = scaled_predictions
            .iter()
            .map(|&scaled| transform.invert(scaled))
            .collect();
        let accuracy = final_step_accuracy(&actual, &predicted).at_stage(Stage::Evaluate)?;
        let metrics = forecast_accuracy(&actual, &predicted).at_stage(Stage::Evaluate)?;
        info!(
            "Evaluated {} held-out values: accuracy {:.2}%, RMSE {:.4}",
            actual.len(),
            accuracy,
            metrics.rmse
        );

        let steps = self
            .extrapolate(model.as_ref(), &transform, &scaled_combined, &test)
            .at_stage(Stage::Extrapolate)?;
        let last_actual = actual[actual.len() - 1];
        let final_value = steps
            .last()
            .map(|step| step.value)
            .ok_or_else(|| ForecastError::InvalidParameter("empty forecast horizon".to_string()))
            .at_stage(Stage::Extrapolate)?;
        let increase = percentage_change(last_actual, final_value).at_stage(Stage::Extrapolate)?;
        info!(
            "Forecast {} steps for {}: increase {:.2}%",
            steps.len(),
            identifier,
            increase
        );

        Ok(ForecastResult {
            identifier: identifier.to_string(),
            model_name: model.name().to_string(),
            steps,
            increase,
            accuracy,
            actual,
            predicted,
            metrics,
            training: training_report,
        })
    }

    fn fetch(&self, label: &str, request: &HistoryRequest) -> Result<TimeSeries> {
        let label = format!("Fetching {} for {}", label, request.identifier);
        self.config
            .retry
            .execute(&label, || self.source.fetch(request))
    }

    fn extrapolate(
        &self,
        model: &dyn ForecastModel,
        transform: &ScalingTransform,
        scaled_history: &[f64],
        latest: &TimeSeries,
    ) -> Result<Vec<ForecastStep>> {
        let extrapolator = IterativeExtrapolator::new(model, transform)?;
        let mut steps = extrapolator.extrapolate(scaled_history, self.config.future_days)?;

        if let Some(last) = latest.last() {
            let timestamps =
                future_timestamps(last.timestamp, steps.len(), observation_step(latest));
            for (step, timestamp) in steps.iter_mut().zip(timestamps) {
                step.timestamp = Some(timestamp);
            }
        }

        Ok(steps)
    }
}

fn check_no_overlap(training: &TimeSeries, test: &TimeSeries) -> Result<()> {
    match (training.last(), test.first()) {
        (Some(train_end), Some(test_start)) if test_start.timestamp <= train_end.timestamp => {
            Err(ForecastError::OverlappingHistory {
                train_end: train_end.timestamp,
                test_start: test_start.timestamp,
            })
        }
        _ => Ok(()),
    }
}
