//! Date helpers for the price_forecast crate

use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| ForecastError::DataError(format!("Invalid date '{}': {}", input, err)))
}

/// Spacing between the last two observations, one day when undetermined
pub fn observation_step(series: &TimeSeries) -> Duration {
    let observations = series.observations();
    match observations {
        [.., previous, last] if last.timestamp > previous.timestamp => {
            last.timestamp - previous.timestamp
        }
        _ => Duration::days(1),
    }
}

/// Create future timestamps for forecasting
pub fn future_timestamps(
    last_timestamp: DateTime<Utc>,
    horizon: usize,
    step: Duration,
) -> Vec<DateTime<Utc>> {
    let mut timestamps = Vec::with_capacity(horizon);
    let mut current = last_timestamp;

    for _ in 0..horizon {
        current += step;
        timestamps.push(current);
    }

    timestamps
}
