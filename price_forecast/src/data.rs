//! Time series data handling for forecasting

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed closing value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// When the value was observed
    pub timestamp: DateTime<Utc>,
    /// Observed value in original units
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Chronological series of observations, one value per period
///
/// Timestamps are strictly increasing and every value is finite. The series
/// is immutable once built; range queries return new series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    observations: Vec<Observation>,
}

impl TimeSeries {
    /// Create a series, validating ordering and values
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        if let Some(position) = observations.iter().position(|o| !o.value.is_finite()) {
            return Err(ForecastError::DataError(format!(
                "Non-finite value {} at {}",
                observations[position].value, observations[position].timestamp
            )));
        }

        if let Some(pair) = observations
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(ForecastError::DataError(format!(
                "Timestamps must be strictly increasing: {} is followed by {}",
                pair[0].timestamp, pair[1].timestamp
            )));
        }

        Ok(Self { observations })
    }

    /// Create a series from parallel date and value vectors
    pub fn from_parts(dates: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(ForecastError::DataError(format!(
                "Dates length ({}) doesn't match values length ({})",
                dates.len(),
                values.len()
            )));
        }

        Self::new(
            dates
                .into_iter()
                .zip(values)
                .map(|(timestamp, value)| Observation::new(timestamp, value))
                .collect(),
        )
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the series holds no observations
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// All observations, oldest first
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Observed values, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// Observations with `start <= timestamp < end`; open bounds are unbounded
    pub fn between(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> TimeSeries {
        let observations = self
            .observations
            .iter()
            .filter(|o| start.map_or(true, |s| o.timestamp >= s))
            .filter(|o| end.map_or(true, |e| o.timestamp < e))
            .copied()
            .collect();

        TimeSeries { observations }
    }

    /// The last `n` values, or every value when the series is shorter
    pub fn tail_values(&self, n: usize) -> Vec<f64> {
        let skip = self.observations.len().saturating_sub(n);
        self.observations[skip..].iter().map(|o| o.value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset)
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let result = TimeSeries::from_parts(vec![day(0), day(2), day(1)], vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(ForecastError::DataError(_))));
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let result = TimeSeries::from_parts(vec![day(0), day(0)], vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_between_is_half_open() {
        let series = TimeSeries::from_parts(
            (0..5).map(day).collect(),
            vec![10.0, 11.0, 12.0, 13.0, 14.0],
        )
        .unwrap();

        let middle = series.between(Some(day(1)), Some(day(3)));
        assert_eq!(middle.values(), vec![11.0, 12.0]);

        let open_end = series.between(Some(day(3)), None);
        assert_eq!(open_end.values(), vec![13.0, 14.0]);
    }

    #[test]
    fn test_tail_values() {
        let series = TimeSeries::from_parts((0..4).map(day).collect(), vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();

        assert_eq!(series.tail_values(2), vec![3.0, 4.0]);
        assert_eq!(series.tail_values(10), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
