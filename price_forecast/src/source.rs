//! History sources: where closing-price series come from
//!
//! The forecasting core only depends on [`HistorySource`]. Two sources ship
//! with the crate: an in-memory map of series and a directory of CSV files.

use crate::data::{Observation, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::utils::parse_date;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Longest accepted identifier
const MAX_IDENTIFIER_LEN: usize = 10;
/// Longest lookback a period may describe, about 10,000 years
const MAX_LOOKBACK_DAYS: i64 = 365 * 10_000;

/// How far back to look when no explicit start date is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    /// Everything available
    Max,
    Days(u32),
    Weeks(u32),
    Months(u32),
    Years(u32),
}

impl Default for Period {
    fn default() -> Self {
        Period::Max
    }
}

impl Period {
    /// Lookback length, `None` for [`Period::Max`]
    ///
    /// Saturates at roughly 10,000 years.
    pub fn lookback(&self) -> Option<Duration> {
        self.lookback_days()
            .map(|days| Duration::days(days.min(MAX_LOOKBACK_DAYS)))
    }

    fn lookback_days(&self) -> Option<i64> {
        match *self {
            Period::Max => None,
            Period::Days(n) => Some(n as i64),
            Period::Weeks(n) => Some(7 * n as i64),
            Period::Months(n) => Some(30 * n as i64),
            Period::Years(n) => Some(365 * n as i64),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Max => write!(f, "max"),
            Period::Days(n) => write!(f, "{}d", n),
            Period::Weeks(n) => write!(f, "{}wk", n),
            Period::Months(n) => write!(f, "{}mo", n),
            Period::Years(n) => write!(f, "{}y", n),
        }
    }
}

impl FromStr for Period {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "max" {
            return Ok(Period::Max);
        }

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ForecastError::InvalidParameter(format!("Period '{}' has no unit", s)))?;
        let (count, unit) = s.split_at(split);
        let count: u32 = count
            .parse()
            .map_err(|_| ForecastError::InvalidParameter(format!("Period '{}' has no count", s)))?;

        if count == 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Period '{}' must cover at least one unit",
                s
            )));
        }

        let period = match unit {
            "d" => Period::Days(count),
            "wk" => Period::Weeks(count),
            "mo" => Period::Months(count),
            "y" => Period::Years(count),
            other => {
                return Err(ForecastError::InvalidParameter(format!(
                    "Unsupported period unit: {}",
                    other
                )))
            }
        };

        match period.lookback_days() {
            Some(days) if days > MAX_LOOKBACK_DAYS => Err(ForecastError::InvalidParameter(format!(
                "Period '{}' reaches back more than {} days",
                s, MAX_LOOKBACK_DAYS
            ))),
            _ => Ok(period),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = ForecastError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// Parameters of one history lookup
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub identifier: String,
    /// Inclusive lower bound; when absent `period` bounds the lookback
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound; absent means up to the present
    pub end: Option<DateTime<Utc>>,
    pub period: Period,
}

impl HistoryRequest {
    pub fn new(identifier: impl Into<String>, period: Period) -> Self {
        Self {
            identifier: identifier.into(),
            start: None,
            end: None,
            period,
        }
    }

    pub fn starting(mut self, start: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self
    }

    pub fn ending(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end = end;
        self
    }

    /// Restrict a full series to this request's range
    pub fn select(&self, series: &TimeSeries) -> TimeSeries {
        let bounded = series.between(self.start, self.end);
        if self.start.is_some() {
            return bounded;
        }

        match (self.period.lookback(), bounded.last()) {
            (Some(lookback), Some(last)) => {
                let anchor = self.end.unwrap_or(last.timestamp);
                // A lookback past the earliest representable date leaves the start open
                bounded.between(anchor.checked_sub_signed(lookback), None)
            }
            _ => bounded,
        }
    }
}

/// Supplier of chronological closing-price history
pub trait HistorySource {
    /// Fetch the observations matching `request`, oldest first
    fn fetch(&self, request: &HistoryRequest) -> Result<TimeSeries>;
}

impl<S: HistorySource + ?Sized> HistorySource for &S {
    fn fetch(&self, request: &HistoryRequest) -> Result<TimeSeries> {
        (**self).fetch(request)
    }
}

/// Check that an identifier looks like a ticker symbol
///
/// Accepts 1 to 10 characters drawn from uppercase ASCII letters, digits and
/// `.`, `-`, `^`, `=`.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let valid_len = (1..=MAX_IDENTIFIER_LEN).contains(&identifier.len());
    let valid_chars = identifier
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^' | '='));

    if valid_len && valid_chars {
        Ok(())
    } else {
        Err(ForecastError::InvalidParameter(format!(
            "Invalid identifier: '{}'",
            identifier
        )))
    }
}

/// Series held in memory, keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: HashMap<String, TimeSeries>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, identifier: impl Into<String>, series: TimeSeries) -> Self {
        self.insert(identifier, series);
        self
    }

    pub fn insert(&mut self, identifier: impl Into<String>, series: TimeSeries) {
        self.series.insert(identifier.into(), series);
    }
}

impl HistorySource for InMemorySource {
    fn fetch(&self, request: &HistoryRequest) -> Result<TimeSeries> {
        let series = self
            .series
            .get(&request.identifier)
            .ok_or_else(|| ForecastError::DataSource {
                identifier: request.identifier.clone(),
                message: "unknown identifier".to_string(),
                transient: false,
            })?;

        Ok(request.select(series))
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date", alias = "DATE", alias = "timestamp")]
    date: String,
    #[serde(alias = "Close", alias = "CLOSE")]
    close: f64,
}

/// Directory of `<IDENTIFIER>.csv` files with `date` and `close` columns
///
/// Other columns are ignored. Rows must already be in chronological order.
#[derive(Debug, Clone)]
pub struct CsvHistorySource {
    directory: PathBuf,
}

impl CsvHistorySource {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Path of the file backing `identifier`
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.directory.join(format!("{}.csv", identifier))
    }

    /// Read the whole file for `identifier`
    pub fn load(&self, identifier: &str) -> Result<TimeSeries> {
        let path = self.path_for(identifier);
        debug!("Reading history for {} from {}", identifier, path.display());

        let mut reader = csv::Reader::from_path(&path).map_err(|err| {
            let transient = !matches!(err.kind(), csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound);
            ForecastError::DataSource {
                identifier: identifier.to_string(),
                message: format!("cannot open {}: {}", path.display(), err),
                transient,
            }
        })?;

        let mut observations = Vec::new();
        for row in reader.deserialize() {
            let row: CsvRow = row?;
            observations.push(Observation::new(parse_date(&row.date)?, row.close));
        }

        TimeSeries::new(observations)
    }
}

impl HistorySource for CsvHistorySource {
    fn fetch(&self, request: &HistoryRequest) -> Result<TimeSeries> {
        let series = self.load(&request.identifier)?;
        Ok(request.select(&series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset)
    }

    fn sample() -> TimeSeries {
        TimeSeries::from_parts((0..30).map(day).collect(), (0..30).map(|v| v as f64 + 1.0).collect())
            .unwrap()
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("max".parse::<Period>().unwrap(), Period::Max);
        assert_eq!("5d".parse::<Period>().unwrap(), Period::Days(5));
        assert_eq!("2wk".parse::<Period>().unwrap(), Period::Weeks(2));
        assert_eq!("6mo".parse::<Period>().unwrap(), Period::Months(6));
        assert_eq!("10Y".parse::<Period>().unwrap(), Period::Years(10));
        assert!("0d".parse::<Period>().is_err());
        assert!("d".parse::<Period>().is_err());
        assert!("3h".parse::<Period>().is_err());
        assert!("12".parse::<Period>().is_err());
    }

    #[test]
    fn test_oversized_period_is_rejected() {
        assert!("1000000y".parse::<Period>().is_err());
        assert!("4294967295d".parse::<Period>().is_err());
        assert_eq!("10000y".parse::<Period>().unwrap(), Period::Years(10_000));
    }

    #[test]
    fn test_huge_lookback_selects_everything() {
        for period in [Period::Years(1_000_000), Period::Days(u32::MAX), Period::Years(u32::MAX)] {
            let request = HistoryRequest::new("TEST", period).ending(Some(day(20)));
            assert_eq!(request.select(&sample()).len(), 20);
        }
    }

    #[test]
    fn test_period_display_round_trips() {
        for period in [Period::Max, Period::Days(5), Period::Weeks(3), Period::Months(6), Period::Years(2)] {
            assert_eq!(period.to_string().parse::<Period>().unwrap(), period);
        }
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("AAPL").is_ok());
        assert!(validate_identifier("BRK.B").is_ok());
        assert!(validate_identifier("^GSPC").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("aapl").is_err());
        assert!(validate_identifier("WAY-TOO-LONG-SYMBOL").is_err());
        assert!(validate_identifier("A B").is_err());
    }

    #[test]
    fn test_request_with_explicit_range() {
        let request = HistoryRequest::new("TEST", Period::Max)
            .starting(Some(day(5)))
            .ending(Some(day(10)));

        let selected = request.select(&sample());
        assert_eq!(selected.len(), 5);
        assert_eq!(selected.first().unwrap().timestamp, day(5));
    }

    #[test]
    fn test_period_bounds_lookback_without_start() {
        let request = HistoryRequest::new("TEST", Period::Days(7)).ending(Some(day(20)));

        let selected = request.select(&sample());
        assert_eq!(selected.first().unwrap().timestamp, day(13));
        assert_eq!(selected.last().unwrap().timestamp, day(19));
    }

    #[test]
    fn test_period_is_ignored_when_start_given() {
        let request = HistoryRequest::new("TEST", Period::Days(2)).starting(Some(day(25)));
        assert_eq!(request.select(&sample()).len(), 5);
    }

    #[test]
    fn test_in_memory_unknown_identifier_is_permanent() {
        let source = InMemorySource::new().with_series("TEST", sample());
        let err = source
            .fetch(&HistoryRequest::new("OTHER", Period::Max))
            .unwrap_err();

        assert!(matches!(
            err,
            ForecastError::DataSource {
                transient: false,
                ..
            }
        ));
    }
}
