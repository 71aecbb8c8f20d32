//! Downstream rendering of held-out actuals against predictions
//!
//! The forecasting pipeline never renders anything itself; callers hand a
//! finished [`crate::ForecastResult`] to a sink.

use crate::error::{ForecastError, Result};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Consumer of an actual-vs-predicted comparison
pub trait VisualizationSink {
    fn render(&mut self, actual: &[f64], predicted: &[f64], identifier: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ReportRow {
    index: usize,
    actual: f64,
    predicted: f64,
}

/// Writes `index,actual,predicted` rows for plotting elsewhere
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    path: PathBuf,
}

impl CsvReportSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VisualizationSink for CsvReportSink {
    fn render(&mut self, actual: &[f64], predicted: &[f64], identifier: &str) -> Result<()> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "cannot render {} actuals against {} predictions for {}",
                actual.len(),
                predicted.len(),
                identifier
            )));
        }

        let mut writer = csv::Writer::from_path(&self.path)?;
        for (index, (&actual, &predicted)) in actual.iter().zip(predicted).enumerate() {
            writer.serialize(ReportRow {
                index,
                actual,
                predicted,
            })?;
        }
        writer.flush()?;

        info!(
            "Wrote {} rows for {} to {}",
            actual.len(),
            identifier,
            self.path.display()
        );
        Ok(())
    }
}
