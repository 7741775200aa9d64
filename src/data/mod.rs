use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::types::{Bar, TimeSeries};

/// Source of daily bars for one instrument.
pub trait BarSource {
    fn load(&self) -> Result<TimeSeries>;
}

/// Row layout of the usual daily-bar export. Other columns (`Adj Close`,
/// dividends, splits) are ignored.
#[derive(Debug, Deserialize)]
struct CsvBar {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

impl CsvBar {
    fn into_bar(self) -> Result<Bar> {
        // Exports may carry a time and offset after the date
        let day = self.date.get(..10).unwrap_or(&self.date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
            PipelineError::InvalidSeries(format!("unparseable date '{}': {}", self.date, e))
        })?;
        Ok(Bar {
            date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Daily bars from a CSV file, optionally trimmed to a trailing window of
/// calendar days.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    path: PathBuf,
    lookback_days: Option<u32>,
}

impl CsvBarSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lookback_days: None,
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = Some(days);
        self
    }
}

impl BarSource for CsvBarSource {
    fn load(&self) -> Result<TimeSeries> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut bars = reader
            .deserialize::<CsvBar>()
            .map(|record| record.map_err(PipelineError::from).and_then(CsvBar::into_bar))
            .collect::<Result<Vec<_>>>()?;
        bars.sort_by_key(|b| b.date);

        let series = TimeSeries::new(bars)?;
        let series = match self.lookback_days {
            Some(days) => series.trailing_days(days),
            None => series,
        };

        if let (Some(first), Some(last)) = (series.bars().first(), series.last()) {
            info!(
                "Loaded {} bars from {} ({} to {})",
                series.len(),
                self.path.display(),
                first.date,
                last.date
            );
        } else {
            debug!("No bars in {}", self.path.display());
        }
        Ok(series)
    }
}
