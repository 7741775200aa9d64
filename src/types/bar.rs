use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One trading day of OHLCV data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// High-low range as a percentage of the close.
    pub fn range_pct(&self) -> f64 {
        self.range() / self.close * 100.0
    }

    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume
    }

    fn validate(&self) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(PipelineError::InvalidSeries(format!(
                "non-positive price on {}",
                self.date
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(PipelineError::InvalidSeries(format!(
                "negative or non-finite volume on {}",
                self.date
            )));
        }
        Ok(())
    }
}

/// Daily bars for a single instrument, ascending by date with no duplicates.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    bars: Vec<Bar>,
}

impl TimeSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        for bar in &bars {
            bar.validate()?;
        }
        if let Some(pair) = bars.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(PipelineError::InvalidSeries(format!(
                "dates must be strictly increasing ({} followed by {})",
                pair[0].date, pair[1].date
            )));
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Keep the bars dated within `days` calendar days of the latest bar.
    /// A window reaching past the earliest representable date keeps every bar.
    pub fn trailing_days(&self, days: u32) -> Self {
        let Some(latest) = self.bars.last() else {
            return Self::default();
        };
        let Some(cutoff) = latest.date.checked_sub_days(Days::new(u64::from(days))) else {
            return self.clone();
        };
        let bars = self
            .bars
            .iter()
            .filter(|b| b.date >= cutoff)
            .cloned()
            .collect();
        Self { bars }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let result = TimeSeries::new(vec![bar(2, 100.0), bar(2, 101.0)]);
        assert!(matches!(result, Err(PipelineError::InvalidSeries(_))));
    }

    #[test]
    fn test_rejects_descending_dates() {
        let result = TimeSeries::new(vec![bar(3, 100.0), bar(2, 101.0)]);
        assert!(matches!(result, Err(PipelineError::InvalidSeries(_))));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let mut bad = bar(2, 100.0);
        bad.low = 0.0;
        assert!(TimeSeries::new(vec![bad]).is_err());
    }

    #[test]
    fn test_rejects_negative_volume() {
        let mut bad = bar(2, 100.0);
        bad.volume = -5.0;
        assert!(TimeSeries::new(vec![bad]).is_err());
    }

    #[test]
    fn test_trailing_days_keeps_window_ending_at_latest_bar() {
        let series = TimeSeries::new((1..=20).map(|d| bar(d, 100.0 + d as f64)).collect()).unwrap();
        let trimmed = series.trailing_days(5);
        assert_eq!(trimmed.len(), 6);
        assert_eq!(trimmed.bars()[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(trimmed.last().unwrap().close, 120.0);
    }

    #[test]
    fn test_trailing_days_beyond_calendar_keeps_everything() {
        let series = TimeSeries::new(vec![bar(2, 100.0), bar(3, 101.0)]).unwrap();
        let trimmed = series.trailing_days(u32::MAX);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.bars(), series.bars());
    }

    #[test]
    fn test_range_pct() {
        let b = bar(2, 100.0);
        assert!((b.range_pct() - 2.0).abs() < 1e-12);
        assert!((b.dollar_volume() - 100_000.0).abs() < 1e-9);
    }
}
