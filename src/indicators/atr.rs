use std::collections::VecDeque;

use crate::types::{Bar, TimeSeries};

/// Simple-average true range over a fixed window of bars.
///
/// The first bar only seeds the previous close; its true range is never
/// counted.
#[derive(Debug, Clone)]
pub struct ATR {
    period: usize,
    prev_close: Option<f64>,
    true_ranges: VecDeque<f64>,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            true_ranges: VecDeque::with_capacity(period),
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let prev_close = self.prev_close.replace(close)?;

        self.true_ranges.push_back(true_range(high, low, prev_close));
        if self.true_ranges.len() > self.period {
            self.true_ranges.pop_front();
        }

        if self.period == 0 || self.true_ranges.len() < self.period {
            return None;
        }

        Some(self.true_ranges.iter().sum::<f64>() / self.period as f64)
    }
}

pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// A bar extended with its average true range.
#[derive(Debug, Clone, PartialEq)]
pub struct AtrRow {
    pub bar: Bar,
    pub atr: f64,
    /// ATR as a percentage of the same bar's close
    pub atr_pct: f64,
}

/// Range estimator: attaches ATR and ATR_pct to every bar that has a full
/// window of true ranges behind it. Warm-up bars are dropped.
pub fn average_true_range(series: &TimeSeries, period: usize) -> Vec<AtrRow> {
    let mut atr = ATR::new(period);
    series
        .bars()
        .iter()
        .filter_map(|bar| {
            let value = atr.update(bar.high, bar.low, bar.close)?;
            let atr_pct = value / bar.close * 100.0;
            atr_pct.is_finite().then(|| AtrRow {
                bar: bar.clone(),
                atr: value,
                atr_pct,
            })
        })
        .collect()
}
