//! Synthetic bar series and deterministic model stubs shared by unit tests.

use chrono::{Duration, NaiveDate};

use crate::error::{PipelineError, Result};
use crate::ml::{RegimeModel, StateOrder, WarningModel};
use crate::types::{Bar, TimeSeries, VolatilityRegime};

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 2).unwrap()
}

/// Steady uptrend with a constant 0.4% daily range and varying volume.
pub fn trending_series(n: usize) -> TimeSeries {
    let bars = (0..n)
        .map(|i| {
            let close = 100.0 * 1.001f64.powi(i as i32);
            Bar {
                date: start_date() + Duration::days(i as i64),
                open: close * 0.9995,
                high: close * 1.002,
                low: close * 0.998,
                close,
                volume: 1_000_000.0 + (i % 7) as f64 * 10_000.0,
            }
        })
        .collect();
    TimeSeries::new(bars).unwrap()
}

/// Oscillating prices with a slow drift, breathing ranges and volume.
pub fn wavy_series(n: usize) -> TimeSeries {
    let bars = (0..n)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + 10.0 * (t / 15.0).sin() + 0.05 * t;
            let half_range = close * (0.004 + 0.006 * (t / 40.0).sin().powi(2));
            Bar {
                date: start_date() + Duration::days(i as i64),
                open: close - half_range * 0.3,
                high: close + half_range,
                low: close - half_range,
                close,
                volume: 1_000_000.0 * (1.0 + 0.3 * (t / 3.0).sin()),
            }
        })
        .collect();
    TimeSeries::new(bars).unwrap()
}

/// Regime model that thresholds ATR_pct into one-hot state probabilities.
///
/// Internal state indices are deliberately shuffled: 2 = Low, 0 = Normal,
/// 1 = High.
pub struct ThresholdRegimeModel {
    pub low_below: f64,
    pub high_above: f64,
}

impl RegimeModel for ThresholdRegimeModel {
    fn probabilities(&self, atr_pct: f64) -> [f64; 3] {
        if atr_pct < self.low_below {
            [0.1, 0.0, 0.9]
        } else if atr_pct > self.high_above {
            [0.15, 0.8, 0.05]
        } else {
            [0.7, 0.2, 0.1]
        }
    }

    fn state_order(&self) -> StateOrder {
        StateOrder {
            low: 2,
            normal: 0,
            high: 1,
        }
    }

    fn state_mapping(&self) -> [VolatilityRegime; 3] {
        [
            VolatilityRegime::Normal,
            VolatilityRegime::High,
            VolatilityRegime::Low,
        ]
    }
}

/// Warning model with identity scaling and a fixed positive-class probability.
pub struct FixedWarningModel {
    pub columns: Vec<String>,
    pub probability: f64,
}

impl FixedWarningModel {
    pub fn new(columns: &[&str], probability: f64) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            probability,
        }
    }
}

impl WarningModel for FixedWarningModel {
    fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    fn scale(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.columns.len() {
            return Err(PipelineError::ArtifactContract("length mismatch".to_string()));
        }
        Ok(features.to_vec())
    }

    fn predict_proba(&self, _scaled: &[f64]) -> Result<[f64; 2]> {
        Ok([1.0 - self.probability, self.probability])
    }
}
