use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::RegimeModel;
use crate::error::{PipelineError, Result};
use crate::indicators::{lag, rolling, sma, IndicatorColumn, IndicatorRow, IndicatorTable};
use crate::types::VolatilityRegime;

const P_HIGH_MA_WINDOW: usize = 5;
const P_HIGH_TREND_SHIFT: usize = 5;
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Indicator row extended with the regime classifier's outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeRow {
    pub indicators: IndicatorRow,
    pub p_low: f64,
    pub p_normal: f64,
    pub p_high: f64,
    pub regime: VolatilityRegime,
    pub days_in_regime: u32,
    pub p_high_ma_5: f64,
    /// Five-row change of the smoothed high-volatility probability
    pub p_high_trend: f64,
}

impl RegimeRow {
    pub fn value(&self, column: IndicatorColumn) -> f64 {
        match column {
            IndicatorColumn::PLow => self.p_low,
            IndicatorColumn::PNormal => self.p_normal,
            IndicatorColumn::PHigh => self.p_high,
            IndicatorColumn::DaysInRegime => f64::from(self.days_in_regime),
            IndicatorColumn::PHighMa5 => self.p_high_ma_5,
            IndicatorColumn::PHighTrend => self.p_high_trend,
            other => self.indicators.value(other).unwrap_or(f64::NAN),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeTable {
    rows: Vec<RegimeRow>,
}

impl RegimeTable {
    pub fn rows(&self) -> &[RegimeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&RegimeRow> {
        self.rows.last()
    }
}

/// Run length of the current label at each position.
///
/// A left-to-right fold: the count continues while the label repeats and
/// restarts at 1 on every change.
pub fn days_in_regime(labels: &[VolatilityRegime]) -> Vec<u32> {
    let mut prev: Option<(VolatilityRegime, u32)> = None;
    labels
        .iter()
        .map(|&label| {
            let count = match prev {
                Some((prev_label, prev_count)) if prev_label == label => prev_count + 1,
                _ => 1,
            };
            prev = Some((label, count));
            count
        })
        .collect()
}

/// Index of the largest probability; the first wins ties.
fn arg_max(probs: &[f64; 3]) -> usize {
    let mut best = 0;
    for (i, p) in probs.iter().enumerate().skip(1) {
        if *p > probs[best] {
            best = i;
        }
    }
    best
}

/// Applies a pretrained regime model to the ATR_pct column.
pub struct RegimeClassifier {
    model: Arc<dyn RegimeModel + Send + Sync>,
}

impl RegimeClassifier {
    pub fn new(model: Arc<dyn RegimeModel + Send + Sync>) -> Self {
        Self { model }
    }

    pub fn validate(&self) -> Result<()> {
        self.model
            .state_order()
            .validate(&self.model.state_mapping())
    }

    pub fn classify(&self, table: &IndicatorTable) -> Result<RegimeTable> {
        self.validate()?;
        let order = self.model.state_order();
        let mapping = self.model.state_mapping();

        let probabilities = self.model.sequence_probabilities(&table.atr_pcts());
        if probabilities.len() != table.len() {
            return Err(PipelineError::ArtifactContract(format!(
                "regime model returned {} probability rows for {} observations",
                probabilities.len(),
                table.len()
            )));
        }
        if let Some(bad) = probabilities.iter().find(|p| !is_distribution(p)) {
            return Err(PipelineError::ArtifactContract(format!(
                "regime model returned an invalid probability vector: {:?}",
                bad
            )));
        }

        let labels: Vec<VolatilityRegime> = probabilities
            .iter()
            .map(|p| mapping[arg_max(p)])
            .collect();
        let run_lengths = days_in_regime(&labels);

        let p_high: Vec<f64> = probabilities.iter().map(|p| p[order.high]).collect();
        let p_high_ma = rolling(&p_high, P_HIGH_MA_WINDOW, sma);
        let p_high_ma_prev = lag(&p_high_ma, P_HIGH_TREND_SHIFT);

        let rows: Vec<RegimeRow> = table
            .rows()
            .iter()
            .enumerate()
            .filter_map(|(i, indicators)| {
                let p_high_ma_5 = p_high_ma[i]?;
                let p_high_trend = p_high_ma_5 - p_high_ma_prev[i]?;
                Some(RegimeRow {
                    indicators: indicators.clone(),
                    p_low: probabilities[i][order.low],
                    p_normal: probabilities[i][order.normal],
                    p_high: p_high[i],
                    regime: labels[i],
                    days_in_regime: run_lengths[i],
                    p_high_ma_5,
                    p_high_trend,
                })
            })
            .collect();

        debug!(
            "Regime classifier: {} of {} rows past the trend warm-up",
            rows.len(),
            table.len()
        );
        if let Some(last) = rows.last() {
            info!(
                "Regime on {}: {} for {} day(s) (P_High={:.3})",
                last.indicators.bar.date, last.regime, last.days_in_regime, last.p_high
            );
        }

        Ok(RegimeTable { rows })
    }
}

fn is_distribution(p: &[f64; 3]) -> bool {
    p.iter().all(|v| v.is_finite() && *v >= 0.0)
        && (p.iter().sum::<f64>() - 1.0).abs() < PROBABILITY_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{average_true_range, compute_indicators};
    use crate::ml::hmm::{MockRegimeModel, StateOrder};
    use crate::testutil::{trending_series, wavy_series, ThresholdRegimeModel};
    use crate::types::VolatilityRegime::{High, Low, Normal};

    fn indicator_table(n: usize) -> IndicatorTable {
        compute_indicators(&average_true_range(&wavy_series(n), 14))
    }

    #[test]
    fn test_days_in_regime_fold() {
        let labels = [Low, Low, Low, High, High, Low, Normal, Normal];
        assert_eq!(days_in_regime(&labels), vec![1, 2, 3, 1, 2, 1, 1, 2]);
        assert!(days_in_regime(&[]).is_empty());
    }

    #[test]
    fn test_arg_max_first_index_wins_ties() {
        assert_eq!(arg_max(&[0.2, 0.5, 0.3]), 1);
        assert_eq!(arg_max(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(arg_max(&[0.2, 0.4, 0.4]), 1);
    }

    #[test]
    fn test_trend_warm_up_rows_dropped() {
        let table = indicator_table(400);
        let model = ThresholdRegimeModel { low_below: 0.7, high_above: 1.2 };
        let regimes = RegimeClassifier::new(Arc::new(model)).classify(&table).unwrap();
        assert_eq!(regimes.len(), table.len() - 9);
        assert_eq!(regimes.rows()[0].indicators, table.rows()[9]);
    }

    #[test]
    fn test_labels_follow_arg_max_and_counter_is_sequential() {
        let table = indicator_table(600);
        let model = ThresholdRegimeModel { low_below: 0.7, high_above: 1.2 };
        let regimes = RegimeClassifier::new(Arc::new(model)).classify(&table).unwrap();

        let mapping = [Normal, High, Low];
        let order = StateOrder { low: 2, normal: 0, high: 1 };
        for row in regimes.rows() {
            let mut probs = [0.0; 3];
            probs[order.low] = row.p_low;
            probs[order.normal] = row.p_normal;
            probs[order.high] = row.p_high;
            assert_eq!(row.regime, mapping[arg_max(&probs)]);
            assert!((row.p_low + row.p_normal + row.p_high - 1.0).abs() < 1e-9);
        }
        for pair in regimes.rows().windows(2) {
            if pair[1].regime == pair[0].regime {
                assert_eq!(pair[1].days_in_regime, pair[0].days_in_regime + 1);
            } else {
                assert_eq!(pair[1].days_in_regime, 1);
            }
        }
    }

    #[test]
    fn test_counter_spans_dropped_warm_up_rows() {
        let table = compute_indicators(&average_true_range(&trending_series(320), 14));
        let model = ThresholdRegimeModel { low_below: 5.0, high_above: 10.0 };
        let regimes = RegimeClassifier::new(Arc::new(model)).classify(&table).unwrap();
        assert!(regimes.rows().iter().all(|r| r.regime == Low));
        assert_eq!(regimes.rows()[0].days_in_regime, 10);
        assert_eq!(regimes.last().unwrap().days_in_regime as usize, table.len());
        assert!(regimes.rows().iter().all(|r| r.p_high_trend == 0.0));
    }

    #[test]
    fn test_regime_row_exposes_every_column() {
        let table = indicator_table(400);
        let model = ThresholdRegimeModel { low_below: 0.7, high_above: 1.2 };
        let regimes = RegimeClassifier::new(Arc::new(model)).classify(&table).unwrap();
        let row = regimes.last().unwrap();
        for column in IndicatorColumn::ALL {
            assert!(row.value(column).is_finite(), "{}", column);
        }
        assert_eq!(row.value(IndicatorColumn::DaysInRegime), f64::from(row.days_in_regime));
    }

    #[test]
    fn test_inconsistent_state_mapping_is_fatal() {
        let mut model = MockRegimeModel::new();
        model
            .expect_state_order()
            .return_const(StateOrder { low: 0, normal: 1, high: 2 });
        model.expect_state_mapping().return_const([Low, High, Normal]);
        model.expect_sequence_probabilities().never();

        let result = RegimeClassifier::new(Arc::new(model)).classify(&indicator_table(300));
        assert!(matches!(result, Err(PipelineError::ArtifactContract(_))));
    }

    #[test]
    fn test_probability_row_count_mismatch_is_fatal() {
        let mut model = MockRegimeModel::new();
        model
            .expect_state_order()
            .return_const(StateOrder { low: 0, normal: 1, high: 2 });
        model.expect_state_mapping().return_const([Low, Normal, High]);
        model
            .expect_sequence_probabilities()
            .returning(|_| vec![[1.0, 0.0, 0.0]; 3]);

        let result = RegimeClassifier::new(Arc::new(model)).classify(&indicator_table(300));
        assert!(matches!(result, Err(PipelineError::ArtifactContract(_))));
    }

    #[test]
    fn test_non_normalized_probabilities_are_fatal() {
        let mut model = MockRegimeModel::new();
        model
            .expect_state_order()
            .return_const(StateOrder { low: 0, normal: 1, high: 2 });
        model.expect_state_mapping().return_const([Low, Normal, High]);
        model
            .expect_sequence_probabilities()
            .returning(|xs| vec![[0.5, 0.5, 0.5]; xs.len()]);

        let result = RegimeClassifier::new(Arc::new(model)).classify(&indicator_table(300));
        assert!(matches!(result, Err(PipelineError::ArtifactContract(_))));
    }
}
