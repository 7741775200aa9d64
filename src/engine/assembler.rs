use crate::ml::{RegimeRow, WarningScore};
use crate::types::PredictionRecord;

/// Combine the latest regime row with its warning score.
pub fn assemble(row: &RegimeRow, score: &WarningScore) -> PredictionRecord {
    let ind = &row.indicators;
    PredictionRecord {
        date: ind.bar.date.format("%Y-%m-%d").to_string(),
        regime: row.regime,
        p_low: row.p_low,
        p_normal: row.p_normal,
        p_high: row.p_high,
        days_in_regime: row.days_in_regime,
        atr_pct: ind.atr_pct,
        warning_prob: score.probability,
        warning_signal: u8::from(score.signal),
        risk_level: score.risk_level,
        volume_ratio: ind.volume_ratio,
        distance_sma: ind.distance_from_sma_20,
        momentum_10: ind.momentum_10,
        close: ind.bar.close,
    }
}
