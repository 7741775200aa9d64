use serde::{Deserialize, Serialize};

use super::{RiskLevel, VolatilityRegime};

/// Final output of one pipeline run, keyed by the latest scored date.
///
/// The serialized field set is the contract consumed by report renderers
/// and alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// `YYYY-MM-DD`
    pub date: String,
    pub regime: VolatilityRegime,
    pub p_low: f64,
    pub p_normal: f64,
    pub p_high: f64,
    pub days_in_regime: u32,
    pub atr_pct: f64,
    pub warning_prob: f64,
    /// 1 when `warning_prob > 0.5`, else 0
    pub warning_signal: u8,
    pub risk_level: RiskLevel,
    pub volume_ratio: f64,
    pub distance_sma: f64,
    pub momentum_10: f64,
    pub close: f64,
}

impl PredictionRecord {
    pub fn is_warning(&self) -> bool {
        self.warning_signal == 1
    }

    /// Position sizing guidance for the current regime and warning level
    pub fn recommendation(&self) -> &'static str {
        match self.regime {
            VolatilityRegime::High => "Reduce position size to 25-50% of normal",
            VolatilityRegime::Normal if self.warning_prob > 0.6 => {
                "Caution: High volatility likely coming, reduce to 50-75%"
            }
            VolatilityRegime::Low => "Normal position sizing OK, can use 100-150%",
            VolatilityRegime::Normal => "Normal position sizing OK",
        }
    }
}
