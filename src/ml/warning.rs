use std::sync::Arc;
use tracing::debug;

use super::hmm::RegimeRow;
use super::WarningModel;
use crate::error::{PipelineError, Result};
use crate::indicators::IndicatorColumn;
use crate::types::RiskLevel;

/// Probability above which the warning signal fires
const SIGNAL_THRESHOLD: f64 = 0.5;

/// Forward-looking high-volatility score for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarningScore {
    pub probability: f64,
    pub signal: bool,
    pub risk_level: RiskLevel,
}

impl WarningScore {
    pub fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            signal: probability > SIGNAL_THRESHOLD,
            risk_level: RiskLevel::from_probability(probability),
        }
    }
}

/// Stateless scorer applying the warning model to a single regime row.
pub struct WarningScorer {
    model: Arc<dyn WarningModel + Send + Sync>,
    columns: Vec<IndicatorColumn>,
}

impl WarningScorer {
    /// Resolves the model's declared feature names against the table's
    /// columns; an unknown name is an artifact contract error.
    pub fn new(model: Arc<dyn WarningModel + Send + Sync>) -> Result<Self> {
        let columns = model
            .feature_columns()
            .iter()
            .map(|name| name.parse::<IndicatorColumn>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { model, columns })
    }

    pub fn columns(&self) -> &[IndicatorColumn] {
        &self.columns
    }

    /// Extracts the declared features in declared order.
    pub fn feature_vector(&self, row: &RegimeRow) -> Result<Vec<f64>> {
        self.columns
            .iter()
            .map(|&column| {
                let v = row.value(column);
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(PipelineError::MissingFeature {
                        column: column.to_string(),
                    })
                }
            })
            .collect()
    }

    pub fn score(&self, row: &RegimeRow) -> Result<WarningScore> {
        let features = self.feature_vector(row)?;
        let scaled = self.model.scale(&features)?;
        let [_, positive] = self.model.predict_proba(&scaled)?;
        if !(0.0..=1.0).contains(&positive) {
            return Err(PipelineError::ArtifactContract(format!(
                "warning model returned probability {}",
                positive
            )));
        }

        let score = WarningScore::from_probability(positive);
        debug!(
            "Warning score for {}: p={:.3} signal={} risk={}",
            row.indicators.bar.date, score.probability, score.signal, score.risk_level
        );
        Ok(score)
    }
}
