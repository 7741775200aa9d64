use std::sync::Arc;
use tracing::{debug, info};

use super::assemble;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::indicators::{average_true_range, compute_indicators};
use crate::ml::{RegimeClassifier, RegimeModel, RegimeTable, WarningModel, WarningScorer};
use crate::types::{PredictionRecord, TimeSeries};

/// Bars to prediction: range estimator, indicator engine, regime classifier
/// and warning scorer, run in that order.
///
/// Holds no state between runs; the same series always yields the same
/// record.
pub struct Pipeline {
    config: PipelineConfig,
    classifier: RegimeClassifier,
    scorer: WarningScorer,
}

impl Pipeline {
    /// Artifact contracts are checked here, before any bars are processed.
    pub fn new(
        config: PipelineConfig,
        regime_model: Arc<dyn RegimeModel + Send + Sync>,
        warning_model: Arc<dyn WarningModel + Send + Sync>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| PipelineError::Config(errors.join(", ")))?;

        let classifier = RegimeClassifier::new(regime_model);
        classifier.validate()?;
        let scorer = WarningScorer::new(warning_model)?;
        debug!(
            "Warning model features: {}",
            scorer
                .columns()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            config,
            classifier,
            scorer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Every row that survives all warm-ups, oldest first.
    pub fn regime_table(&self, series: &TimeSeries) -> Result<RegimeTable> {
        info!("Processing {} bars for {}", series.len(), self.config.ticker);

        let atr_rows = average_true_range(series, self.config.atr_window);
        info!("Range stage: {} rows with ATR({})", atr_rows.len(), self.config.atr_window);
        if atr_rows.is_empty() {
            return Err(PipelineError::EmptyResult { stage: "range" });
        }

        let indicators = compute_indicators(&atr_rows);
        info!("Indicator stage: {} rows fully computed", indicators.len());
        if indicators.is_empty() {
            return Err(PipelineError::EmptyResult { stage: "indicator" });
        }

        let regimes = self.classifier.classify(&indicators)?;
        info!("Regime stage: {} rows classified", regimes.len());
        if regimes.is_empty() {
            return Err(PipelineError::EmptyResult { stage: "regime" });
        }
        Ok(regimes)
    }

    /// Prediction for the latest fully computed row.
    pub fn run(&self, series: &TimeSeries) -> Result<PredictionRecord> {
        let regimes = self.regime_table(series)?;
        let row = regimes
            .last()
            .ok_or(PipelineError::EmptyResult { stage: "regime" })?;

        let score = self.scorer.score(row)?;
        let record = assemble(row, &score);
        info!(
            "{} on {}: {} regime ({} days), warning p={:.3}, risk {}",
            self.config.ticker,
            record.date,
            record.regime,
            record.days_in_regime,
            record.warning_prob,
            record.risk_level
        );
        Ok(record)
    }

    /// One prediction per regime row, oldest first.
    pub fn score_history(&self, series: &TimeSeries) -> Result<Vec<PredictionRecord>> {
        let regimes = self.regime_table(series)?;
        let records = regimes
            .rows()
            .iter()
            .map(|row| Ok(assemble(row, &self.scorer.score(row)?)))
            .collect::<Result<Vec<_>>>()?;

        let warnings = records.iter().filter(|r| r.is_warning()).count();
        info!(
            "Scored {} rows for {} ({} with warning signal)",
            records.len(),
            self.config.ticker,
            warnings
        );
        Ok(records)
    }
}
