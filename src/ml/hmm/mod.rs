pub mod gaussian_hmm;
pub mod regime_classifier;

pub use gaussian_hmm::GaussianHMM;
pub use regime_classifier::{days_in_regime, RegimeClassifier, RegimeRow, RegimeTable};

use crate::error::{PipelineError, Result};
use crate::types::VolatilityRegime;

/// Internal state indices of the Low, Normal and High regimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateOrder {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
}

impl StateOrder {
    pub fn as_array(&self) -> [usize; 3] {
        [self.low, self.normal, self.high]
    }

    /// Order must be a permutation of the three state indices and agree with
    /// the label mapping.
    pub fn validate(&self, mapping: &[VolatilityRegime; 3]) -> Result<()> {
        let mut seen = [false; 3];
        for idx in self.as_array() {
            if idx >= 3 || seen[idx] {
                return Err(PipelineError::ArtifactContract(format!(
                    "state order {:?} is not a permutation of 0..3",
                    self.as_array()
                )));
            }
            seen[idx] = true;
        }

        for (idx, expected) in self.as_array().into_iter().zip(VolatilityRegime::ALL) {
            if mapping[idx] != expected {
                return Err(PipelineError::ArtifactContract(format!(
                    "state {} is ordered as {} but mapped to {}",
                    idx, expected, mapping[idx]
                )));
            }
        }
        Ok(())
    }
}

/// Pretrained univariate regime model over ATR_pct.
#[cfg_attr(test, mockall::automock)]
pub trait RegimeModel {
    /// State probabilities for a single observation, indexed by internal state
    fn probabilities(&self, atr_pct: f64) -> [f64; 3];

    /// State probabilities for an ordered sequence of observations.
    ///
    /// Models with temporal structure override this to condition on the
    /// whole sequence.
    fn sequence_probabilities(&self, atr_pcts: &[f64]) -> Vec<[f64; 3]> {
        atr_pcts.iter().map(|x| self.probabilities(*x)).collect()
    }

    fn state_order(&self) -> StateOrder;

    /// Semantic label of each internal state index
    fn state_mapping(&self) -> [VolatilityRegime; 3];
}
