use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;
use tracing::info;

use super::{RegimeModel, StateOrder};
use crate::error::{PipelineError, Result};
use crate::types::VolatilityRegime;

const N_STATES: usize = 3;

/// Serialized form of a trained volatility HMM
#[derive(Debug, Deserialize)]
struct HmmArtifact {
    start_prob: Vec<f64>,
    /// Row-major 3x3 transition matrix
    transition: Vec<f64>,
    means: Vec<f64>,
    variances: Vec<f64>,
    /// Internal indices of the Low, Normal and High states
    state_order: [usize; 3],
    state_mapping: HashMap<String, String>,
}

/// 3-state Hidden Markov Model with univariate Gaussian emissions over ATR_pct
#[derive(Debug, Clone)]
pub struct GaussianHMM {
    pub start_prob: Array1<f64>,
    pub transition: Array2<f64>,
    pub means: Array1<f64>,
    pub variances: Array1<f64>,
    state_order: StateOrder,
    state_mapping: [VolatilityRegime; 3],
}

impl GaussianHMM {
    pub fn new(
        start_prob: Array1<f64>,
        transition: Array2<f64>,
        means: Array1<f64>,
        variances: Array1<f64>,
        state_order: StateOrder,
        state_mapping: [VolatilityRegime; 3],
    ) -> Result<Self> {
        if start_prob.len() != N_STATES
            || transition.dim() != (N_STATES, N_STATES)
            || means.len() != N_STATES
            || variances.len() != N_STATES
        {
            return Err(PipelineError::ArtifactContract(
                "HMM parameters must describe exactly 3 states".to_string(),
            ));
        }
        if variances.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(PipelineError::ArtifactContract(
                "HMM variances must be positive".to_string(),
            ));
        }
        if !is_stochastic(start_prob.iter())
            || !transition.rows().into_iter().all(|row| is_stochastic(row.iter()))
        {
            return Err(PipelineError::ArtifactContract(
                "HMM start and transition probabilities must each sum to 1".to_string(),
            ));
        }

        Ok(Self {
            start_prob,
            transition,
            means,
            variances,
            state_order,
            state_mapping,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: HmmArtifact = serde_json::from_str(json)?;

        let mut mapping: [Option<VolatilityRegime>; 3] = [None; 3];
        for (key, label) in &artifact.state_mapping {
            let idx: usize = key.parse().map_err(|_| {
                PipelineError::ArtifactContract(format!("invalid state index: {}", key))
            })?;
            let slot = mapping.get_mut(idx).ok_or_else(|| {
                PipelineError::ArtifactContract(format!("state index out of range: {}", idx))
            })?;
            *slot = Some(label.parse()?);
        }
        let [Some(m0), Some(m1), Some(m2)] = mapping else {
            return Err(PipelineError::ArtifactContract(
                "state mapping must label all 3 states".to_string(),
            ));
        };

        if artifact.transition.len() != N_STATES * N_STATES {
            return Err(PipelineError::ArtifactContract(format!(
                "invalid transition matrix size: {}",
                artifact.transition.len()
            )));
        }
        let transition = Array2::from_shape_vec((N_STATES, N_STATES), artifact.transition)
            .map_err(|e| PipelineError::ArtifactContract(e.to_string()))?;

        let [low, normal, high] = artifact.state_order;
        Self::new(
            Array1::from_vec(artifact.start_prob),
            transition,
            Array1::from_vec(artifact.means),
            Array1::from_vec(artifact.variances),
            StateOrder { low, normal, high },
            [m0, m1, m2],
        )
    }

    /// Load HMM from JSON file
    pub fn load_from_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let hmm = Self::from_json(&json)?;
        info!(
            "Loaded regime HMM from {} (state means: {:?})",
            path.as_ref().display(),
            hmm.means.to_vec()
        );
        Ok(hmm)
    }

    fn log_emission_prob(&self, x: f64, state: usize) -> f64 {
        let var = self.variances[state];
        let diff = x - self.means[state];
        -0.5 * ((2.0 * PI * var).ln() + diff * diff / var)
    }

    /// Forward algorithm in log space
    fn forward(&self, emissions: &Array2<f64>) -> Array2<f64> {
        let n_obs = emissions.nrows();
        let mut log_alpha = Array2::from_elem((n_obs, N_STATES), f64::NEG_INFINITY);

        for state in 0..N_STATES {
            log_alpha[[0, state]] = self.start_prob[state].ln() + emissions[[0, state]];
        }

        for t in 1..n_obs {
            for j in 0..N_STATES {
                let terms: Vec<f64> = (0..N_STATES)
                    .map(|i| log_alpha[[t - 1, i]] + self.transition[[i, j]].ln())
                    .collect();
                log_alpha[[t, j]] = log_sum_exp(&terms) + emissions[[t, j]];
            }
        }

        log_alpha
    }

    /// Backward algorithm in log space
    fn backward(&self, emissions: &Array2<f64>) -> Array2<f64> {
        let n_obs = emissions.nrows();
        let mut log_beta = Array2::from_elem((n_obs, N_STATES), f64::NEG_INFINITY);

        for state in 0..N_STATES {
            log_beta[[n_obs - 1, state]] = 0.0;
        }

        for t in (0..n_obs - 1).rev() {
            for i in 0..N_STATES {
                let terms: Vec<f64> = (0..N_STATES)
                    .map(|j| {
                        self.transition[[i, j]].ln() + emissions[[t + 1, j]] + log_beta[[t + 1, j]]
                    })
                    .collect();
                log_beta[[t, i]] = log_sum_exp(&terms);
            }
        }

        log_beta
    }
}

impl RegimeModel for GaussianHMM {
    fn probabilities(&self, atr_pct: f64) -> [f64; 3] {
        let log_joint: Vec<f64> = (0..N_STATES)
            .map(|s| self.start_prob[s].ln() + self.log_emission_prob(atr_pct, s))
            .collect();
        normalize_log(&log_joint)
    }

    /// Smoothed posteriors from forward-backward over the whole sequence
    fn sequence_probabilities(&self, atr_pcts: &[f64]) -> Vec<[f64; 3]> {
        if atr_pcts.is_empty() {
            return Vec::new();
        }

        let emissions = Array2::from_shape_fn((atr_pcts.len(), N_STATES), |(t, s)| {
            self.log_emission_prob(atr_pcts[t], s)
        });
        let log_alpha = self.forward(&emissions);
        let log_beta = self.backward(&emissions);

        (0..atr_pcts.len())
            .map(|t| {
                let log_gamma: Vec<f64> = (0..N_STATES)
                    .map(|s| log_alpha[[t, s]] + log_beta[[t, s]])
                    .collect();
                normalize_log(&log_gamma)
            })
            .collect()
    }

    fn state_order(&self) -> StateOrder {
        self.state_order
    }

    fn state_mapping(&self) -> [VolatilityRegime; 3] {
        self.state_mapping
    }
}

fn is_stochastic<'a>(values: impl Iterator<Item = &'a f64>) -> bool {
    let mut sum = 0.0;
    for v in values {
        if !v.is_finite() || *v < 0.0 {
            return false;
        }
        sum += v;
    }
    (sum - 1.0).abs() < 1e-6
}

fn normalize_log(log_values: &[f64]) -> [f64; 3] {
    let log_norm = log_sum_exp(log_values);
    let mut out = [0.0; 3];
    for (o, v) in out.iter_mut().zip(log_values) {
        *o = (v - log_norm).exp();
    }
    out
}

/// Log-sum-exp trick for numerical stability
fn log_sum_exp(log_values: &[f64]) -> f64 {
    if log_values.is_empty() {
        return f64::NEG_INFINITY;
    }

    let max_val = log_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }

    let sum_exp: f64 = log_values.iter().map(|&v| (v - max_val).exp()).sum();
    max_val + sum_exp.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ARTIFACT: &str = r#"{
        "start_prob": [0.3, 0.3, 0.4],
        "transition": [0.90, 0.05, 0.05,
                       0.05, 0.90, 0.05,
                       0.05, 0.05, 0.90],
        "means": [1.3, 2.6, 0.8],
        "variances": [0.04, 0.36, 0.02],
        "state_order": [2, 0, 1],
        "state_mapping": {"0": "Normal", "1": "High", "2": "Low"}
    }"#;

    #[test]
    fn test_load_from_json() {
        let hmm = GaussianHMM::from_json(ARTIFACT).unwrap();
        assert_eq!(hmm.state_order(), StateOrder { low: 2, normal: 0, high: 1 });
        assert_eq!(
            hmm.state_mapping(),
            [VolatilityRegime::Normal, VolatilityRegime::High, VolatilityRegime::Low]
        );
        assert_eq!(hmm.transition.shape(), &[3, 3]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARTIFACT.as_bytes()).unwrap();
        let hmm = GaussianHMM::load_from_json(file.path()).unwrap();
        assert_eq!(hmm.means.len(), 3);
    }

    #[test]
    fn test_incomplete_mapping_rejected() {
        let json = ARTIFACT.replace(r#", "2": "Low""#, "");
        assert!(matches!(
            GaussianHMM::from_json(&json),
            Err(PipelineError::ArtifactContract(_))
        ));
    }

    #[test]
    fn test_unknown_label_rejected() {
        let json = ARTIFACT.replace("\"Normal\"", "\"Calm\"");
        assert!(GaussianHMM::from_json(&json).is_err());
    }

    #[test]
    fn test_non_stochastic_transition_rejected() {
        let json = ARTIFACT.replace("0.90, 0.05, 0.05,\n", "0.80, 0.05, 0.05,\n");
        assert!(GaussianHMM::from_json(&json).is_err());
    }

    #[test]
    fn test_scalar_probabilities_follow_emission_means() {
        let hmm = GaussianHMM::from_json(ARTIFACT).unwrap();
        let order = hmm.state_order();

        let calm = hmm.probabilities(0.8);
        assert!((calm.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(calm[order.low] > 0.9);

        let stressed = hmm.probabilities(3.0);
        assert!(stressed[order.high] > 0.9);
    }

    #[test]
    fn test_sequence_probabilities_sum_to_one() {
        let hmm = GaussianHMM::from_json(ARTIFACT).unwrap();
        let xs: Vec<f64> = (0..60).map(|i| 0.8 + (i as f64 / 10.0).sin().abs() * 2.0).collect();
        let posteriors = hmm.sequence_probabilities(&xs);
        assert_eq!(posteriors.len(), xs.len());
        for p in posteriors {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
        }
        assert!(hmm.sequence_probabilities(&[]).is_empty());
    }

    #[test]
    fn test_sequence_smooths_isolated_outlier() {
        let hmm = GaussianHMM::from_json(ARTIFACT).unwrap();
        let order = hmm.state_order();
        let mut xs = vec![0.8; 30];
        xs[15] = 1.05;
        let scalar = hmm.probabilities(1.05);
        let smoothed = hmm.sequence_probabilities(&xs)[15];
        assert!(smoothed[order.low] > scalar[order.low]);
    }

    #[test]
    fn test_log_sum_exp() {
        let values = vec![-1.0, -2.0, -3.0];
        let result = log_sum_exp(&values);
        assert!(result > -1.0 && result < 0.0);
    }
}
