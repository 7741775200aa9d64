use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Pretrained binary classifier over the indicator vector, paired with the
/// feature scaling fitted at training time.
pub trait WarningModel {
    /// Ordered feature names; fixes which columns are extracted and in what order
    fn feature_columns(&self) -> &[String];

    fn scale(&self, features: &[f64]) -> Result<Vec<f64>>;

    /// `[p_negative, p_positive]` for a scaled feature vector
    fn predict_proba(&self, scaled: &[f64]) -> Result<[f64; 2]>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerWeights {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// Model weights as persisted (standard scaler + logistic regression coefficients)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelWeights {
    feature_cols: Vec<String>,
    scaler: ScalerWeights,
    coefficients: Vec<f64>,
    intercept: f64,
}

/// Standardized logistic regression predicting a volatility spike within
/// the forecast horizon
#[derive(Debug, Clone)]
pub struct LogisticWarningModel {
    feature_cols: Vec<String>,
    means: Array1<f64>,
    scales: Array1<f64>,
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LogisticWarningModel {
    fn from_weights(weights: ModelWeights) -> Result<Self> {
        let n = weights.feature_cols.len();
        if n == 0 {
            return Err(PipelineError::ArtifactContract(
                "warning model declares no features".to_string(),
            ));
        }
        for (name, len) in [
            ("scaler mean", weights.scaler.mean.len()),
            ("scaler scale", weights.scaler.scale.len()),
            ("coefficients", weights.coefficients.len()),
        ] {
            if len != n {
                return Err(PipelineError::ArtifactContract(format!(
                    "{} has {} entries for {} features",
                    name, len, n
                )));
            }
        }
        if weights.scaler.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(PipelineError::ArtifactContract(
                "scaler scale must be finite and non-zero".to_string(),
            ));
        }

        Ok(Self {
            feature_cols: weights.feature_cols,
            means: Array1::from_vec(weights.scaler.mean),
            scales: Array1::from_vec(weights.scaler.scale),
            coefficients: Array1::from_vec(weights.coefficients),
            intercept: weights.intercept,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let weights: ModelWeights = serde_json::from_str(json)?;
        Self::from_weights(weights)
    }

    pub fn load_from_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let model = Self::from_json(&json)?;
        info!(
            "Loaded warning model from {} ({} features)",
            path.as_ref().display(),
            model.feature_cols.len()
        );
        Ok(model)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.feature_cols.len() {
            return Err(PipelineError::ArtifactContract(format!(
                "expected {} features, got {}",
                self.feature_cols.len(),
                len
            )));
        }
        Ok(())
    }
}

impl WarningModel for LogisticWarningModel {
    fn feature_columns(&self) -> &[String] {
        &self.feature_cols
    }

    fn scale(&self, features: &[f64]) -> Result<Vec<f64>> {
        self.check_len(features.len())?;
        let x = ArrayView1::from(features);
        Ok(((&x - &self.means) / &self.scales).to_vec())
    }

    fn predict_proba(&self, scaled: &[f64]) -> Result<[f64; 2]> {
        self.check_len(scaled.len())?;
        let z = self.coefficients.dot(&ArrayView1::from(scaled)) + self.intercept;
        let p = sigmoid(z);
        Ok([1.0 - p, p])
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
