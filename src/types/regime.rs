use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Discrete volatility regime inferred from ATR_pct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

impl VolatilityRegime {
    pub const ALL: [VolatilityRegime; 3] = [
        VolatilityRegime::Low,
        VolatilityRegime::Normal,
        VolatilityRegime::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::Low => "Low",
            VolatilityRegime::Normal => "Normal",
            VolatilityRegime::High => "High",
        }
    }
}

impl FromStr for VolatilityRegime {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(VolatilityRegime::Low),
            "Normal" => Ok(VolatilityRegime::Normal),
            "High" => Ok(VolatilityRegime::High),
            _ => Err(PipelineError::ArtifactContract(format!(
                "unknown regime label: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Three-level discretization of the warning probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// 0.3 and 0.6 fall into the higher tier.
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.3 {
            RiskLevel::Low
        } else if probability < 0.6 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
