use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Default config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "vol-regime.toml";
const ENV_PREFIX: &str = "VOL_REGIME";

/// Pipeline parameters.
///
/// Keys are camelCase in files; environment overrides arrive lowercased
/// (`VOL_REGIME_ATRWINDOW`), hence the aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Ticker name, used for logging and output only
    pub ticker: String,
    /// Calendar days of history kept before the latest bar
    #[serde(alias = "tickerlookbackdays")]
    pub ticker_lookback_days: u32,
    #[serde(alias = "atrwindow")]
    pub atr_window: usize,
    /// Horizon the warning model was trained for; reporting only
    #[serde(alias = "forecasthorizondays")]
    pub forecast_horizon_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ticker: "QQQ".to_string(),
            ticker_lookback_days: 3650,
            atr_window: 14,
            forecast_horizon_days: 10,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.atr_window == 0 {
            errors.push("atrWindow must be >= 1".to_string());
        }
        if self.ticker_lookback_days == 0 {
            errors.push("tickerLookbackDays must be >= 1".to_string());
        }
        if self.forecast_horizon_days == 0 {
            errors.push("forecastHorizonDays must be >= 1".to_string());
        }
        if self.ticker.trim().is_empty() {
            errors.push("ticker must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Defaults, then the TOML file (if present), then `VOL_REGIME_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        debug!("Loading configuration from {}", path.display());

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config
            .validate()
            .map_err(|errors| PipelineError::Config(errors.join(", ")))?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }
}
