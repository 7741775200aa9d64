use thiserror::Error;

/// Errors surfaced by the volatility pipeline.
///
/// Rows lacking warm-up history or hitting a zero denominator are not errors;
/// they are dropped by the stage that computes them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid time series: {0}")]
    InvalidSeries(String),

    #[error("No fully computed rows remain after the {stage} stage")]
    EmptyResult { stage: &'static str },

    #[error("Model artifact contract violated: {0}")]
    ArtifactContract(String),

    #[error("Feature '{column}' is missing or not finite on the scored row")]
    MissingFeature { column: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
