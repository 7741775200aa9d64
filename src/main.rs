mod config;
mod data;
mod engine;
mod error;
mod indicators;
mod ml;
mod types;

#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::PipelineConfig;
use crate::data::{BarSource, CsvBarSource};
use crate::engine::Pipeline;
use crate::ml::{GaussianHMM, LogisticWarningModel};
use crate::types::{PredictionRecord, TimeSeries};

#[derive(Parser)]
#[command(name = "vol-regime")]
#[command(version = "0.1.0")]
#[command(about = "Daily volatility regime classification and spike early warning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct ModelArgs {
    /// Daily bars CSV (Date,Open,High,Low,Close,Volume)
    #[arg(short, long)]
    bars: PathBuf,
    /// Trained regime HMM JSON file
    #[arg(long)]
    regime_model: PathBuf,
    /// Trained warning model JSON file
    #[arg(long)]
    warning_model: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the latest day and score the volatility warning
    Analyze {
        #[command(flatten)]
        models: ModelArgs,
        /// Output JSON file path
        #[arg(short, long, default_value = "results.json")]
        output: PathBuf,
    },
    /// Score every fully computed day in the history
    Backtest {
        #[command(flatten)]
        models: ModelArgs,
        /// Output JSON file path
        #[arg(short, long, default_value = "history.json")]
        output: PathBuf,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Failed to read .env");
        }
    }

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Analyze { models, output } => {
            analyze(config, &models, &output)?;
        }
        Commands::Backtest { models, output } => {
            backtest(config, &models, &output)?;
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn build_pipeline(config: PipelineConfig, models: &ModelArgs) -> Result<Pipeline> {
    let regime_model = GaussianHMM::load_from_json(&models.regime_model)
        .with_context(|| format!("Failed to load regime model {}", models.regime_model.display()))?;
    let warning_model = LogisticWarningModel::load_from_json(&models.warning_model)
        .with_context(|| format!("Failed to load warning model {}", models.warning_model.display()))?;
    Ok(Pipeline::new(config, Arc::new(regime_model), Arc::new(warning_model))?)
}

fn load_bars(config: &PipelineConfig, path: &Path) -> Result<TimeSeries> {
    CsvBarSource::new(path)
        .with_lookback_days(config.ticker_lookback_days)
        .load()
        .with_context(|| format!("Failed to load bars from {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Results written to {}", path.display());
    Ok(())
}

fn analyze(config: PipelineConfig, models: &ModelArgs, output: &Path) -> Result<()> {
    info!(
        "Running {} volatility analysis for {}",
        config.ticker,
        chrono::Local::now().format("%Y-%m-%d")
    );
    let series = load_bars(&config, &models.bars)?;
    let pipeline = build_pipeline(config, models)?;

    let record = pipeline.run(&series)?;
    write_json(output, &record)?;
    print_summary(pipeline.config(), &record);
    Ok(())
}

fn backtest(config: PipelineConfig, models: &ModelArgs, output: &Path) -> Result<()> {
    let series = load_bars(&config, &models.bars)?;
    let pipeline = build_pipeline(config, models)?;

    let history = pipeline.score_history(&series)?;
    if history.is_empty() {
        warn!("No rows scored");
    }
    write_json(output, &history)?;

    let warnings = history.iter().filter(|r| r.is_warning()).count();
    println!(
        "Scored {} days, {} with a volatility warning",
        history.len(),
        warnings
    );
    Ok(())
}

fn print_summary(config: &PipelineConfig, record: &PredictionRecord) {
    println!("\n{} volatility analysis for {}", config.ticker, record.date);
    println!("  Close:            {:.2}", record.close);
    println!(
        "  Regime:           {} ({} day(s); P_Low {:.2}, P_Normal {:.2}, P_High {:.2})",
        record.regime, record.days_in_regime, record.p_low, record.p_normal, record.p_high
    );
    println!("  ATR %:            {:.2}", record.atr_pct);
    println!(
        "  {}-day warning:   {:.1}% ({} risk){}",
        config.forecast_horizon_days,
        record.warning_prob * 100.0,
        record.risk_level,
        if record.is_warning() { " WARNING" } else { "" }
    );
    println!("  Recommendation:   {}", record.recommendation());
}
