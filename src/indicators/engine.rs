use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{highest, lag, lowest, pct_change, percentile_rank, ratio, rolling, sma, stddev, AtrRow};
use crate::error::PipelineError;
use crate::types::Bar;

const TREND_WINDOW: usize = 20;
const SLOPE_SHIFT: usize = 5;
const CHANNEL_WINDOW: usize = 20;
const HIGH_WINDOW: usize = 252;
const BAND_WINDOW: usize = 20;
/// Width of the volatility band in standard deviations
const BAND_SIGMAS: f64 = 4.0;
const RANK_WINDOW_SHORT: usize = 20;
const RANK_WINDOW_LONG: usize = 50;
const RANGE_WINDOW_SHORT: usize = 10;
const RANGE_WINDOW_LONG: usize = 50;
const VOLUME_WINDOW: usize = 20;
const DRAWDOWN_WINDOW: usize = 20;
const MOMENTUM_SHORT: usize = 10;
const MOMENTUM_LONG: usize = 20;

/// Named columns of the indicator and regime tables.
///
/// Names match the column names the trained artifacts declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    AtrPct,
    Sma20,
    DistanceFromSma20,
    Sma20Slope,
    ChannelPosition,
    DistanceFromHigh,
    BbWidth,
    AtrPercentile20,
    AtrPercentile50,
    RangeContraction,
    VolumeRatio,
    VolumeZScore,
    DollarVolumeRatio,
    Drawdown20,
    Momentum10,
    Momentum20,
    PLow,
    PNormal,
    PHigh,
    DaysInRegime,
    PHighMa5,
    PHighTrend,
}

impl IndicatorColumn {
    pub const ALL: [IndicatorColumn; 27] = [
        IndicatorColumn::Open,
        IndicatorColumn::High,
        IndicatorColumn::Low,
        IndicatorColumn::Close,
        IndicatorColumn::Volume,
        IndicatorColumn::AtrPct,
        IndicatorColumn::Sma20,
        IndicatorColumn::DistanceFromSma20,
        IndicatorColumn::Sma20Slope,
        IndicatorColumn::ChannelPosition,
        IndicatorColumn::DistanceFromHigh,
        IndicatorColumn::BbWidth,
        IndicatorColumn::AtrPercentile20,
        IndicatorColumn::AtrPercentile50,
        IndicatorColumn::RangeContraction,
        IndicatorColumn::VolumeRatio,
        IndicatorColumn::VolumeZScore,
        IndicatorColumn::DollarVolumeRatio,
        IndicatorColumn::Drawdown20,
        IndicatorColumn::Momentum10,
        IndicatorColumn::Momentum20,
        IndicatorColumn::PLow,
        IndicatorColumn::PNormal,
        IndicatorColumn::PHigh,
        IndicatorColumn::DaysInRegime,
        IndicatorColumn::PHighMa5,
        IndicatorColumn::PHighTrend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorColumn::Open => "Open",
            IndicatorColumn::High => "High",
            IndicatorColumn::Low => "Low",
            IndicatorColumn::Close => "Close",
            IndicatorColumn::Volume => "Volume",
            IndicatorColumn::AtrPct => "ATR_pct",
            IndicatorColumn::Sma20 => "SMA_20",
            IndicatorColumn::DistanceFromSma20 => "Distance_from_SMA_20",
            IndicatorColumn::Sma20Slope => "SMA_20_Slope",
            IndicatorColumn::ChannelPosition => "Channel_Position",
            IndicatorColumn::DistanceFromHigh => "Distance_from_High",
            IndicatorColumn::BbWidth => "BB_Width",
            IndicatorColumn::AtrPercentile20 => "ATR_Percentile_20",
            IndicatorColumn::AtrPercentile50 => "ATR_Percentile_50",
            IndicatorColumn::RangeContraction => "Range_Contraction",
            IndicatorColumn::VolumeRatio => "Volume_Ratio",
            IndicatorColumn::VolumeZScore => "Volume_ZScore",
            IndicatorColumn::DollarVolumeRatio => "Dollar_Volume_Ratio",
            IndicatorColumn::Drawdown20 => "Drawdown_20",
            IndicatorColumn::Momentum10 => "Momentum_10",
            IndicatorColumn::Momentum20 => "Momentum_20",
            IndicatorColumn::PLow => "P_Low",
            IndicatorColumn::PNormal => "P_Normal",
            IndicatorColumn::PHigh => "P_High",
            IndicatorColumn::DaysInRegime => "Days_in_Regime",
            IndicatorColumn::PHighMa5 => "P_High_MA_5",
            IndicatorColumn::PHighTrend => "P_High_Trend",
        }
    }
}

impl FromStr for IndicatorColumn {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndicatorColumn::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| {
                PipelineError::ArtifactContract(format!("unknown feature column: {}", s))
            })
    }
}

impl fmt::Display for IndicatorColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One fully warmed-up row of the indicator table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRow {
    pub bar: Bar,
    pub atr_pct: f64,
    pub sma_20: f64,
    pub distance_from_sma_20: f64,
    pub sma_20_slope: f64,
    pub channel_position: f64,
    pub distance_from_high: f64,
    pub bb_width: f64,
    pub atr_percentile_20: f64,
    pub atr_percentile_50: f64,
    pub range_contraction: f64,
    pub volume_ratio: f64,
    pub volume_zscore: f64,
    pub dollar_volume_ratio: f64,
    pub drawdown_20: f64,
    pub momentum_10: f64,
    pub momentum_20: f64,
}

impl IndicatorRow {
    /// Value of a price or indicator column. Regime columns are not part of
    /// this row and yield `None`.
    pub fn value(&self, column: IndicatorColumn) -> Option<f64> {
        let v = match column {
            IndicatorColumn::Open => self.bar.open,
            IndicatorColumn::High => self.bar.high,
            IndicatorColumn::Low => self.bar.low,
            IndicatorColumn::Close => self.bar.close,
            IndicatorColumn::Volume => self.bar.volume,
            IndicatorColumn::AtrPct => self.atr_pct,
            IndicatorColumn::Sma20 => self.sma_20,
            IndicatorColumn::DistanceFromSma20 => self.distance_from_sma_20,
            IndicatorColumn::Sma20Slope => self.sma_20_slope,
            IndicatorColumn::ChannelPosition => self.channel_position,
            IndicatorColumn::DistanceFromHigh => self.distance_from_high,
            IndicatorColumn::BbWidth => self.bb_width,
            IndicatorColumn::AtrPercentile20 => self.atr_percentile_20,
            IndicatorColumn::AtrPercentile50 => self.atr_percentile_50,
            IndicatorColumn::RangeContraction => self.range_contraction,
            IndicatorColumn::VolumeRatio => self.volume_ratio,
            IndicatorColumn::VolumeZScore => self.volume_zscore,
            IndicatorColumn::DollarVolumeRatio => self.dollar_volume_ratio,
            IndicatorColumn::Drawdown20 => self.drawdown_20,
            IndicatorColumn::Momentum10 => self.momentum_10,
            IndicatorColumn::Momentum20 => self.momentum_20,
            IndicatorColumn::PLow
            | IndicatorColumn::PNormal
            | IndicatorColumn::PHigh
            | IndicatorColumn::DaysInRegime
            | IndicatorColumn::PHighMa5
            | IndicatorColumn::PHighTrend => return None,
        };
        Some(v)
    }

    fn is_finite(&self) -> bool {
        IndicatorColumn::ALL
            .iter()
            .filter_map(|c| self.value(*c))
            .all(f64::is_finite)
    }
}

/// Intermediate columns aligned with the ATR rows. Dropped once the derived
/// indicators are built.
struct Columns {
    sma_20: Vec<Option<f64>>,
    sma_20_prev: Vec<Option<f64>>,
    high_20: Vec<Option<f64>>,
    low_20: Vec<Option<f64>>,
    high_252: Vec<Option<f64>>,
    std_20: Vec<Option<f64>>,
    atr_rank_20: Vec<Option<f64>>,
    atr_rank_50: Vec<Option<f64>>,
    avg_range_10: Vec<Option<f64>>,
    avg_range_50: Vec<Option<f64>>,
    vol_ma_20: Vec<Option<f64>>,
    vol_std_20: Vec<Option<f64>>,
    dollar_vol_ma_20: Vec<Option<f64>>,
    peak_20: Vec<Option<f64>>,
    close_prev_10: Vec<Option<f64>>,
    close_prev_20: Vec<Option<f64>>,
}

impl Columns {
    fn new(rows: &[AtrRow]) -> Self {
        let closes: Vec<f64> = rows.iter().map(|r| r.bar.close).collect();
        let highs: Vec<f64> = rows.iter().map(|r| r.bar.high).collect();
        let lows: Vec<f64> = rows.iter().map(|r| r.bar.low).collect();
        let volumes: Vec<f64> = rows.iter().map(|r| r.bar.volume).collect();
        let dollar_volumes: Vec<f64> = rows.iter().map(|r| r.bar.dollar_volume()).collect();
        let range_pcts: Vec<f64> = rows.iter().map(|r| r.bar.range_pct()).collect();
        let atr_pcts: Vec<f64> = rows.iter().map(|r| r.atr_pct).collect();
        let close_col: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();

        let sma_20 = rolling(&closes, TREND_WINDOW, sma);
        Self {
            sma_20_prev: lag(&sma_20, SLOPE_SHIFT),
            sma_20,
            high_20: rolling(&highs, CHANNEL_WINDOW, highest),
            low_20: rolling(&lows, CHANNEL_WINDOW, lowest),
            high_252: rolling(&highs, HIGH_WINDOW, highest),
            std_20: rolling(&closes, BAND_WINDOW, stddev),
            atr_rank_20: rolling(&atr_pcts, RANK_WINDOW_SHORT, percentile_rank),
            atr_rank_50: rolling(&atr_pcts, RANK_WINDOW_LONG, percentile_rank),
            avg_range_10: rolling(&range_pcts, RANGE_WINDOW_SHORT, sma),
            avg_range_50: rolling(&range_pcts, RANGE_WINDOW_LONG, sma),
            vol_ma_20: rolling(&volumes, VOLUME_WINDOW, sma),
            vol_std_20: rolling(&volumes, VOLUME_WINDOW, stddev),
            dollar_vol_ma_20: rolling(&dollar_volumes, VOLUME_WINDOW, sma),
            peak_20: rolling(&closes, DRAWDOWN_WINDOW, highest),
            close_prev_10: lag(&close_col, MOMENTUM_SHORT),
            close_prev_20: lag(&close_col, MOMENTUM_LONG),
        }
    }

    fn row(&self, i: usize, src: &AtrRow) -> Option<IndicatorRow> {
        let bar = &src.bar;
        let close = bar.close;
        let sma_20 = self.sma_20[i]?;
        let high_20 = self.high_20[i]?;
        let low_20 = self.low_20[i]?;
        let high_252 = self.high_252[i]?;
        let vol_ma_20 = self.vol_ma_20[i]?;
        let peak_20 = self.peak_20[i]?;

        let row = IndicatorRow {
            bar: bar.clone(),
            atr_pct: src.atr_pct,
            sma_20,
            distance_from_sma_20: pct_change(close, sma_20)?,
            sma_20_slope: pct_change(sma_20, self.sma_20_prev[i]?)?,
            channel_position: ratio(close - low_20, high_20 - low_20)? * 100.0,
            distance_from_high: pct_change(close, high_252)?,
            bb_width: ratio(BAND_SIGMAS * self.std_20[i]?, sma_20)? * 100.0,
            atr_percentile_20: self.atr_rank_20[i]?,
            atr_percentile_50: self.atr_rank_50[i]?,
            range_contraction: ratio(self.avg_range_10[i]?, self.avg_range_50[i]?)? * 100.0,
            volume_ratio: ratio(bar.volume, vol_ma_20)?,
            volume_zscore: ratio(bar.volume - vol_ma_20, self.vol_std_20[i]?)?,
            dollar_volume_ratio: ratio(bar.dollar_volume(), self.dollar_vol_ma_20[i]?)?,
            drawdown_20: pct_change(close, peak_20)?,
            momentum_10: pct_change(close, self.close_prev_10[i]?)?,
            momentum_20: pct_change(close, self.close_prev_20[i]?)?,
        };
        row.is_finite().then_some(row)
    }
}

/// Indicator table: one row per ATR row with every indicator defined.
#[derive(Debug, Clone, Default)]
pub struct IndicatorTable {
    rows: Vec<IndicatorRow>,
}

impl IndicatorTable {
    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }

    /// ATR_pct column, the sole input of the regime model
    pub fn atr_pcts(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.atr_pct).collect()
    }
}

/// Indicator engine. Rows whose windows are not full, or that hit a zero
/// denominator, are excluded rather than filled.
pub fn compute_indicators(rows: &[AtrRow]) -> IndicatorTable {
    let columns = Columns::new(rows);
    let table: Vec<IndicatorRow> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, src)| columns.row(i, src))
        .collect();

    debug!(
        "Indicator engine: {} of {} rows fully computed",
        table.len(),
        rows.len()
    );

    IndicatorTable { rows: table }
}
