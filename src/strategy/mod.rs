// Trading strategy module
pub mod hybrid;

pub use hybrid::HybridStrategy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;
use crate::execution::Position;
use crate::indicators::{IndicatorConfig, IndicatorSnapshot};
use crate::Result;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Decide what to do with the current position given this tick's indicators
    ///
    /// Pure: the same snapshot and position always give the same decision.
    fn evaluate(&self, snapshot: &IndicatorSnapshot, position: &Position) -> Decision;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Whether the trader should fetch execution strength, order book and
    /// market index every tick
    fn uses_order_flow(&self) -> bool {
        false
    }
}

/// Which entry/exit rule set to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyVariant {
    /// Price, moving averages and momentum only
    #[default]
    Baseline,
    /// Baseline plus volume, execution strength, order book and market regime
    Extended,
}

impl fmt::Display for StrategyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyVariant::Baseline => write!(f, "baseline"),
            StrategyVariant::Extended => write!(f, "extended"),
        }
    }
}

impl FromStr for StrategyVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "basic" => Ok(StrategyVariant::Baseline),
            "extended" | "pro" => Ok(StrategyVariant::Extended),
            other => Err(format!("unknown strategy variant: {}", other)),
        }
    }
}

/// Which buy path fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStage {
    /// 0 -> 1 unit
    Initial,
    /// 1 -> 2 units on a breakout above the average cost
    Breakout,
    /// 2 -> 3 units while the trend is intact
    TrendFollow,
}

impl fmt::Display for EntryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStage::Initial => write!(f, "initial entry"),
            EntryStage::Breakout => write!(f, "breakout scale-in"),
            EntryStage::TrendFollow => write!(f, "trend scale-in"),
        }
    }
}

/// First exit condition that matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Reversal,
    BelowOpen,
    BelowDayLow,
    AtrStop,
    MaCross,
    WeakTick,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExitReason::TakeProfit => "take profit",
            ExitReason::StopLoss => "stop loss",
            ExitReason::Reversal => "momentum reversal",
            ExitReason::BelowOpen => "below today's open",
            ExitReason::BelowDayLow => "broke day low",
            ExitReason::AtrStop => "ATR band",
            ExitReason::MaCross => "moving average cross",
            ExitReason::WeakTick => "weak execution strength",
        };
        write!(f, "{}", text)
    }
}

/// Output of a strategy evaluation. At most one order per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Decision {
    Hold,
    Buy {
        quantity: u32,
        limit_price: f64,
        stage: EntryStage,
    },
    /// Full liquidation at market
    Sell { quantity: u32, reason: ExitReason },
}

impl Decision {
    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold)
    }
}

/// Threshold table for the hybrid strategy
///
/// Percentages are in percent units (0.5 means 0.5%), matching the output of
/// [`CostModel::net_profit_pct`](crate::models::CostModel::net_profit_pct)
/// and the momentum queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub variant: StrategyVariant,
    pub short_ma_period: usize,
    pub long_ma_period: usize,

    // Entry
    pub entry_momentum_min: f64,
    pub scale_in_breakout_pct: f64,
    pub max_stage: u32,

    // Exit
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub reversal_momentum_max: f64,
    pub atr_stop_multiplier: f64,
    pub exit_below_open: bool,
    pub exit_below_day_low: bool,
    pub exit_on_ma_cross: bool,

    // Extended signals
    pub volume_spike_lookback: usize,
    pub volume_spike_multiplier: f64,
    pub strong_tick_threshold: f64,
    pub weak_tick_threshold: f64,
    pub bid_ask_ratio: f64,
    pub market_trend_lookback: usize,
    pub market_trend_ratio: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            variant: StrategyVariant::Baseline,
            short_ma_period: 20,
            long_ma_period: 60,
            entry_momentum_min: 0.02,
            scale_in_breakout_pct: 0.2,
            max_stage: 3,
            take_profit_pct: 0.5,
            stop_loss_pct: -0.4,
            reversal_momentum_max: -0.015,
            atr_stop_multiplier: 1.5,
            exit_below_open: true,
            exit_below_day_low: true,
            exit_on_ma_cross: true,
            volume_spike_lookback: 30,
            volume_spike_multiplier: 1.8,
            strong_tick_threshold: 110.0,
            weak_tick_threshold: 90.0,
            bid_ask_ratio: 1.1,
            market_trend_lookback: 20,
            market_trend_ratio: 0.999,
        }
    }
}

impl StrategyParams {
    pub fn extended() -> Self {
        Self {
            variant: StrategyVariant::Extended,
            ..Self::default()
        }
    }

    /// Window sizes and thresholds the indicator store needs
    pub fn indicator_config(&self) -> IndicatorConfig {
        IndicatorConfig {
            short_ma_period: self.short_ma_period,
            long_ma_period: self.long_ma_period,
            volume_spike_lookback: self.volume_spike_lookback,
            volume_spike_multiplier: self.volume_spike_multiplier,
            strong_tick_threshold: self.strong_tick_threshold,
            weak_tick_threshold: self.weak_tick_threshold,
            bid_ask_ratio: self.bid_ask_ratio,
            market_trend_lookback: self.market_trend_lookback,
            market_trend_ratio: self.market_trend_ratio,
            ..IndicatorConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(BotError::InvalidConfig(msg));

        if self.short_ma_period == 0 || self.long_ma_period == 0 {
            return invalid("moving average periods must be positive".to_string());
        }
        if self.short_ma_period >= self.long_ma_period {
            return invalid(format!(
                "short_ma_period ({}) must be below long_ma_period ({})",
                self.short_ma_period, self.long_ma_period
            ));
        }
        if self.take_profit_pct <= self.stop_loss_pct {
            return invalid(format!(
                "take_profit_pct ({}) must exceed stop_loss_pct ({})",
                self.take_profit_pct, self.stop_loss_pct
            ));
        }
        if self.max_stage == 0 {
            return invalid("max_stage must be at least 1".to_string());
        }
        let multipliers = [
            ("scale_in_breakout_pct", self.scale_in_breakout_pct),
            ("atr_stop_multiplier", self.atr_stop_multiplier),
            ("volume_spike_multiplier", self.volume_spike_multiplier),
            ("bid_ask_ratio", self.bid_ask_ratio),
            ("market_trend_ratio", self.market_trend_ratio),
        ];
        for (name, value) in multipliers {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if self.volume_spike_lookback == 0 || self.market_trend_lookback == 0 {
            return invalid("signal lookbacks must be positive".to_string());
        }

        Ok(())
    }
}
