use super::{Decision, EntryStage, ExitReason, Strategy, StrategyParams, StrategyVariant};
use crate::execution::Position;
use crate::indicators::{IndicatorSnapshot, MarketRegime};
use crate::models::CostModel;

/// Staged intraday trend follower
///
/// Builds a position one unit at a time:
/// - 0 -> 1 when the day is up and the latest tick is accelerating
/// - 1 -> 2 on a breakout above the average cost
/// - 2 -> 3 while the short average stays above the long one
///
/// and liquidates everything at market on the first exit condition that
/// matches. Buy paths are checked before exits, so a tick that scales in
/// never also sells.
#[derive(Debug, Clone)]
pub struct HybridStrategy {
    params: StrategyParams,
    costs: CostModel,
}

impl HybridStrategy {
    pub fn new(params: StrategyParams, costs: CostModel) -> Self {
        Self { params, costs }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    fn is_extended(&self) -> bool {
        self.params.variant == StrategyVariant::Extended
    }

    /// Day trend and instant momentum both point up
    pub fn buy_ready(&self, s: &IndicatorSnapshot) -> bool {
        let price = s.price;

        if self.is_extended() && s.market_regime == MarketRegime::Down {
            return false;
        }

        let today_open = s.day.today_open.unwrap_or(price);
        let prev_close = s.day.prev_close.unwrap_or(0.0);
        let daily_up = price > today_open && price > prev_close && s.short_ma > s.long_ma;
        if !daily_up {
            return false;
        }

        let instant_good =
            s.slope > 0.0 && s.accel > 0.0 && s.instant_momentum > self.params.entry_momentum_min;
        if !instant_good {
            return false;
        }

        if self.is_extended() {
            return s.market_regime == MarketRegime::Up
                && s.volume_spike
                && s.strong_tick
                && s.bid_heavy;
        }

        true
    }

    fn entry_stage(&self, s: &IndicatorSnapshot, position: &Position) -> Option<EntryStage> {
        match position.quantity {
            0 => self.buy_ready(s).then_some(EntryStage::Initial),
            1 => {
                let breakout =
                    position.avg_buy_price * (1.0 + self.params.scale_in_breakout_pct / 100.0);
                (s.price > breakout).then_some(EntryStage::Breakout)
            }
            _ => (s.short_ma > s.long_ma && s.slope > 0.0).then_some(EntryStage::TrendFollow),
        }
    }

    /// First matching exit condition for an open position
    pub fn exit_reason(&self, s: &IndicatorSnapshot, position: &Position) -> Option<ExitReason> {
        let price = s.price;
        let avg = position.avg_buy_price;
        let p = &self.params;

        let net_pct = self.costs.net_profit_pct(price, avg);
        if net_pct >= p.take_profit_pct {
            return Some(ExitReason::TakeProfit);
        }
        if net_pct <= p.stop_loss_pct {
            return Some(ExitReason::StopLoss);
        }

        if s.slope < 0.0 && s.accel < 0.0 && s.instant_momentum < p.reversal_momentum_max {
            return Some(ExitReason::Reversal);
        }

        if p.exit_below_open && s.day.today_open.is_some_and(|open| price < open) {
            return Some(ExitReason::BelowOpen);
        }

        // Compare against the low before this tick; today_low already includes it
        if p.exit_below_day_low && s.day.prior_low.is_some_and(|low| price < low) {
            return Some(ExitReason::BelowDayLow);
        }

        if s.atr > 0.0 && (price - avg).abs() > p.atr_stop_multiplier * s.atr {
            return Some(ExitReason::AtrStop);
        }

        if p.exit_on_ma_cross && s.short_ma < s.long_ma {
            return Some(ExitReason::MaCross);
        }

        if self.is_extended() && s.weak_tick {
            return Some(ExitReason::WeakTick);
        }

        None
    }
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self::new(StrategyParams::default(), CostModel::default())
    }
}

impl Strategy for HybridStrategy {
    fn evaluate(&self, snapshot: &IndicatorSnapshot, position: &Position) -> Decision {
        let price = snapshot.price;
        if !price.is_finite() || price <= 0.0 {
            return Decision::Hold;
        }

        if position.quantity < self.params.max_stage {
            if let Some(stage) = self.entry_stage(snapshot, position) {
                return Decision::Buy {
                    quantity: 1,
                    limit_price: price,
                    stage,
                };
            }
        }

        if position.quantity > 0 {
            if let Some(reason) = self.exit_reason(snapshot, position) {
                return Decision::Sell {
                    quantity: position.quantity,
                    reason,
                };
            }
        }

        Decision::Hold
    }

    fn name(&self) -> &str {
        match self.params.variant {
            StrategyVariant::Baseline => "hybrid",
            StrategyVariant::Extended => "hybrid-extended",
        }
    }

    fn uses_order_flow(&self) -> bool {
        self.is_extended()
    }
}
