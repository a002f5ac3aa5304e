use serde::Serialize;

use crate::models::CostModel;

/// Session P&L: account valuation drift plus realized trade profit
#[derive(Debug, Clone)]
pub struct ProfitTracker {
    costs: CostModel,
    base_balance: f64,
    last_balance: f64,
    total_realized_profit: f64,
    initialized: bool,
    trades: u32,
    winning_trades: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitSummary {
    pub base_balance: f64,
    pub last_balance: f64,
    pub balance_change: f64,
    pub balance_change_pct: f64,
    pub total_realized_profit: f64,
    pub trades: u32,
    pub winning_trades: u32,
    pub win_rate: f64,
}

impl ProfitTracker {
    pub fn new(costs: CostModel) -> Self {
        Self {
            costs,
            base_balance: 0.0,
            last_balance: 0.0,
            total_realized_profit: 0.0,
            initialized: false,
            trades: 0,
            winning_trades: 0,
        }
    }

    /// Feed the latest account valuation
    ///
    /// The first valuation becomes the base and returns None. Later calls
    /// return the signed change since the previous valuation. A missing
    /// valuation is ignored.
    pub fn track_balance(&mut self, valuation: Option<f64>) -> Option<f64> {
        let now = valuation.filter(|v| v.is_finite())?;

        if !self.initialized {
            self.base_balance = now;
            self.last_balance = now;
            self.initialized = true;
            tracing::info!(balance = now, "💵 Starting balance");
            return None;
        }

        let diff = now - self.last_balance;
        if diff != 0.0 {
            let sign = if diff > 0.0 { "▲" } else { "▼" };
            tracing::info!(
                balance = now,
                "💰 Balance {:.0} ({}{:.0})",
                now,
                sign,
                diff.abs()
            );
        }
        self.last_balance = now;
        Some(diff)
    }

    /// Book the net profit of a round trip and return it
    ///
    /// # Arguments
    /// * `sell_price` - Exit price
    /// * `buy_price` - Average cost of the units sold
    /// * `quantity` - Units sold; zero records nothing
    pub fn record_profit(&mut self, sell_price: f64, buy_price: f64, quantity: u32) -> f64 {
        if quantity == 0 {
            return 0.0;
        }

        let net = self.costs.net_profit(sell_price, buy_price, quantity);
        self.total_realized_profit += net;
        self.trades += 1;
        if net > 0.0 {
            self.winning_trades += 1;
        }

        tracing::info!(
            net_profit = net,
            total = self.total_realized_profit,
            "📈 Trade closed: {:.0} (total {:.0})",
            net,
            self.total_realized_profit
        );
        net
    }

    pub fn base_balance(&self) -> f64 {
        self.base_balance
    }

    pub fn last_balance(&self) -> f64 {
        self.last_balance
    }

    pub fn total_realized_profit(&self) -> f64 {
        self.total_realized_profit
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn trades(&self) -> u32 {
        self.trades
    }

    pub fn balance_change(&self) -> f64 {
        if !self.initialized {
            return 0.0;
        }
        self.last_balance - self.base_balance
    }

    pub fn balance_change_pct(&self) -> f64 {
        if !self.initialized || self.base_balance == 0.0 {
            return 0.0;
        }
        self.balance_change() / self.base_balance * 100.0
    }

    pub fn summary(&self) -> ProfitSummary {
        let win_rate = if self.trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.trades as f64 * 100.0
        };

        ProfitSummary {
            base_balance: self.base_balance,
            last_balance: self.last_balance,
            balance_change: self.balance_change(),
            balance_change_pct: self.balance_change_pct(),
            total_realized_profit: self.total_realized_profit,
            trades: self.trades,
            winning_trades: self.winning_trades,
            win_rate,
        }
    }
}

impl Default for ProfitTracker {
    fn default() -> Self {
        Self::new(CostModel::default())
    }
}
