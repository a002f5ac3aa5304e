use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which venue environment the bot talks to
///
/// Paper trading runs against the broker's sandbox, which enforces a much
/// lower request cap than the live gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl TradingMode {
    /// Minimum spacing between two venue calls for this mode
    ///
    /// | mode  | interval |
    /// |-------|----------|
    /// | paper | 3000 ms  |
    /// | live  | 300 ms   |
    pub fn min_request_interval(self) -> Duration {
        match self {
            TradingMode::Paper => Duration::from_millis(3000),
            TradingMode::Live => Duration::from_millis(300),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" | "virtual" => Ok(TradingMode::Paper),
            "live" | "real" => Ok(TradingMode::Live),
            other => Err(format!("unknown trading mode: {}", other)),
        }
    }
}

/// Opaque venue credential, assumed fresh for the duration of a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Latest trade price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub price: f64,
    /// Shares traded so far today (running total, not per tick)
    pub accumulated_volume: f64,
}

/// Remaining quantity at the best bid and best ask
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrderBookTop {
    pub bid_qty: f64,
    pub ask_qty: f64,
}

/// One holding row from the account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u32,
    pub avg_cost: f64,
}

/// Account state as reported by the venue
///
/// `holdings` is `None` when the response carried no holdings section at
/// all, which is different from an account that holds nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    pub holdings: Option<Vec<Holding>>,
    pub total_valuation: Option<f64>,
}

impl AccountSnapshot {
    pub fn find(&self, symbol: &str) -> Option<&Holding> {
        self.holdings
            .as_ref()?
            .iter()
            .find(|h| h.symbol.trim() == symbol.trim())
    }
}

/// Venue acknowledgement for a submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Transaction cost model: commission on both legs, tax on the sell leg only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostModel {
    pub commission_rate: f64,
    pub tax_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            commission_rate: 0.0015,
            tax_rate: 0.0015,
        }
    }
}

impl CostModel {
    /// Net profit in percent of the cost basis after round-trip costs
    ///
    /// Returns 0 when there is no cost basis.
    pub fn net_profit_pct(&self, price: f64, avg_price: f64) -> f64 {
        if avg_price <= 0.0 {
            return 0.0;
        }

        let gross = price - avg_price;
        let commission = (price + avg_price) * self.commission_rate;
        let tax = price * self.tax_rate;

        (gross - commission - tax) / avg_price * 100.0
    }

    /// Realized profit in currency units for a closed round trip
    pub fn net_profit(&self, sell_price: f64, buy_price: f64, quantity: u32) -> f64 {
        let qty = quantity as f64;
        let commission = (sell_price + buy_price) * self.commission_rate * qty;
        let tax = sell_price * self.tax_rate * qty;

        (sell_price - buy_price) * qty - commission - tax
    }
}
