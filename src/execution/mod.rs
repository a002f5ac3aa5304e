// Order execution, position tracking and the trading loop
pub mod position;
pub mod profit_tracker;
pub mod trade_log;
pub mod trader;

pub use position::{Position, Reconciliation};
pub use profit_tracker::{ProfitSummary, ProfitTracker};
pub use trade_log::{TradeEvent, TradeEventKind, TradeLog, TRADE_LOG_CAPACITY};
pub use trader::{
    Session, TickOutcome, Trader, TraderConfig, TraderStatus, TradingHours,
};
