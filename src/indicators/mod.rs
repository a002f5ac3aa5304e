// Technical indicators module
// Rolling intraday store plus the pure helpers it is built from

pub mod atr;
pub mod market_analysis;
pub mod moving_average;
pub mod store;

pub use atr::{average_true_range, true_range, ATR_PERIOD};
pub use market_analysis::{is_bid_heavy, is_volume_spike, market_regime, MarketRegime};
pub use moving_average::{calculate_sma, sma_or_last, trailing_mean};
pub use store::{DayState, IndicatorConfig, IndicatorSnapshot, IndicatorStore};
