use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::atr::{average_true_range, true_range, ATR_PERIOD};
use super::market_analysis::{is_bid_heavy, is_volume_spike, market_regime, MarketRegime};
use super::moving_average::sma_or_last;
use crate::models::OrderBookTop;

/// Window sizes and signal thresholds for the indicator store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub history_limit: usize,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub atr_period: usize,
    pub volume_spike_lookback: usize,
    pub volume_spike_multiplier: f64,
    pub strong_tick_threshold: f64,
    pub weak_tick_threshold: f64,
    pub bid_ask_ratio: f64,
    pub market_trend_lookback: usize,
    pub market_trend_ratio: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            history_limit: 5000,
            short_ma_period: 20,
            long_ma_period: 60,
            atr_period: ATR_PERIOD,
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

/// Per-day reference levels
///
/// `today_open` latches on the first price after a reset. `prior_low` is the
/// running low as it stood before the most recent price was added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayState {
    pub today_open: Option<f64>,
    pub today_high: Option<f64>,
    pub today_low: Option<f64>,
    pub prior_low: Option<f64>,
    pub prev_close: Option<f64>,
}

/// Everything the decision engine looks at for one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub samples: usize,
    pub day: DayState,
    pub short_ma: f64,
    pub long_ma: f64,
    pub slope: f64,
    pub accel: f64,
    pub instant_momentum: f64,
    pub daily_momentum: f64,
    pub atr: f64,
    pub tick_strength: Option<f64>,
    pub volume_spike: bool,
    pub strong_tick: bool,
    pub weak_tick: bool,
    pub bid_heavy: bool,
    pub market_regime: MarketRegime,
}

/// Rolling intraday time series for a single instrument
///
/// Every query degrades to a neutral value (0, or the latest price for the
/// moving averages) when history is too short; nothing here ever fails.
#[derive(Debug, Clone)]
pub struct IndicatorStore {
    config: IndicatorConfig,
    prices: VecDeque<f64>,
    true_ranges: VecDeque<f64>,
    volumes: VecDeque<f64>,
    last_accumulated_volume: Option<f64>,
    index_history: VecDeque<f64>,
    tick_strength: Option<f64>,
    order_book: Option<OrderBookTop>,
    day: DayState,
}

fn push_bounded(series: &mut VecDeque<f64>, value: f64, limit: usize) {
    series.push_back(value);
    while series.len() > limit {
        series.pop_front();
    }
}

impl IndicatorStore {
    pub fn new(config: IndicatorConfig) -> Self {
        Self {
            config,
            prices: VecDeque::new(),
            true_ranges: VecDeque::new(),
            volumes: VecDeque::new(),
            last_accumulated_volume: None,
            index_history: VecDeque::new(),
            tick_strength: None,
            order_book: None,
            day: DayState::default(),
        }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Record a new trade price
    pub fn add_price(&mut self, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!(price, "Ignoring invalid price");
            return;
        }

        let today_open = *self.day.today_open.get_or_insert(price);
        let reference = self.prices.back().copied().unwrap_or(today_open);

        push_bounded(&mut self.prices, price, self.config.history_limit);

        self.day.prior_low = self.day.today_low;
        let high = self.day.today_high.map_or(price, |h| h.max(price));
        let low = self.day.today_low.map_or(price, |l| l.min(price));
        self.day.today_high = Some(high);
        self.day.today_low = Some(low);

        push_bounded(
            &mut self.true_ranges,
            true_range(high, low, reference),
            self.config.atr_period,
        );
    }

    /// Clear intraday history ahead of a new trading day
    ///
    /// The previous close is left alone; set it with [`set_prev_close`](Self::set_prev_close).
    pub fn reset_daily(&mut self) {
        self.prices.clear();
        self.true_ranges.clear();
        self.volumes.clear();
        self.last_accumulated_volume = None;
        self.index_history.clear();
        self.tick_strength = None;
        self.order_book = None;
        self.day = DayState {
            prev_close: self.day.prev_close,
            ..DayState::default()
        };
    }

    pub fn set_prev_close(&mut self, prev_close: f64) {
        self.day.prev_close = Some(prev_close);
    }

    /// Record the day's running volume total
    ///
    /// The difference from the previous total becomes one per-tick sample.
    /// The first total of the day, or one lower than its predecessor, only
    /// sets the baseline.
    pub fn update_accumulated_volume(&mut self, total: f64) {
        if !total.is_finite() || total < 0.0 {
            return;
        }

        if let Some(previous) = self.last_accumulated_volume {
            if total >= previous {
                self.update_volume(total - previous);
            }
        }
        self.last_accumulated_volume = Some(total);
    }

    /// Record the volume traded during one tick
    pub fn update_volume(&mut self, volume: f64) {
        if volume.is_finite() && volume >= 0.0 {
            push_bounded(
                &mut self.volumes,
                volume,
                self.config.volume_spike_lookback + 1,
            );
        }
    }

    pub fn update_tick_strength(&mut self, strength: Option<f64>) {
        self.tick_strength = strength.filter(|s| s.is_finite());
    }

    pub fn update_order_book(&mut self, book: Option<OrderBookTop>) {
        self.order_book = book;
    }

    pub fn update_market_index(&mut self, index: f64) {
        if index.is_finite() && index > 0.0 {
            push_bounded(
                &mut self.index_history,
                index,
                self.config.market_trend_lookback + 1,
            );
        }
    }

    // ---- queries ----

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn last_price(&self) -> f64 {
        self.prices.back().copied().unwrap_or(0.0)
    }

    pub fn day(&self) -> DayState {
        self.day
    }

    pub fn today_open(&self) -> Option<f64> {
        self.day.today_open
    }

    pub fn today_high(&self) -> Option<f64> {
        self.day.today_high
    }

    pub fn today_low(&self) -> Option<f64> {
        self.day.today_low
    }

    pub fn prior_low(&self) -> Option<f64> {
        self.day.prior_low
    }

    pub fn prev_close(&self) -> Option<f64> {
        self.day.prev_close
    }

    pub fn short_ma(&self) -> f64 {
        sma_or_last(&self.prices, self.config.short_ma_period)
    }

    pub fn long_ma(&self) -> f64 {
        sma_or_last(&self.prices, self.config.long_ma_period)
    }

    /// Last two prices, oldest first
    fn last_two(&self) -> Option<(f64, f64)> {
        let n = self.prices.len();
        if n < 2 {
            return None;
        }
        Some((self.prices[n - 2], self.prices[n - 1]))
    }

    /// One-step normalized change: (p[-1] - p[-2]) / p[-2]
    pub fn slope(&self) -> f64 {
        match self.last_two() {
            Some((prev, cur)) if prev != 0.0 => (cur - prev) / prev,
            _ => 0.0,
        }
    }

    /// Second difference: (p[-1] - p[-2]) - (p[-2] - p[-3])
    pub fn accel(&self) -> f64 {
        let n = self.prices.len();
        if n < 3 {
            return 0.0;
        }

        let s1 = self.prices[n - 1] - self.prices[n - 2];
        let s2 = self.prices[n - 2] - self.prices[n - 3];
        s1 - s2
    }

    /// Percent change over the latest tick
    pub fn instant_momentum(&self) -> f64 {
        self.slope() * 100.0
    }

    /// Percent change of `price` against the previous session's close
    pub fn daily_momentum(&self, price: f64) -> f64 {
        match self.day.prev_close {
            Some(prev_close) if prev_close > 0.0 => (price - prev_close) / prev_close * 100.0,
            _ => 0.0,
        }
    }

    pub fn atr(&self) -> f64 {
        average_true_range(&self.true_ranges)
    }

    pub fn tick_strength(&self) -> Option<f64> {
        self.tick_strength
    }

    pub fn volume_spike(&self) -> bool {
        is_volume_spike(
            &self.volumes,
            self.config.volume_spike_lookback,
            self.config.volume_spike_multiplier,
        )
    }

    pub fn strong_tick(&self) -> bool {
        self.tick_strength
            .is_some_and(|s| s > self.config.strong_tick_threshold)
    }

    pub fn weak_tick(&self) -> bool {
        self.tick_strength
            .is_some_and(|s| s < self.config.weak_tick_threshold)
    }

    pub fn bid_heavy(&self) -> bool {
        is_bid_heavy(self.order_book, self.config.bid_ask_ratio)
    }

    pub fn market_regime(&self) -> MarketRegime {
        market_regime(
            &self.index_history,
            self.config.market_trend_lookback,
            self.config.market_trend_ratio,
        )
    }

    pub fn snapshot(&self, price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            price,
            samples: self.prices.len(),
            day: self.day,
            short_ma: self.short_ma(),
            long_ma: self.long_ma(),
            slope: self.slope(),
            accel: self.accel(),
            instant_momentum: self.instant_momentum(),
            daily_momentum: self.daily_momentum(price),
            atr: self.atr(),
            tick_strength: self.tick_strength,
            volume_spike: self.volume_spike(),
            strong_tick: self.strong_tick(),
            weak_tick: self.weak_tick(),
            bid_heavy: self.bid_heavy(),
            market_regime: self.market_regime(),
        }
    }
}

impl Default for IndicatorStore {
    fn default() -> Self {
        Self::new(IndicatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(prices: &[f64]) -> IndicatorStore {
        let mut store = IndicatorStore::default();
        for &p in prices {
            store.add_price(p);
        }
        store
    }

    #[test]
    fn test_first_price_of_the_day() {
        let mut store = IndicatorStore::default();
        store.reset_daily();
        store.set_prev_close(1000.0);
        store.add_price(1010.0);

        assert_eq!(store.daily_momentum(1010.0), 1.0);
        assert_eq!(store.today_open(), Some(1010.0));
        assert_eq!(store.today_high(), Some(1010.0));
        assert_eq!(store.today_low(), Some(1010.0));
    }

    #[test]
    fn test_open_latches_and_extrema_track() {
        let store = store_with(&[100.0, 105.0, 95.0, 101.0]);

        assert_eq!(store.today_open(), Some(100.0));
        assert_eq!(store.today_high(), Some(105.0));
        assert_eq!(store.today_low(), Some(95.0));
        assert_eq!(store.last_price(), 101.0);
    }

    #[test]
    fn test_prior_low_is_the_low_before_latest_price() {
        let store = store_with(&[100.0, 98.0, 97.0]);

        assert_eq!(store.today_low(), Some(97.0));
        assert_eq!(store.prior_low(), Some(98.0));
    }

    #[test]
    fn test_short_history_is_neutral() {
        let empty = IndicatorStore::default();
        assert_eq!(empty.short_ma(), 0.0);
        assert_eq!(empty.long_ma(), 0.0);
        assert_eq!(empty.slope(), 0.0);
        assert_eq!(empty.accel(), 0.0);
        assert_eq!(empty.instant_momentum(), 0.0);
        assert_eq!(empty.atr(), 0.0);

        let one = store_with(&[100.0]);
        assert_eq!(one.short_ma(), 100.0);
        assert_eq!(one.long_ma(), 100.0);
        assert_eq!(one.slope(), 0.0);
        assert_eq!(one.instant_momentum(), 0.0);

        let two = store_with(&[100.0, 101.0]);
        assert_eq!(two.accel(), 0.0);
        assert!(two.slope() > 0.0);
    }

    #[test]
    fn test_moving_averages_fall_back_to_latest_price() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let store = store_with(&prices);

        // 20 points available: mean of 110..=129
        assert_eq!(store.short_ma(), 119.5);
        // fewer than 60 points: latest price
        assert_eq!(store.long_ma(), 129.0);
    }

    #[test]
    fn test_slope_accel_momentum() {
        let store = store_with(&[100.0, 101.0, 103.0]);

        assert!((store.slope() - 2.0 / 101.0).abs() < 1e-12);
        assert_eq!(store.accel(), 1.0);
        assert!((store.instant_momentum() - 200.0 / 101.0).abs() < 1e-12);
    }

    #[test]
    fn test_daily_momentum_without_prev_close() {
        let mut store = store_with(&[100.0]);
        assert_eq!(store.daily_momentum(100.0), 0.0);

        store.set_prev_close(0.0);
        assert_eq!(store.daily_momentum(100.0), 0.0);
    }

    #[test]
    fn test_true_range_window_is_bounded() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        let store = store_with(&prices);

        assert_eq!(store.true_ranges.len(), ATR_PERIOD);
        // Range of the day is 100..104 and every reference lies inside it
        assert_eq!(store.atr(), 4.0);
    }

    #[test]
    fn test_first_true_range_uses_open() {
        let store = store_with(&[100.0]);
        assert_eq!(store.atr(), 0.0);

        let store = store_with(&[100.0, 110.0]);
        // mean of [0, 10]
        assert_eq!(store.atr(), 5.0);
    }

    #[test]
    fn test_price_history_is_bounded() {
        let config = IndicatorConfig {
            history_limit: 10,
            ..IndicatorConfig::default()
        };
        let mut store = IndicatorStore::new(config);
        for i in 0..25 {
            store.add_price(100.0 + i as f64);
        }

        assert_eq!(store.len(), 10);
        assert_eq!(store.prices.front(), Some(&115.0));
        // Day extrema still cover evicted prices
        assert_eq!(store.today_low(), Some(100.0));
    }

    #[test]
    fn test_invalid_prices_are_ignored() {
        let mut store = store_with(&[100.0]);
        store.add_price(0.0);
        store.add_price(f64::NAN);
        store.add_price(-5.0);

        assert_eq!(store.len(), 1);
        assert_eq!(store.today_low(), Some(100.0));
    }

    #[test]
    fn test_queries_are_idempotent() {
        let store = store_with(&[100.0, 102.0, 101.0, 104.0, 103.0]);

        assert_eq!(store.snapshot(103.0), store.snapshot(103.0));
        assert_eq!(store.slope(), store.slope());
        assert_eq!(store.atr(), store.atr());
    }

    #[test]
    fn test_reset_daily_keeps_prev_close() {
        let mut store = store_with(&[100.0, 101.0]);
        store.set_prev_close(99.0);
        store.update_volume(1000.0);
        store.update_tick_strength(Some(120.0));
        store.reset_daily();

        assert!(store.is_empty());
        assert_eq!(store.atr(), 0.0);
        assert_eq!(store.today_open(), None);
        assert_eq!(store.today_high(), None);
        assert_eq!(store.today_low(), None);
        assert_eq!(store.prev_close(), Some(99.0));
        assert_eq!(store.tick_strength(), None);

        store.add_price(105.0);
        assert_eq!(store.today_open(), Some(105.0));
    }

    #[test]
    fn test_accumulated_volume_is_differenced() {
        let mut store = IndicatorStore::default();

        // Steady 1000 shares per tick reported as a running total
        let mut total = 50_000.0;
        for _ in 0..40 {
            store.update_accumulated_volume(total);
            total += 1000.0;
        }
        assert!(!store.volume_spike());

        total += 2500.0;
        store.update_accumulated_volume(total);
        assert!(store.volume_spike());
    }

    #[test]
    fn test_accumulated_volume_baseline() {
        let mut store = IndicatorStore::default();

        for total in [1000.0, 2000.0, 500.0, 1500.0] {
            store.update_accumulated_volume(total);
        }
        // A drop rebases instead of recording a negative sample
        assert_eq!(store.volumes, VecDeque::from([1000.0, 1000.0]));

        store.reset_daily();
        store.update_accumulated_volume(90_000.0);
        assert!(store.volumes.is_empty());
        store.update_accumulated_volume(91_000.0);
        assert_eq!(store.volumes, VecDeque::from([1000.0]));
    }

    #[test]
    fn test_extended_signals() {
        let mut store = IndicatorStore::default();

        for _ in 0..30 {
            store.update_volume(1000.0);
            store.update_market_index(300.0);
        }
        assert!(!store.volume_spike());
        store.update_volume(2500.0);
        assert!(store.volume_spike());
        assert_eq!(store.market_regime(), MarketRegime::Up);

        store.update_tick_strength(Some(115.0));
        assert!(store.strong_tick());
        assert!(!store.weak_tick());

        store.update_tick_strength(Some(80.0));
        assert!(!store.strong_tick());
        assert!(store.weak_tick());

        store.update_order_book(Some(OrderBookTop {
            bid_qty: 500.0,
            ask_qty: 300.0,
        }));
        assert!(store.bid_heavy());

        store.update_market_index(290.0);
        assert_eq!(store.market_regime(), MarketRegime::Down);
    }
}
