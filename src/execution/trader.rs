use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::Serialize;
use std::sync::Arc;

use super::position::{Position, Reconciliation};
use super::profit_tracker::{ProfitSummary, ProfitTracker};
use super::trade_log::{TradeEvent, TradeEventKind, TradeLog};
use crate::api::{RequestLimiter, Venue};
use crate::error::BotError;
use crate::indicators::{IndicatorConfig, IndicatorSnapshot, IndicatorStore};
use crate::models::{AccessToken, CostModel};
use crate::strategy::{Decision, EntryStage, ExitReason, Strategy};
use crate::Result;

/// Number of events included in a status snapshot
const STATUS_EVENTS: usize = 20;

/// Weekday session window in exchange-local wall clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl TradingHours {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = now.time();
        time >= self.open && time <= self.close
    }
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraderConfig {
    pub symbol: String,
    pub account: String,
    pub indicators: IndicatorConfig,
    pub market_index_ttl: TimeDelta,
    pub hours: TradingHours,
}

impl TraderConfig {
    pub fn new(symbol: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            account: account.into(),
            indicators: IndicatorConfig::default(),
            market_index_ttl: TimeDelta::seconds(10),
            hours: TradingHours::default(),
        }
    }
}

/// Per-symbol trading context
#[derive(Debug)]
pub struct Session {
    pub symbol: String,
    pub account: String,
    token: Option<AccessToken>,
    pub indicators: IndicatorStore,
    pub position: Position,
    trading_day: Option<NaiveDate>,
    index_cache: Option<(NaiveDateTime, f64)>,
}

impl Session {
    pub fn new(symbol: &str, account: &str, indicators: IndicatorConfig) -> Self {
        Self {
            symbol: symbol.trim().to_string(),
            account: account.to_string(),
            token: None,
            indicators: IndicatorStore::new(indicators),
            position: Position::flat(),
            trading_day: None,
            index_cache: None,
        }
    }

    pub fn trading_day(&self) -> Option<NaiveDate> {
        self.trading_day
    }
}

/// Result of one scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No usable price this tick
    Skipped,
    Held,
    Bought {
        quantity: u32,
        price: f64,
        stage: EntryStage,
    },
    Sold {
        quantity: u32,
        price: f64,
        reason: ExitReason,
        profit: f64,
    },
}

/// Read-only view of the trader for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct TraderStatus {
    pub symbol: String,
    pub strategy: String,
    pub trading_day: Option<NaiveDate>,
    pub last_price: f64,
    pub position: Position,
    pub net_profit_pct: f64,
    pub indicators: Option<IndicatorSnapshot>,
    pub profit: ProfitSummary,
    pub recent_events: Vec<TradeEvent>,
}

/// Single-symbol trading loop
///
/// Each tick reads market data, feeds the indicator store, asks the strategy
/// for a decision, places at most one order and reconciles the position with
/// the account. Every venue call waits on the shared [`RequestLimiter`] first.
pub struct Trader {
    venue: Arc<dyn Venue>,
    limiter: Arc<RequestLimiter>,
    strategy: Box<dyn Strategy>,
    costs: CostModel,
    config: TraderConfig,
    session: Session,
    profit: ProfitTracker,
    log: TradeLog,
    last_price: f64,
}

impl Trader {
    pub fn new(
        venue: Arc<dyn Venue>,
        limiter: Arc<RequestLimiter>,
        strategy: Box<dyn Strategy>,
        costs: CostModel,
        config: TraderConfig,
    ) -> Self {
        let session = Session::new(&config.symbol, &config.account, config.indicators.clone());
        Self {
            venue,
            limiter,
            strategy,
            costs,
            config,
            session,
            profit: ProfitTracker::new(costs),
            log: TradeLog::default(),
            last_price: 0.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.session.symbol
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn position(&self) -> Position {
        self.session.position
    }

    pub fn profit(&self) -> &ProfitTracker {
        &self.profit
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.log
    }

    pub fn is_trading_time(&self, now: NaiveDateTime) -> bool {
        self.config.hours.contains(now)
    }

    async fn token(&mut self) -> Result<AccessToken> {
        if let Some(token) = &self.session.token {
            return Ok(token.clone());
        }

        self.limiter.wait_for_next().await;
        let token = self.venue.access_token().await?;
        tracing::debug!("Acquired access token");
        self.session.token = Some(token.clone());
        Ok(token)
    }

    /// Read the balance, reconcile the position and track the valuation
    async fn refresh_account(&mut self, token: &AccessToken) -> Result<Reconciliation> {
        self.limiter.wait_for_next().await;
        let account = self.venue.balance(token, &self.session.account).await?;

        let outcome = self.session.position.reconcile(&account, &self.session.symbol);
        self.profit.track_balance(account.total_valuation);
        Ok(outcome)
    }

    /// Drop the cached token if the venue rejected it
    fn note_failure(&mut self, error: &BotError) {
        if error.is_auth_failure() && self.session.token.take().is_some() {
            tracing::info!(symbol = %self.session.symbol, "Access token rejected, will reacquire");
        }
    }

    /// Prepare a new trading day
    ///
    /// Acquires a fresh token, reads the previous close, clears intraday
    /// history and reloads the position from the account.
    pub async fn start_day(&mut self, date: NaiveDate) -> Result<()> {
        self.session.token = None;
        let token = self.token().await?;

        self.limiter.wait_for_next().await;
        let prev_close = self.venue.prev_close(&token, &self.session.symbol).await?;

        self.session.indicators.set_prev_close(prev_close);
        self.session.indicators.reset_daily();
        self.session.index_cache = None;
        self.session.position.reset();

        self.refresh_account(&token).await?;
        self.session.trading_day = Some(date);

        let position = self.session.position;
        tracing::info!(
            symbol = %self.session.symbol,
            %date,
            prev_close,
            quantity = position.quantity,
            avg_buy_price = position.avg_buy_price,
            "🌅 New trading day"
        );
        self.log.info(
            &self.session.symbol,
            format!("day {} started, prev close {}", date, prev_close),
        );
        Ok(())
    }

    /// Latest reference index, refetched only once the cache has expired
    async fn market_index(&mut self, token: &AccessToken, now: NaiveDateTime) -> Result<Option<f64>> {
        if let Some((fetched_at, value)) = self.session.index_cache {
            if now - fetched_at < self.config.market_index_ttl {
                return Ok(Some(value));
            }
        }

        self.limiter.wait_for_next().await;
        let index = self.venue.market_index(token).await?;
        if let Some(value) = index {
            self.session.index_cache = Some((now, value));
        }
        Ok(index)
    }

    /// Execution strength, book and index for the extended entry filter
    async fn update_order_flow(&mut self, token: &AccessToken, now: NaiveDateTime) -> Result<()> {
        let symbol = self.session.symbol.clone();

        self.limiter.wait_for_next().await;
        let strength = self.venue.tick_strength(token, &symbol).await?;

        self.limiter.wait_for_next().await;
        let book = self.venue.order_book(token, &symbol).await?;

        let index = self.market_index(token, now).await?;

        let store = &mut self.session.indicators;
        store.update_tick_strength(strength);
        store.update_order_book(book);
        if let Some(index) = index {
            store.update_market_index(index);
        }
        Ok(())
    }

    /// Run one tick of the trading loop
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<TickOutcome> {
        if self.session.trading_day != Some(now.date()) {
            self.start_day(now.date()).await?;
        }

        let token = self.token().await?;
        let symbol = self.session.symbol.clone();

        self.limiter.wait_for_next().await;
        let quote = self.venue.quote(&token, &symbol).await?;

        if !quote.price.is_finite() || quote.price <= 0.0 {
            tracing::warn!(symbol = %symbol, price = quote.price, "No usable price, skipping tick");
            return Ok(TickOutcome::Skipped);
        }
        let price = quote.price;
        self.last_price = price;

        if self.strategy.uses_order_flow() {
            self.update_order_flow(&token, now).await?;
        }

        self.session.indicators.add_price(price);
        self.session.indicators.update_accumulated_volume(quote.accumulated_volume);

        let snapshot = self.session.indicators.snapshot(price);
        let decision = self.strategy.evaluate(&snapshot, &self.session.position);
        tracing::debug!(
            symbol = %symbol,
            price,
            short_ma = snapshot.short_ma,
            long_ma = snapshot.long_ma,
            slope = snapshot.slope,
            accel = snapshot.accel,
            momentum = snapshot.instant_momentum,
            atr = snapshot.atr,
            ?decision,
            "Tick evaluated"
        );

        match decision {
            Decision::Hold => Ok(TickOutcome::Held),
            Decision::Buy {
                quantity,
                limit_price,
                stage,
            } => self.execute_buy(&token, quantity, limit_price, stage).await,
            Decision::Sell { quantity, reason } => {
                self.execute_sell(&token, quantity, price, reason).await
            }
        }
    }

    async fn execute_buy(
        &mut self,
        token: &AccessToken,
        quantity: u32,
        limit_price: f64,
        stage: EntryStage,
    ) -> Result<TickOutcome> {
        let symbol = self.session.symbol.clone();

        self.limiter.wait_for_next().await;
        let ack = self
            .venue
            .buy(token, &self.session.account, &symbol, quantity, limit_price)
            .await?;

        self.session.position.apply_buy(quantity, limit_price);
        tracing::info!(
            symbol = %symbol,
            quantity,
            price = limit_price,
            order_id = %ack.order_id,
            "🟢 BUY ({})",
            stage
        );
        self.log.record(&symbol, TradeEventKind::Buy, quantity, limit_price, stage.to_string());

        self.refresh_account(token).await?;
        Ok(TickOutcome::Bought {
            quantity,
            price: limit_price,
            stage,
        })
    }

    async fn execute_sell(
        &mut self,
        token: &AccessToken,
        quantity: u32,
        price: f64,
        reason: ExitReason,
    ) -> Result<TickOutcome> {
        let symbol = self.session.symbol.clone();

        self.limiter.wait_for_next().await;
        let ack = self
            .venue
            .sell(token, &self.session.account, &symbol, quantity, None)
            .await?;

        // Book against the cost basis held before the sale, for the units
        // the account no longer holds
        let before = self.session.position;
        self.session.position.reset();
        let refreshed = self.refresh_account(token).await;
        let sold = match refreshed {
            Ok(_) => before
                .quantity
                .saturating_sub(self.session.position.quantity)
                .min(quantity),
            Err(_) => quantity,
        };
        let profit = self.profit.record_profit(price, before.avg_buy_price, sold);

        tracing::info!(
            symbol = %symbol,
            quantity,
            filled = sold,
            price,
            profit,
            order_id = %ack.order_id,
            "🔴 SELL ({})",
            reason
        );
        self.log.record(&symbol, TradeEventKind::Sell, quantity, price, reason.to_string());

        refreshed?;
        Ok(TickOutcome::Sold {
            quantity,
            price,
            reason,
            profit,
        })
    }

    /// Run a tick, logging and swallowing any failure
    ///
    /// A failed tick is abandoned; the next one starts from whatever state
    /// the completed calls left behind.
    pub async fn run_tick(&mut self, now: NaiveDateTime) -> Option<TickOutcome> {
        match self.tick(now).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.note_failure(&e);
                tracing::warn!(symbol = %self.session.symbol, "Tick abandoned: {}", e);
                self.log.error(&self.session.symbol, e.to_string());
                None
            }
        }
    }

    /// Switch to another instrument
    ///
    /// Intraday history is cleared and the position is reloaded for the new
    /// symbol. If the balance cannot be read the position is set flat. The
    /// next tick starts a fresh day so the previous close is reloaded too.
    pub async fn change_symbol(&mut self, symbol: &str) -> Result<()> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(BotError::InvalidSymbol(symbol.to_string()));
        }

        let previous = std::mem::replace(&mut self.session.symbol, symbol.to_string());
        self.session.indicators.reset_daily();
        self.session.index_cache = None;
        self.session.trading_day = None;
        self.last_price = 0.0;

        let reloaded = match self.token().await {
            Ok(token) => self.refresh_account(&token).await,
            Err(e) => Err(e),
        };

        if let Err(e) = reloaded {
            self.note_failure(&e);
            tracing::warn!(symbol, "Could not reload holdings, assuming flat: {}", e);
            self.session.position.reset();
            self.log.error(symbol, format!("holdings reload failed: {}", e));
            return Err(e);
        }

        tracing::info!(from = %previous, to = symbol, "🔁 Symbol changed");
        self.log.info(symbol, format!("symbol changed from {}", previous));
        Ok(())
    }

    pub fn status(&self) -> TraderStatus {
        let position = self.session.position;
        let indicators =
            (!self.session.indicators.is_empty()).then(|| self.session.indicators.snapshot(self.last_price));

        TraderStatus {
            symbol: self.session.symbol.clone(),
            strategy: self.strategy.name().to_string(),
            trading_day: self.session.trading_day,
            last_price: self.last_price,
            position,
            net_profit_pct: self
                .costs
                .net_profit_pct(self.last_price, position.avg_buy_price),
            indicators,
            profit: self.profit.summary(),
            recent_events: self.log.recent(STATUS_EVENTS),
        }
    }
}
