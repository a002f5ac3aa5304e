use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::Venue;
use crate::error::BotError;
use crate::models::{
    AccessToken, AccountSnapshot, CostModel, Holding, OrderAck, OrderBookTop, Quote, TradeSide,
};
use crate::Result;

/// Source of prices for the simulated venue
#[derive(Debug)]
pub enum PricePath {
    /// Fixed sequence; the last price repeats once it runs out
    Scripted(VecDeque<f64>),
    /// Seeded random walk (multiplicative, rounded to whole units)
    RandomWalk {
        rng: StdRng,
        drift: f64,
        volatility: f64,
    },
}

impl PricePath {
    pub fn scripted(prices: impl IntoIterator<Item = f64>) -> Self {
        PricePath::Scripted(prices.into_iter().collect())
    }

    /// Create a random walk with a seed for reproducibility
    pub fn random_walk(seed: u64, drift: f64, volatility: f64) -> Self {
        PricePath::RandomWalk {
            rng: StdRng::seed_from_u64(seed),
            drift,
            volatility,
        }
    }

    fn next_price(&mut self, last: f64) -> f64 {
        match self {
            PricePath::Scripted(prices) => prices.pop_front().unwrap_or(last),
            PricePath::RandomWalk {
                rng,
                drift,
                volatility,
            } => {
                let shock: f64 = rng.gen_range(-1.0..1.0);
                let next = last * (1.0 + *drift + *volatility * shock);
                next.round().max(1.0)
            }
        }
    }

    fn next_volume(&mut self) -> f64 {
        match self {
            PricePath::Scripted(_) => 1_000.0,
            PricePath::RandomWalk { rng, .. } => {
                // Occasional bursts so the volume-spike filter has something to see
                if rng.gen_bool(0.05) {
                    rng.gen_range(5_000.0..10_000.0)
                } else {
                    rng.gen_range(500.0..1_500.0)
                }
            }
        }
    }
}

/// A fill executed by the simulated venue
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedFill {
    pub side: TradeSide,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug)]
struct MarketState {
    path: PricePath,
    last_price: f64,
    prev_close: f64,
    scripted_volumes: VecDeque<f64>,
    accumulated_volume: f64,
    tick_strength: Option<f64>,
    order_book: Option<OrderBookTop>,
    market_index: Option<f64>,
}

#[derive(Debug)]
struct AccountState {
    cash: f64,
    quantity: u32,
    avg_cost: f64,
    fills: Vec<SimulatedFill>,
}

#[derive(Debug, Default)]
struct Behaviour {
    failing: bool,
    leave_orders_unfilled: bool,
    hide_holdings: bool,
    issued_tokens: Vec<String>,
    expired_tokens: HashSet<String>,
}

/// In-memory venue for paper replays and tests
///
/// Orders fill immediately: buys at their limit price, market sells at the
/// last quoted price. Costs follow the configured [`CostModel`] so the
/// reported valuation moves the way a real account would.
pub struct SimulatedVenue {
    symbol: String,
    costs: CostModel,
    market: Mutex<MarketState>,
    account: Mutex<AccountState>,
    behaviour: Mutex<Behaviour>,
    calls: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedVenue {
    pub fn new(symbol: impl Into<String>, start_price: f64, cash: f64, path: PricePath) -> Self {
        Self {
            symbol: symbol.into(),
            costs: CostModel::default(),
            market: Mutex::new(MarketState {
                path,
                last_price: start_price,
                prev_close: start_price,
                scripted_volumes: VecDeque::new(),
                accumulated_volume: 0.0,
                tick_strength: None,
                order_book: None,
                market_index: None,
            }),
            account: Mutex::new(AccountState {
                cash,
                quantity: 0,
                avg_cost: 0.0,
                fills: Vec::new(),
            }),
            behaviour: Mutex::new(Behaviour::default()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_costs(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_prev_close(self, prev_close: f64) -> Self {
        lock(&self.market).prev_close = prev_close;
        self
    }

    /// Start the account already holding a position
    pub fn with_holding(self, quantity: u32, avg_cost: f64) -> Self {
        {
            let mut account = lock(&self.account);
            account.quantity = quantity;
            account.avg_cost = if quantity == 0 { 0.0 } else { avg_cost };
        }
        self
    }

    /// Queue per-tick volumes for the next quotes (default 1000 when empty)
    ///
    /// Quotes report them as a running total, like the broker does.
    pub fn push_volumes(&self, volumes: impl IntoIterator<Item = f64>) {
        lock(&self.market).scripted_volumes.extend(volumes);
    }

    pub fn push_prices(&self, prices: impl IntoIterator<Item = f64>) {
        if let PricePath::Scripted(queue) = &mut lock(&self.market).path {
            queue.extend(prices);
        }
    }

    pub fn set_tick_strength(&self, strength: Option<f64>) {
        lock(&self.market).tick_strength = strength;
    }

    pub fn set_order_book(&self, book: Option<OrderBookTop>) {
        lock(&self.market).order_book = book;
    }

    pub fn set_market_index(&self, index: Option<f64>) {
        lock(&self.market).market_index = index;
    }

    /// Make every call fail with a transport-style error
    pub fn set_failing(&self, failing: bool) {
        lock(&self.behaviour).failing = failing;
    }

    /// Acknowledge orders without filling them
    pub fn set_leave_orders_unfilled(&self, unfilled: bool) {
        lock(&self.behaviour).leave_orders_unfilled = unfilled;
    }

    /// Reject every token issued so far with a 401
    pub fn expire_tokens(&self) {
        let mut behaviour = lock(&self.behaviour);
        let issued = std::mem::take(&mut behaviour.issued_tokens);
        behaviour.expired_tokens.extend(issued);
    }

    /// Number of access tokens handed out so far
    pub fn tokens_issued(&self) -> usize {
        let behaviour = lock(&self.behaviour);
        behaviour.issued_tokens.len() + behaviour.expired_tokens.len()
    }

    /// Omit the holdings section from balance responses
    pub fn set_hide_holdings(&self, hide: bool) {
        lock(&self.behaviour).hide_holdings = hide;
    }

    pub fn fills(&self) -> Vec<SimulatedFill> {
        lock(&self.account).fills.clone()
    }

    pub fn holding(&self) -> (u32, f64) {
        let account = lock(&self.account);
        (account.quantity, account.avg_cost)
    }

    pub fn last_price(&self) -> f64 {
        lock(&self.market).last_price
    }

    /// Number of venue calls received so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, endpoint: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if lock(&self.behaviour).failing {
            return Err(BotError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }
        Ok(())
    }

    /// Count the call, then check the token is still honoured
    fn enter_with(&self, endpoint: &str, token: &AccessToken) -> Result<()> {
        self.enter(endpoint)?;

        if lock(&self.behaviour).expired_tokens.contains(token.as_str()) {
            return Err(BotError::Status {
                endpoint: endpoint.to_string(),
                status: 401,
            });
        }
        Ok(())
    }

    fn check_symbol(&self, symbol: &str) -> Result<()> {
        if symbol.trim() != self.symbol {
            return Err(BotError::InvalidSymbol(symbol.to_string()));
        }
        Ok(())
    }

    fn ack(side: TradeSide) -> OrderAck {
        OrderAck {
            order_id: Uuid::new_v4().to_string(),
            message: format!("{:?} accepted", side),
        }
    }
}

#[async_trait]
impl Venue for SimulatedVenue {
    async fn access_token(&self) -> Result<AccessToken> {
        self.enter("token")?;

        let token = format!("paper-{}", Uuid::new_v4());
        lock(&self.behaviour).issued_tokens.push(token.clone());
        Ok(AccessToken(token))
    }

    async fn quote(&self, token: &AccessToken, symbol: &str) -> Result<Quote> {
        self.enter_with("quote", token)?;
        self.check_symbol(symbol)?;

        let mut market = lock(&self.market);
        let last = market.last_price;
        let price = market.path.next_price(last);
        let traded = match market.scripted_volumes.pop_front() {
            Some(volume) => volume,
            None => market.path.next_volume(),
        };
        market.accumulated_volume += traded;
        market.last_price = price;

        Ok(Quote {
            price,
            accumulated_volume: market.accumulated_volume,
        })
    }

    async fn prev_close(&self, token: &AccessToken, symbol: &str) -> Result<f64> {
        self.enter_with("prev_close", token)?;
        self.check_symbol(symbol)?;
        Ok(lock(&self.market).prev_close)
    }

    async fn balance(&self, token: &AccessToken, _account: &str) -> Result<AccountSnapshot> {
        self.enter_with("balance", token)?;

        let last_price = lock(&self.market).last_price;
        let hide_holdings = lock(&self.behaviour).hide_holdings;
        let account = lock(&self.account);

        let holdings = if hide_holdings {
            None
        } else if account.quantity > 0 {
            Some(vec![Holding {
                symbol: self.symbol.clone(),
                quantity: account.quantity,
                avg_cost: account.avg_cost,
            }])
        } else {
            Some(Vec::new())
        };

        Ok(AccountSnapshot {
            holdings,
            total_valuation: Some(account.cash + account.quantity as f64 * last_price),
        })
    }

    async fn buy(
        &self,
        token: &AccessToken,
        _account: &str,
        symbol: &str,
        quantity: u32,
        limit_price: f64,
    ) -> Result<OrderAck> {
        self.enter_with("buy", token)?;
        self.check_symbol(symbol)?;

        if quantity == 0 || limit_price <= 0.0 {
            return Err(BotError::Rejected {
                reason: "quantity and price must be positive".to_string(),
            });
        }
        if lock(&self.behaviour).leave_orders_unfilled {
            return Ok(Self::ack(TradeSide::Buy));
        }

        let mut account = lock(&self.account);
        let cost = limit_price * quantity as f64;
        let commission = cost * self.costs.commission_rate;
        if account.cash < cost + commission {
            return Err(BotError::Rejected {
                reason: "insufficient cash".to_string(),
            });
        }

        let held = account.quantity as f64;
        account.avg_cost = (account.avg_cost * held + cost) / (held + quantity as f64);
        account.quantity += quantity;
        account.cash -= cost + commission;
        account.fills.push(SimulatedFill {
            side: TradeSide::Buy,
            quantity,
            price: limit_price,
        });

        Ok(Self::ack(TradeSide::Buy))
    }

    async fn sell(
        &self,
        token: &AccessToken,
        _account: &str,
        symbol: &str,
        quantity: u32,
        limit_price: Option<f64>,
    ) -> Result<OrderAck> {
        self.enter_with("sell", token)?;
        self.check_symbol(symbol)?;

        if lock(&self.behaviour).leave_orders_unfilled {
            return Ok(Self::ack(TradeSide::Sell));
        }

        let price = match limit_price.filter(|p| *p > 0.0) {
            Some(price) => price,
            None => lock(&self.market).last_price,
        };

        let mut account = lock(&self.account);
        if quantity == 0 || quantity > account.quantity {
            return Err(BotError::Rejected {
                reason: format!("cannot sell {} of {} held", quantity, account.quantity),
            });
        }

        let proceeds = price * quantity as f64;
        account.cash += proceeds - proceeds * (self.costs.commission_rate + self.costs.tax_rate);
        account.quantity -= quantity;
        if account.quantity == 0 {
            account.avg_cost = 0.0;
        }
        account.fills.push(SimulatedFill {
            side: TradeSide::Sell,
            quantity,
            price,
        });

        Ok(Self::ack(TradeSide::Sell))
    }

    async fn order_book(&self, token: &AccessToken, symbol: &str) -> Result<Option<OrderBookTop>> {
        self.enter_with("order_book", token)?;
        self.check_symbol(symbol)?;
        Ok(lock(&self.market).order_book)
    }

    async fn tick_strength(&self, token: &AccessToken, symbol: &str) -> Result<Option<f64>> {
        self.enter_with("tick_strength", token)?;
        self.check_symbol(symbol)?;
        Ok(lock(&self.market).tick_strength)
    }

    async fn market_index(&self, token: &AccessToken) -> Result<Option<f64>> {
        self.enter_with("market_index", token)?;
        Ok(lock(&self.market).market_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccessToken {
        AccessToken("paper".to_string())
    }

    #[tokio::test]
    async fn test_scripted_prices_repeat_last() {
        let venue = SimulatedVenue::new("000660", 100.0, 1_000_000.0, PricePath::scripted([101.0, 102.0]));

        assert_eq!(venue.quote(&token(), "000660").await.unwrap().price, 101.0);
        assert_eq!(venue.quote(&token(), "000660").await.unwrap().price, 102.0);
        assert_eq!(venue.quote(&token(), "000660").await.unwrap().price, 102.0);
        assert_eq!(venue.calls(), 3);
    }

    #[tokio::test]
    async fn test_random_walk_is_reproducible() {
        let a = SimulatedVenue::new("000660", 5000.0, 0.0, PricePath::random_walk(42, 0.0, 0.002));
        let b = SimulatedVenue::new("000660", 5000.0, 0.0, PricePath::random_walk(42, 0.0, 0.002));

        for _ in 0..50 {
            let qa = a.quote(&token(), "000660").await.unwrap();
            let qb = b.quote(&token(), "000660").await.unwrap();
            assert_eq!(qa, qb);
            assert!(qa.price > 0.0);
        }
    }

    #[tokio::test]
    async fn test_buy_then_sell_updates_account() {
        let venue = SimulatedVenue::new("000660", 5000.0, 100_000.0, PricePath::scripted([5000.0, 5100.0]));
        let t = token();

        venue.quote(&t, "000660").await.unwrap();
        venue.buy(&t, "acct", "000660", 1, 5000.0).await.unwrap();
        venue.buy(&t, "acct", "000660", 1, 5200.0).await.unwrap();
        assert_eq!(venue.holding(), (2, 5100.0));

        venue.quote(&t, "000660").await.unwrap();
        venue.sell(&t, "acct", "000660", 2, None).await.unwrap();
        assert_eq!(venue.holding(), (0, 0.0));

        let fills = venue.fills();
        assert_eq!(fills.len(), 3);
        assert_eq!(fills[2].price, 5100.0);

        let balance = venue.balance(&t, "acct").await.unwrap();
        assert_eq!(balance.holdings, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_rejects_oversell_and_unknown_symbol() {
        let venue = SimulatedVenue::new("000660", 5000.0, 100_000.0, PricePath::scripted([]));
        let t = token();

        assert!(matches!(
            venue.sell(&t, "acct", "000660", 1, None).await,
            Err(BotError::Rejected { .. })
        ));
        assert!(matches!(
            venue.quote(&t, "005930").await,
            Err(BotError::InvalidSymbol(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let venue = SimulatedVenue::new("000660", 5000.0, 100_000.0, PricePath::scripted([]));
        venue.set_failing(true);

        assert!(venue.access_token().await.is_err());

        venue.set_failing(false);
        assert!(venue.access_token().await.is_ok());
    }
}
