pub mod kis;
pub mod paper;
pub mod rate_limiter;

pub use kis::{KisClient, KisCredentials};
pub use paper::{PricePath, SimulatedVenue};
pub use rate_limiter::RequestLimiter;

use async_trait::async_trait;

use crate::models::{AccessToken, AccountSnapshot, OrderAck, OrderBookTop, Quote};
use crate::Result;

/// External brokerage the trading loop talks to
///
/// Implementations do no pacing of their own: callers await
/// [`RequestLimiter::wait_for_next`] before every method call.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Acquire a credential for subsequent calls
    async fn access_token(&self) -> Result<AccessToken>;

    /// Latest trade price and the day's accumulated volume
    async fn quote(&self, token: &AccessToken, symbol: &str) -> Result<Quote>;

    /// Previous session's closing price
    async fn prev_close(&self, token: &AccessToken, symbol: &str) -> Result<f64>;

    /// Holdings and total valuation of the account
    async fn balance(&self, token: &AccessToken, account: &str) -> Result<AccountSnapshot>;

    /// Limit buy order
    async fn buy(
        &self,
        token: &AccessToken,
        account: &str,
        symbol: &str,
        quantity: u32,
        limit_price: f64,
    ) -> Result<OrderAck>;

    /// Sell order; `None` as the limit price submits a market order
    async fn sell(
        &self,
        token: &AccessToken,
        account: &str,
        symbol: &str,
        quantity: u32,
        limit_price: Option<f64>,
    ) -> Result<OrderAck>;

    /// Best-level order book, when the venue provides one
    async fn order_book(&self, _token: &AccessToken, _symbol: &str) -> Result<Option<OrderBookTop>> {
        Ok(None)
    }

    /// Execution strength (buy volume relative to sell volume, 100 = balanced)
    async fn tick_strength(&self, _token: &AccessToken, _symbol: &str) -> Result<Option<f64>> {
        Ok(None)
    }

    /// Reference market index used as a regime filter
    async fn market_index(&self, _token: &AccessToken) -> Result<Option<f64>> {
        Ok(None)
    }
}
