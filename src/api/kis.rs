use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::time::Duration;

use super::Venue;
use crate::error::BotError;
use crate::models::{AccessToken, AccountSnapshot, Holding, OrderAck, OrderBookTop, Quote, TradingMode};
use crate::Result;

const PAPER_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";
const LIVE_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
const REQUEST_TIMEOUT_SECS: u64 = 10;

// KODEX 200 tracks the KOSPI 200 and is quoted like any other stock
const MARKET_INDEX_PROXY: &str = "069500";

const TOKEN_PATH: &str = "/oauth2/tokenP";
const PRICE_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-price";
const TICK_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-ccnl";
const ORDER_BOOK_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-asking-price-exp-ccn";
const BALANCE_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-balance";
const ORDER_PATH: &str = "/uapi/domestic-stock/v1/trading/order-cash";

/// App credentials issued by the broker
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KisCredentials {
    pub app_key: String,
    pub app_secret: String,
}

// ============== Response Types ==============

/// Numeric fields arrive as strings ("612000"); blanks and junk read as 0
fn parse_number(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(raw, "Unparsable numeric field, using 0");
        0.0
    })
}

fn lenient_value(value: Option<Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => Some(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Some(parse_number(&s)),
        Value::Null => None,
        _ => Some(0.0),
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_value(Option::deserialize(deserializer)?).unwrap_or(0.0))
}

/// Like [`lenient_number`] but keeps "field absent or null" apart from 0
fn lenient_optional<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_value(Option::deserialize(deserializer)?))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    output: Option<PriceOutput>,
}

#[derive(Debug, Deserialize)]
struct PriceOutput {
    /// Current price
    #[serde(default, deserialize_with = "lenient_number")]
    stck_prpr: f64,
    /// Volume accumulated since the open
    #[serde(default, deserialize_with = "lenient_number")]
    acml_vol: f64,
    /// Base price of the day, i.e. the previous close
    #[serde(default, deserialize_with = "lenient_number")]
    stck_sdpr: f64,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    output1: Option<Vec<HoldingRow>>,
    #[serde(default)]
    output2: Vec<ValuationRow>,
}

#[derive(Debug, Deserialize)]
struct HoldingRow {
    #[serde(default)]
    pdno: String,
    #[serde(default, deserialize_with = "lenient_number")]
    hldg_qty: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pchs_avg_pric: f64,
}

#[derive(Debug, Deserialize)]
struct ValuationRow {
    #[serde(default, deserialize_with = "lenient_optional")]
    tot_evlu_amt: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    rt_cd: String,
    #[serde(default)]
    msg1: String,
    output: Option<OrderOutput>,
}

#[derive(Debug, Deserialize)]
struct OrderOutput {
    #[serde(rename = "ODNO", default)]
    odno: String,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    output1: Option<OrderBookOutput>,
}

#[derive(Debug, Deserialize)]
struct OrderBookOutput {
    #[serde(default, deserialize_with = "lenient_number")]
    bidp_rsqn1: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    askp_rsqn1: f64,
}

#[derive(Debug, Deserialize)]
struct TickResponse {
    #[serde(default)]
    output: Vec<TickRow>,
}

#[derive(Debug, Deserialize)]
struct TickRow {
    #[serde(default, deserialize_with = "lenient_optional")]
    tday_rltv: Option<f64>,
}

impl BalanceResponse {
    fn into_snapshot(self) -> AccountSnapshot {
        let holdings = self.output1.map(|rows| {
            rows.into_iter()
                .map(|row| Holding {
                    symbol: row.pdno.trim().to_string(),
                    quantity: row.hldg_qty.max(0.0) as u32,
                    avg_cost: row.pchs_avg_pric,
                })
                .collect()
        });

        AccountSnapshot {
            holdings,
            total_valuation: self.output2.first().and_then(|row| row.tot_evlu_amt),
        }
    }
}

impl OrderResponse {
    fn into_ack(self) -> Result<OrderAck> {
        let message = self.msg1.trim().to_string();
        if self.rt_cd != "0" {
            return Err(BotError::Rejected { reason: message });
        }

        Ok(OrderAck {
            order_id: self.output.map(|o| o.odno).unwrap_or_default(),
            message,
        })
    }
}

/// Transaction ids differ between the sandbox and the live gateway
struct TrIds {
    balance: &'static str,
    buy: &'static str,
    sell: &'static str,
}

fn tr_ids(mode: TradingMode) -> TrIds {
    match mode {
        TradingMode::Paper => TrIds {
            balance: "VTTC8434R",
            buy: "VTTC0012U",
            sell: "VTTC0801U",
        },
        TradingMode::Live => TrIds {
            balance: "TTTC8434R",
            buy: "TTTC0012U",
            sell: "TTTC0011U",
        },
    }
}

/// Thin REST client for the Korea Investment & Securities open API
#[derive(Clone)]
pub struct KisClient {
    client: Client,
    base_url: String,
    credentials: KisCredentials,
    mode: TradingMode,
}

impl KisClient {
    pub fn new(credentials: KisCredentials, mode: TradingMode) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url = match mode {
            TradingMode::Paper => PAPER_BASE_URL,
            TradingMode::Live => LIVE_BASE_URL,
        };

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            credentials,
            mode,
        })
    }

    /// Point the client at another host (gateway proxy, test server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    fn authorized(&self, request: RequestBuilder, token: &AccessToken, tr_id: &str) -> RequestBuilder {
        request
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {}", token.as_str()))
            .header("appkey", &self.credentials.app_key)
            .header("appsecret", &self.credentials.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        token: &AccessToken,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorized(self.client.get(&url), token, tr_id).query(query);
        read_json(path, request).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        token: &AccessToken,
        body: &Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorized(self.client.post(&url), token, tr_id).json(body);
        read_json(path, request).await
    }

    async fn inquire_price(&self, token: &AccessToken, symbol: &str) -> Result<PriceOutput> {
        let response: PriceResponse = self
            .get_json(
                PRICE_PATH,
                "FHKST01010100",
                token,
                &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", symbol)],
            )
            .await?;

        response
            .output
            .ok_or_else(|| BotError::missing(PRICE_PATH, "output"))
    }

    async fn place_order(
        &self,
        token: &AccessToken,
        tr_id: &str,
        account: &str,
        symbol: &str,
        quantity: u32,
        order_division: &str,
        unit_price: i64,
    ) -> Result<OrderAck> {
        let (cano, product_code) = split_account(account)?;
        let body = json!({
            "CANO": cano,
            "ACNT_PRDT_CD": product_code,
            "PDNO": symbol,
            "ORD_DVSN": order_division,
            "ORD_QTY": quantity.to_string(),
            "ORD_UNPR": unit_price.to_string(),
        });

        let response: OrderResponse = self.post_json(ORDER_PATH, tr_id, token, &body).await?;
        response.into_ack()
    }
}

async fn read_json<T: DeserializeOwned>(endpoint: &str, request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(BotError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.json().await?)
}

/// Split "12345678-01" style account numbers into (CANO, ACNT_PRDT_CD)
fn split_account(account: &str) -> Result<(String, String)> {
    let digits: String = account.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 10 {
        return Err(BotError::InvalidConfig(format!(
            "account number must have at least 10 digits: {}",
            account
        )));
    }

    Ok((digits[..8].to_string(), digits[8..10].to_string()))
}

#[async_trait]
impl Venue for KisClient {
    async fn access_token(&self) -> Result<AccessToken> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": self.credentials.app_key,
            "appsecret": self.credentials.app_secret,
        });

        let response: TokenResponse = read_json(TOKEN_PATH, self.client.post(&url).json(&body)).await?;

        response
            .access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken)
            .ok_or_else(|| BotError::Auth("response has no access_token".to_string()))
    }

    async fn quote(&self, token: &AccessToken, symbol: &str) -> Result<Quote> {
        let output = self.inquire_price(token, symbol).await?;

        Ok(Quote {
            price: output.stck_prpr,
            accumulated_volume: output.acml_vol,
        })
    }

    async fn prev_close(&self, token: &AccessToken, symbol: &str) -> Result<f64> {
        Ok(self.inquire_price(token, symbol).await?.stck_sdpr)
    }

    async fn balance(&self, token: &AccessToken, account: &str) -> Result<AccountSnapshot> {
        let (cano, product_code) = split_account(account)?;
        let ids = tr_ids(self.mode);

        let response: BalanceResponse = self
            .get_json(
                BALANCE_PATH,
                ids.balance,
                token,
                &[
                    ("CANO", cano.as_str()),
                    ("ACNT_PRDT_CD", product_code.as_str()),
                    ("AFHR_FLPR_YN", "N"),
                    ("OFL_YN", "N"),
                    ("INQR_DVSN", "01"),
                    ("UNPR_DVSN", "01"),
                    ("FUND_STTL_ICLD_YN", "N"),
                    ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                    ("PRCS_DVSN", "00"),
                    ("CTX_AREA_FK100", ""),
                    ("CTX_AREA_NK100", ""),
                ],
            )
            .await?;

        Ok(response.into_snapshot())
    }

    async fn buy(
        &self,
        token: &AccessToken,
        account: &str,
        symbol: &str,
        quantity: u32,
        limit_price: f64,
    ) -> Result<OrderAck> {
        let tr_id = tr_ids(self.mode).buy;
        // Prices are whole won
        self.place_order(token, tr_id, account, symbol, quantity, "00", limit_price.trunc() as i64)
            .await
    }

    async fn sell(
        &self,
        token: &AccessToken,
        account: &str,
        symbol: &str,
        quantity: u32,
        limit_price: Option<f64>,
    ) -> Result<OrderAck> {
        let tr_id = tr_ids(self.mode).sell;

        match limit_price.filter(|p| *p > 0.0) {
            Some(price) => {
                self.place_order(token, tr_id, account, symbol, quantity, "00", price.trunc() as i64)
                    .await
            }
            None => self.place_order(token, tr_id, account, symbol, quantity, "01", 0).await,
        }
    }

    async fn order_book(&self, token: &AccessToken, symbol: &str) -> Result<Option<OrderBookTop>> {
        let response: OrderBookResponse = self
            .get_json(
                ORDER_BOOK_PATH,
                "FHKST01010200",
                token,
                &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", symbol)],
            )
            .await?;

        Ok(response.output1.map(|book| OrderBookTop {
            bid_qty: book.bidp_rsqn1,
            ask_qty: book.askp_rsqn1,
        }))
    }

    async fn tick_strength(&self, token: &AccessToken, symbol: &str) -> Result<Option<f64>> {
        let response: TickResponse = self
            .get_json(
                TICK_PATH,
                "FHKST01010300",
                token,
                &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", symbol)],
            )
            .await?;

        // Most recent execution comes first
        Ok(response.output.first().and_then(|row| row.tday_rltv))
    }

    async fn market_index(&self, token: &AccessToken) -> Result<Option<f64>> {
        let quote = self.quote(token, MARKET_INDEX_PROXY).await?;
        Ok(Some(quote.price).filter(|p| *p > 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> KisClient {
        KisClient::new(
            KisCredentials {
                app_key: "key".to_string(),
                app_secret: "secret".to_string(),
            },
            TradingMode::Paper,
        )
        .unwrap()
        .with_base_url(server.url())
    }

    fn token() -> AccessToken {
        AccessToken("token".to_string())
    }

    #[test]
    fn test_split_account() {
        let (cano, code) = split_account("12345678-01").unwrap();
        assert_eq!(cano, "12345678");
        assert_eq!(code, "01");

        assert!(split_account("1234-56").is_err());
    }

    #[test]
    fn test_lenient_numbers() {
        let row: HoldingRow =
            serde_json::from_value(json!({"pdno": "000660 ", "hldg_qty": "3", "pchs_avg_pric": 3.5}))
                .unwrap();
        assert_eq!(row.hldg_qty, 3.0);
        assert_eq!(row.pchs_avg_pric, 3.5);

        let row: HoldingRow =
            serde_json::from_value(json!({"hldg_qty": "n/a", "pchs_avg_pric": ""})).unwrap();
        assert_eq!(row.hldg_qty, 0.0);
        assert_eq!(row.pchs_avg_pric, 0.0);
        assert_eq!(row.pdno, "");

        let row: TickRow = serde_json::from_value(json!({})).unwrap();
        assert_eq!(row.tday_rltv, None);
        let row: TickRow = serde_json::from_value(json!({"tday_rltv": "104.35"})).unwrap();
        assert_eq!(row.tday_rltv, Some(104.35));
    }

    #[test]
    fn test_balance_without_holdings_section() {
        let response: BalanceResponse =
            serde_json::from_value(json!({"output2": [{"tot_evlu_amt": "10000000"}]})).unwrap();
        let snapshot = response.into_snapshot();

        assert!(snapshot.holdings.is_none());
        assert_eq!(snapshot.total_valuation, Some(10_000_000.0));
    }

    #[test]
    fn test_order_rejection() {
        let response: OrderResponse =
            serde_json::from_value(json!({"rt_cd": "1", "msg1": "insufficient funds "})).unwrap();
        let result = response.into_ack();
        assert!(matches!(result, Err(BotError::Rejected { reason }) if reason == "insufficient funds"));
    }

    #[tokio::test]
    async fn test_quote_parsing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PRICE_PATH)
            .match_query(Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "000660".into()))
            .match_header("tr_id", "FHKST01010100")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"output": {"stck_prpr": "612000", "acml_vol": "1534", "stck_sdpr": "605000"}}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client(&server);
        let quote = client.quote(&token(), "000660").await.unwrap();
        assert_eq!(quote.price, 612000.0);
        assert_eq!(quote.accumulated_volume, 1534.0);

        let prev_close = client.prev_close(&token(), "000660").await.unwrap();
        assert_eq!(prev_close, 605000.0);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_balance_parsing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", BALANCE_PATH)
            .match_query(Matcher::Any)
            .match_header("tr_id", "VTTC8434R")
            .with_status(200)
            .with_body(
                r#"{
                    "output1": [{"pdno": "000660", "hldg_qty": "2", "pchs_avg_pric": "5050.0000"}],
                    "output2": [{"tot_evlu_amt": "9998500"}]
                }"#,
            )
            .create_async()
            .await;

        let snapshot = client(&server)
            .balance(&token(), "12345678-01")
            .await
            .unwrap();

        let holding = snapshot.find("000660").unwrap();
        assert_eq!(holding.quantity, 2);
        assert_eq!(holding.avg_cost, 5050.0);
        assert_eq!(snapshot.total_valuation, Some(9_998_500.0));
    }

    #[tokio::test]
    async fn test_market_sell_order_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ORDER_PATH)
            .match_header("tr_id", "VTTC0801U")
            .match_body(Matcher::PartialJson(json!({
                "PDNO": "000660",
                "ORD_DVSN": "01",
                "ORD_QTY": "3",
                "ORD_UNPR": "0",
            })))
            .with_status(200)
            .with_body(r#"{"rt_cd": "0", "msg1": "ok", "output": {"ODNO": "0000117057"}}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .sell(&token(), "12345678-01", "000660", 3, None)
            .await
            .unwrap();

        assert_eq!(ack.order_id, "0000117057");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", PRICE_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let result = client(&server).quote(&token(), "000660").await;
        assert!(matches!(result, Err(BotError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_missing_output_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", PRICE_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"rt_cd": "1", "msg1": "unknown symbol"}"#)
            .create_async()
            .await;

        let result = client(&server).quote(&token(), "999999").await;
        assert!(matches!(result, Err(BotError::MissingField { .. })));
    }
}
