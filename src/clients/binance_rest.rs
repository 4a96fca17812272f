//! Binance spot REST client.
//!
//! Snapshot queries, order placement and the user-data listen key. Every
//! error body the venue returns is classified on the way out, so callers
//! only ever see [`TradingError`] dispositions.

use crate::clients::signer::QuerySigner;
use crate::config::ApiConfig;
use crate::core::filters::{ExchangeFilters, SymbolInfo};
use crate::core::grid::format_decimal;
use crate::core::state::AccountSnapshot;
use crate::core::types::{
    BalanceEntry, BracketAck, BracketIntent, CanceledOrder, OpenOrder, OrderAck, OrderIntent,
    OrderStatus, Side, TimeInForce,
};
use crate::error::{TradingError, TradingResult};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const CODE_INVALID_SYMBOL: i64 = -1121;

/// Commission fields of `/api/v3/account` are in basis points.
const COMMISSION_SCALE: f64 = 10_000.0;

/// Accepts `"0.01"` as well as `0.01`.
pub(crate) fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Text(String),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Number::Float(f) => Ok(f),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolEntry {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    oto_allowed: bool,
    filters: Vec<serde_json::Value>,
}

impl SymbolEntry {
    fn filter_f64(&self, filter_type: &str, field: &str) -> Option<f64> {
        self.filters
            .iter()
            .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some(filter_type))
            .and_then(|f| f.get(field))
            .and_then(|v| match v {
                serde_json::Value::String(s) => s.parse().ok(),
                other => other.as_f64(),
            })
    }

    fn into_info(self) -> TradingResult<SymbolInfo> {
        let missing = |what: &str| TradingError::Parse(format!("{} has no {} filter", self.symbol, what));

        let tick_size = self
            .filter_f64("PRICE_FILTER", "tickSize")
            .ok_or_else(|| missing("PRICE_FILTER"))?;
        let step_size = self
            .filter_f64("LOT_SIZE", "stepSize")
            .ok_or_else(|| missing("LOT_SIZE"))?;
        let min_notional = self
            .filter_f64("NOTIONAL", "minNotional")
            .or_else(|| self.filter_f64("MIN_NOTIONAL", "minNotional"))
            .unwrap_or(0.0);
        let max_num_orders = self
            .filter_f64("MAX_NUM_ORDERS", "maxNumOrders")
            .map(|n| n as usize)
            .filter(|n| *n > 0);

        Ok(SymbolInfo {
            trading: self.status == "TRADING",
            symbol: self.symbol,
            base_asset: self.base_asset,
            quote_asset: self.quote_asset,
            tick_size,
            step_size,
            min_notional,
            max_num_orders,
            oto_allowed: self.oto_allowed,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    maker_commission: f64,
    taker_commission: f64,
    #[serde(default)]
    commission_rates: Option<CommissionRates>,
    balances: Vec<BalanceRaw>,
}

#[derive(Debug, Deserialize)]
struct CommissionRates {
    #[serde(deserialize_with = "de_f64")]
    maker: f64,
    #[serde(deserialize_with = "de_f64")]
    taker: f64,
}

#[derive(Debug, Deserialize)]
struct BalanceRaw {
    asset: String,
    #[serde(deserialize_with = "de_f64")]
    free: f64,
    #[serde(deserialize_with = "de_f64")]
    locked: f64,
}

/// Order body shared by place, cancel, open-orders and order-list reports.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRaw {
    symbol: String,
    order_id: u64,
    #[serde(default = "no_order_list")]
    order_list_id: i64,
    client_order_id: String,
    #[serde(deserialize_with = "de_f64")]
    price: f64,
    #[serde(deserialize_with = "de_f64")]
    orig_qty: f64,
    #[serde(deserialize_with = "de_f64")]
    executed_qty: f64,
    #[serde(deserialize_with = "de_f64")]
    cummulative_quote_qty: f64,
    status: String,
    time_in_force: String,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
}

fn no_order_list() -> i64 {
    -1
}

impl OrderRaw {
    fn ack(&self) -> OrderAck {
        OrderAck {
            order_id: self.order_id,
            client_order_id: self.client_order_id.clone(),
            price: self.price,
            orig_qty: self.orig_qty,
            executed_qty: self.executed_qty,
            cummulative_quote_qty: self.cummulative_quote_qty,
            status: OrderStatus::parse(&self.status),
        }
    }

    fn open_order(&self) -> TradingResult<OpenOrder> {
        let side = Side::parse(&self.side)
            .ok_or_else(|| TradingError::Parse(format!("unknown side {}", self.side)))?;
        Ok(OpenOrder {
            order_id: self.order_id,
            side,
            price: self.price,
            orig_qty: self.orig_qty,
        })
    }

    fn canceled(self) -> CanceledOrder {
        CanceledOrder {
            symbol: self.symbol,
            order_id: self.order_id,
            order_list_id: self.order_list_id,
            client_order_id: self.client_order_id,
            price: self.price,
            orig_qty: self.orig_qty,
            executed_qty: self.executed_qty,
            cummulative_quote_qty: self.cummulative_quote_qty,
            status: self.status,
            time_in_force: self.time_in_force,
            order_type: self.order_type,
            side: self.side,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderListResponse {
    order_list_id: i64,
    order_reports: Vec<OrderRaw>,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[serde(deserialize_with = "de_f64")]
    price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

fn client_order_id() -> String {
    format!("grid{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    signer: QuerySigner,
    recv_window_ms: u64,
}

impl BinanceRestClient {
    pub fn new(config: &ApiConfig) -> TradingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            signer: QuerySigner::new(&config.api_secret),
            recv_window_ms: config.recv_window_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<String>,
        with_key: bool,
    ) -> TradingResult<T> {
        let url = match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        };

        let mut request = self.http.request(method.clone(), &url);
        if with_key {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("{} {} -> {}", method, path, status);

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                TradingError::Parse(format!("{} {}: {} in {}", method, path, e, body))
            });
        }

        Err(Self::classify(status, &body))
    }

    fn classify(status: StatusCode, body: &str) -> TradingError {
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::IM_A_TEAPOT
        {
            return TradingError::Transport(format!("HTTP {}: {}", status, body));
        }

        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(err) if err.code == CODE_INVALID_SYMBOL => TradingError::UnknownSymbol(err.msg),
            Ok(err) => TradingError::from_venue(err.code, &err.msg),
            Err(_) => TradingError::UnexpectedRejection {
                code: status.as_u16() as i64,
                message: body.to_string(),
            },
        }
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> TradingResult<T> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = self.signer.signed_query(params, self.recv_window_ms, timestamp);
        self.send(method, path, Some(query), true).await
    }

    pub async fn exchange_info(&self, symbol: &str) -> TradingResult<SymbolInfo> {
        let response: ExchangeInfoResponse = self
            .send(Method::GET, "/api/v3/exchangeInfo", Some(format!("symbol={}", symbol)), false)
            .await?;

        response
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| TradingError::UnknownSymbol(symbol.to_string()))?
            .into_info()
    }

    pub async fn account(&self) -> TradingResult<AccountSnapshot> {
        let response: AccountResponse = self.signed(Method::GET, "/api/v3/account", &[]).await?;

        let (maker_rate, taker_rate) = match response.commission_rates {
            Some(rates) => (rates.maker, rates.taker),
            None => (
                response.maker_commission / COMMISSION_SCALE,
                response.taker_commission / COMMISSION_SCALE,
            ),
        };

        Ok(AccountSnapshot {
            balances: response
                .balances
                .into_iter()
                .map(|b| BalanceEntry { asset: b.asset, free: b.free, locked: b.locked })
                .collect(),
            maker_rate,
            taker_rate,
        })
    }

    pub async fn open_orders(&self, symbol: &str) -> TradingResult<Vec<OpenOrder>> {
        let orders: Vec<OrderRaw> = self
            .signed(Method::GET, "/api/v3/openOrders", &[("symbol", symbol.to_string())])
            .await?;
        orders.iter().map(OrderRaw::open_order).collect()
    }

    pub async fn ticker_price(&self, symbol: &str) -> TradingResult<f64> {
        let response: TickerPriceResponse = self
            .send(Method::GET, "/api/v3/ticker/price", Some(format!("symbol={}", symbol)), false)
            .await?;
        Ok(response.price)
    }

    pub async fn place_order(&self, order: &OrderIntent, filters: &ExchangeFilters) -> TradingResult<OrderAck> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", order.time_in_force.as_str().to_string()),
            ("quantity", format_decimal(order.quantity, filters.lot_precision)),
            ("price", format_decimal(order.price, filters.price_precision)),
            ("newClientOrderId", client_order_id()),
            ("newOrderRespType", "RESULT".to_string()),
        ];

        let raw: OrderRaw = self.signed(Method::POST, "/api/v3/order", &params).await?;
        Ok(raw.ack())
    }

    pub async fn place_bracket(&self, bracket: &BracketIntent, filters: &ExchangeFilters) -> TradingResult<BracketAck> {
        let entry = &bracket.entry;
        let exit = &bracket.exit;
        let params = [
            ("symbol", entry.symbol.clone()),
            ("workingType", "LIMIT".to_string()),
            ("workingSide", entry.side.as_str().to_string()),
            ("workingClientOrderId", client_order_id()),
            ("workingPrice", format_decimal(entry.price, filters.price_precision)),
            ("workingQuantity", format_decimal(entry.quantity, filters.lot_precision)),
            ("workingTimeInForce", entry.time_in_force.as_str().to_string()),
            ("pendingType", "LIMIT".to_string()),
            ("pendingSide", exit.side.as_str().to_string()),
            ("pendingClientOrderId", client_order_id()),
            ("pendingPrice", format_decimal(exit.price, filters.price_precision)),
            ("pendingQuantity", format_decimal(exit.quantity, filters.lot_precision)),
            ("pendingTimeInForce", exit.time_in_force.as_str().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];

        let response: OrderListResponse = self
            .signed(Method::POST, "/api/v3/orderList/oto", &params)
            .await?;
        bracket_ack(response, entry.time_in_force)
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> TradingResult<CanceledOrder> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let raw: OrderRaw = self.signed(Method::DELETE, "/api/v3/order", &params).await?;
        Ok(raw.canceled())
    }

    pub async fn start_user_stream(&self) -> TradingResult<String> {
        let response: ListenKeyResponse = self
            .send(Method::POST, "/api/v3/userDataStream", None, true)
            .await?;
        info!("🔑 user data listen key created");
        Ok(response.listen_key)
    }

    pub async fn keepalive_user_stream(&self, listen_key: &str) -> TradingResult<()> {
        let _: serde_json::Value = self
            .send(Method::PUT, "/api/v3/userDataStream", Some(format!("listenKey={}", listen_key)), true)
            .await?;
        Ok(())
    }

    pub async fn close_user_stream(&self, listen_key: &str) -> TradingResult<()> {
        let _: serde_json::Value = self
            .send(Method::DELETE, "/api/v3/userDataStream", Some(format!("listenKey={}", listen_key)), true)
            .await?;
        Ok(())
    }
}

/// Split order-list reports into the working (entry) and pending (exit) legs.
fn bracket_ack(response: OrderListResponse, entry_tif: TimeInForce) -> TradingResult<BracketAck> {
    let mut entry = None;
    let mut exit = None;
    for report in &response.order_reports {
        if report.time_in_force == entry_tif.as_str() && entry.is_none() {
            entry = Some(report.ack());
        } else {
            exit = Some(report.ack());
        }
    }

    match (entry, exit) {
        (Some(entry), Some(exit)) => Ok(BracketAck {
            order_list_id: response.order_list_id,
            entry,
            exit,
        }),
        _ => Err(TradingError::Parse(format!(
            "order list {} returned {} reports",
            response.order_list_id,
            response.order_reports.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_entry_filters() {
        let body = r#"{"symbols":[{"symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT","otoAllowed":true,
            "filters":[{"filterType":"PRICE_FILTER","minPrice":"0.01","maxPrice":"1000000.00","tickSize":"0.01000000"},
                       {"filterType":"LOT_SIZE","minQty":"0.00001","maxQty":"9000","stepSize":"0.00001000"},
                       {"filterType":"NOTIONAL","minNotional":"5.00000000","applyMinToMarket":true},
                       {"filterType":"MAX_NUM_ORDERS","maxNumOrders":200}]}]}"#;
        let response: ExchangeInfoResponse = serde_json::from_str(body).unwrap();
        let info = response.symbols.into_iter().next().unwrap().into_info().unwrap();

        assert_eq!(info.tick_size, 0.01);
        assert_eq!(info.step_size, 0.00001);
        assert_eq!(info.min_notional, 5.0);
        assert_eq!(info.max_num_orders, Some(200));
        assert!(info.trading);
        assert!(info.oto_allowed);
    }

    #[test]
    fn test_legacy_min_notional_filter() {
        let body = r#"{"symbol":"XRPGBP","status":"BREAK","baseAsset":"XRP","quoteAsset":"GBP",
            "filters":[{"filterType":"PRICE_FILTER","tickSize":"0.0001"},
                       {"filterType":"LOT_SIZE","stepSize":"0.1"},
                       {"filterType":"MIN_NOTIONAL","minNotional":"10.0"}]}"#;
        let entry: SymbolEntry = serde_json::from_str(body).unwrap();
        let info = entry.into_info().unwrap();
        assert_eq!(info.min_notional, 10.0);
        assert_eq!(info.max_num_orders, None);
        assert!(!info.trading);
        assert!(!info.oto_allowed);
    }

    #[test]
    fn test_error_classification() {
        let err = BinanceRestClient::classify(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2010,"msg":"Account has insufficient balance for requested action."}"#,
        );
        assert!(matches!(err, TradingError::InsufficientBalance { .. }));

        let err = BinanceRestClient::classify(StatusCode::BAD_REQUEST, r#"{"code":-1121,"msg":"Invalid symbol."}"#);
        assert!(matches!(err, TradingError::UnknownSymbol(_)));

        let err = BinanceRestClient::classify(StatusCode::BAD_REQUEST, r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#);
        assert!(err.is_fatal());

        let err = BinanceRestClient::classify(StatusCode::BAD_GATEWAY, "upstream");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_bracket_reports_split_by_time_in_force() {
        let body = r#"{"orderListId":7,"contingencyType":"OTO","orderReports":[
            {"symbol":"BTCUSDT","orderId":11,"orderListId":7,"clientOrderId":"b","price":"50500.00","origQty":"0.00019","executedQty":"0","cummulativeQuoteQty":"0","status":"PENDING_NEW","timeInForce":"GTC","type":"LIMIT","side":"SELL"},
            {"symbol":"BTCUSDT","orderId":10,"orderListId":7,"clientOrderId":"a","price":"50000.00","origQty":"0.00020","executedQty":"0.00020","cummulativeQuoteQty":"10.0","status":"FILLED","timeInForce":"FOK","type":"LIMIT","side":"BUY"}]}"#;
        let response: OrderListResponse = serde_json::from_str(body).unwrap();
        let ack = bracket_ack(response, TimeInForce::FillOrKill).unwrap();

        assert_eq!(ack.order_list_id, 7);
        assert_eq!(ack.entry.order_id, 10);
        assert_eq!(ack.entry.status, OrderStatus::Filled);
        assert_eq!(ack.exit.order_id, 11);
        assert_eq!(ack.exit.status, OrderStatus::PendingNew);
    }

    #[test]
    fn test_client_order_id_fits_venue_limit() {
        let id = client_order_id();
        assert!(id.len() <= 36);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
