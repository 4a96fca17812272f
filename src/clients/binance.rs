// Binance implementation of the exchange gateway

use crate::clients::binance_rest::BinanceRestClient;
use crate::clients::binance_ws;
use crate::clients::gateway::{ExchangeGateway, TickStream, UserEventStream};
use crate::config::ApiConfig;
use crate::core::filters::{ExchangeFilters, SymbolInfo};
use crate::core::state::AccountSnapshot;
use crate::core::types::{BracketAck, BracketIntent, CanceledOrder, OpenOrder, OrderAck, OrderIntent};
use crate::error::TradingResult;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct BinanceGateway {
    rest: BinanceRestClient,
    ws_url: String,
}

impl BinanceGateway {
    pub fn new(config: &ApiConfig) -> TradingResult<Self> {
        Ok(Self {
            rest: BinanceRestClient::new(config)?,
            ws_url: config.ws_url.clone(),
        })
    }

    pub fn rest(&self) -> &BinanceRestClient {
        &self.rest
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn symbol_info(&self, symbol: &str) -> TradingResult<SymbolInfo> {
        self.rest.exchange_info(symbol).await
    }

    async fn account(&self) -> TradingResult<AccountSnapshot> {
        self.rest.account().await
    }

    async fn open_orders(&self, symbol: &str) -> TradingResult<Vec<OpenOrder>> {
        self.rest.open_orders(symbol).await
    }

    async fn last_price(&self, symbol: &str) -> TradingResult<f64> {
        self.rest.ticker_price(symbol).await
    }

    async fn place_order(&self, order: &OrderIntent, filters: &ExchangeFilters) -> TradingResult<OrderAck> {
        self.rest.place_order(order, filters).await
    }

    async fn place_bracket(&self, bracket: &BracketIntent, filters: &ExchangeFilters) -> TradingResult<BracketAck> {
        self.rest.place_bracket(bracket, filters).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> TradingResult<CanceledOrder> {
        self.rest.cancel_order(symbol, order_id).await
    }

    async fn start_user_session(&self) -> TradingResult<String> {
        self.rest.start_user_stream().await
    }

    async fn keepalive_user_session(&self, key: &str) -> TradingResult<()> {
        self.rest.keepalive_user_stream(key).await
    }

    async fn close_user_session(&self, key: &str) -> TradingResult<()> {
        self.rest.close_user_stream(key).await
    }

    async fn market_stream(&self, symbol: &str) -> TradingResult<TickStream> {
        binance_ws::trade_stream(&self.ws_url, symbol).await
    }

    async fn user_stream(&self, key: &str) -> TradingResult<UserEventStream> {
        binance_ws::user_stream(&self.ws_url, key).await
    }
}
