// Exchange gateway contract used by the engine

use crate::core::filters::{ExchangeFilters, SymbolInfo};
use crate::core::state::AccountSnapshot;
use crate::core::types::{
    BracketAck, BracketIntent, CanceledOrder, OpenOrder, OrderAck, OrderIntent, Tick, UserEvent,
};
use crate::error::TradingResult;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Trade prints for one symbol.
pub type TickStream = BoxStream<'static, TradingResult<Tick>>;

/// Account and order events for one user-data session.
pub type UserEventStream = BoxStream<'static, TradingResult<UserEvent>>;

/// Everything the engine needs from a venue.
///
/// Order methods report venue rejections as errors already classified by
/// [`crate::error::TradingError::from_venue`]; fill-or-kill expiry is a normal
/// acknowledgement with an `Expired` status.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn symbol_info(&self, symbol: &str) -> TradingResult<SymbolInfo>;

    /// Balances and commission rates.
    async fn account(&self) -> TradingResult<AccountSnapshot>;

    async fn open_orders(&self, symbol: &str) -> TradingResult<Vec<OpenOrder>>;

    /// Latest traded price, for pre-flight checks.
    async fn last_price(&self, symbol: &str) -> TradingResult<f64>;

    async fn place_order(&self, order: &OrderIntent, filters: &ExchangeFilters) -> TradingResult<OrderAck>;

    /// Submit entry and exit as one one-triggers-the-other order list.
    async fn place_bracket(&self, bracket: &BracketIntent, filters: &ExchangeFilters) -> TradingResult<BracketAck>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> TradingResult<CanceledOrder>;

    /// Open a user-data session and return its key.
    async fn start_user_session(&self) -> TradingResult<String>;

    async fn keepalive_user_session(&self, key: &str) -> TradingResult<()>;

    async fn close_user_session(&self, key: &str) -> TradingResult<()>;

    async fn market_stream(&self, symbol: &str) -> TradingResult<TickStream>;

    async fn user_stream(&self, key: &str) -> TradingResult<UserEventStream>;
}
