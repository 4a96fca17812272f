// Common test utilities and helpers
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use grid_bracket_bot::clients::{ExchangeGateway, TickStream, UserEventStream};
use grid_bracket_bot::config::{ApiConfig, Config, DatabaseConfig, EngineConfig, GridConfig};
use grid_bracket_bot::core::{
    AccountSnapshot, BalanceEntry, BracketAck, BracketIntent, CanceledOrder, EarnAsset, EngineSettings,
    ExchangeFilters, GuardMode, OpenOrder, OrderAck, OrderIntent, OrderStatus, Protocol, Side, SymbolInfo,
    Tick, TimeInForce, UserEvent,
};
use grid_bracket_bot::{TradingError, TradingResult};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Grid used across the integration tests: BTCUSDT, 1% buckets, 1% margin.
pub fn create_test_grid() -> GridConfig {
    GridConfig {
        base: "BTC".to_string(),
        quote: "USDT".to_string(),
        grid_step: 1.0,
        side: Side::Buy,
        earn: EarnAsset::Quote,
        margin: 1.0,
        min_notional: 10.2,
        trigger_price: None,
        enabled: true,
    }
}

/// A full configuration with credentials and one symbol
pub fn create_test_config() -> Config {
    Config {
        api: ApiConfig {
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            ..ApiConfig::default()
        },
        engine: EngineConfig::default(),
        database: DatabaseConfig::default(),
        symbols: vec![create_test_grid()],
    }
}

pub fn create_test_settings(protocol: Protocol, guard: GuardMode) -> EngineSettings {
    EngineSettings {
        protocol,
        guard,
        unsubscribe_on_shutdown: true,
        keepalive_interval: Duration::from_secs(3600),
        reconnect_base_ms: 10,
        reconnect_max_ms: 50,
    }
}

/// BTCUSDT as listed: 0.01 tick, 1e-8 lot, 5 USDT minimum.
pub fn create_test_symbol_info() -> SymbolInfo {
    SymbolInfo {
        symbol: "BTCUSDT".to_string(),
        base_asset: "BTC".to_string(),
        quote_asset: "USDT".to_string(),
        tick_size: 0.01,
        step_size: 0.00000001,
        min_notional: 5.0,
        max_num_orders: None,
        trading: true,
        oto_allowed: true,
    }
}

pub fn create_test_snapshot(usdt: f64, btc: f64) -> AccountSnapshot {
    AccountSnapshot {
        balances: vec![
            BalanceEntry { asset: "USDT".to_string(), free: usdt, locked: 0.0 },
            BalanceEntry { asset: "BTC".to_string(), free: btc, locked: 0.0 },
        ],
        maker_rate: 0.001,
        taker_rate: 0.001,
    }
}

pub fn open_order(order_id: u64, side: Side, price: f64) -> OpenOrder {
    OpenOrder { order_id, side, price, orig_qty: 0.001 }
}

pub fn ack(order_id: u64, intent: &OrderIntent, status: OrderStatus) -> OrderAck {
    let executed = if status == OrderStatus::Filled { intent.quantity } else { 0.0 };
    OrderAck {
        order_id,
        client_order_id: format!("grid{}", order_id),
        price: intent.price,
        orig_qty: intent.quantity,
        executed_qty: executed,
        cummulative_quote_qty: executed * intent.price,
        status,
    }
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

/// Scripted reply to one order request
pub enum OrderReply {
    Status(OrderStatus),
    Error(TradingError),
}

/// Scripted reply to one order-list request
pub enum BracketReply {
    Statuses(OrderStatus, OrderStatus),
    Error(TradingError),
}

#[derive(Default)]
struct MockState {
    account: Option<AccountSnapshot>,
    open_orders: Vec<OpenOrder>,
    last_price: f64,
    next_order_id: u64,
    order_replies: VecDeque<OrderReply>,
    bracket_replies: VecDeque<BracketReply>,
    cancel_errors: VecDeque<TradingError>,
    session_errors: VecDeque<TradingError>,
    placed: Vec<OrderIntent>,
    brackets: Vec<BracketIntent>,
    canceled: Vec<u64>,
    sessions_started: u32,
    sessions_closed: Vec<String>,
    keepalives: u32,
    user_tx: Option<mpsc::UnboundedSender<TradingResult<UserEvent>>>,
    tick_rx: Option<mpsc::UnboundedReceiver<TradingResult<Tick>>>,
}

/// In-memory exchange: replies are scripted, everything sent is recorded.
///
/// Without a script, fill-or-kill orders fill and good-till-canceled orders
/// rest, so the happy path needs no setup.
pub struct MockGateway {
    info: SymbolInfo,
    state: Mutex<MockState>,
    tick_tx: mpsc::UnboundedSender<TradingResult<Tick>>,
}

impl MockGateway {
    pub fn new(info: SymbolInfo, snapshot: AccountSnapshot) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let state = MockState {
            account: Some(snapshot),
            last_price: 50_000.0,
            next_order_id: 1000,
            tick_rx: Some(tick_rx),
            ..MockState::default()
        };
        Self { info, state: Mutex::new(state), tick_tx }
    }

    pub fn with_defaults() -> Self {
        Self::new(create_test_symbol_info(), create_test_snapshot(1_000.0, 0.0))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn set_account(&self, snapshot: AccountSnapshot) {
        self.lock().account = Some(snapshot);
    }

    pub fn set_open_orders(&self, orders: Vec<OpenOrder>) {
        self.lock().open_orders = orders;
    }

    pub fn set_last_price(&self, price: f64) {
        self.lock().last_price = price;
    }

    pub fn script_order(&self, reply: OrderReply) {
        self.lock().order_replies.push_back(reply);
    }

    pub fn script_bracket(&self, reply: BracketReply) {
        self.lock().bracket_replies.push_back(reply);
    }

    pub fn script_cancel_error(&self, error: TradingError) {
        self.lock().cancel_errors.push_back(error);
    }

    pub fn script_session_error(&self, error: TradingError) {
        self.lock().session_errors.push_back(error);
    }

    pub fn placed(&self) -> Vec<OrderIntent> {
        self.lock().placed.clone()
    }

    pub fn brackets(&self) -> Vec<BracketIntent> {
        self.lock().brackets.clone()
    }

    pub fn canceled(&self) -> Vec<u64> {
        self.lock().canceled.clone()
    }

    pub fn sessions_started(&self) -> u32 {
        self.lock().sessions_started
    }

    pub fn sessions_closed(&self) -> Vec<String> {
        self.lock().sessions_closed.clone()
    }

    /// Push a trade print onto the market stream.
    pub fn push_tick(&self, price: f64) {
        let _ = self.tick_tx.send(Ok(Tick { symbol: self.info.symbol.clone(), price }));
    }

    /// Push an event onto the most recently opened user stream.
    pub fn push_user_event(&self, event: UserEvent) -> bool {
        match &self.lock().user_tx {
            Some(tx) => tx.send(Ok(event)).is_ok(),
            None => false,
        }
    }

    fn next_id(&self) -> u64 {
        let mut state = self.lock();
        state.next_order_id += 1;
        state.next_order_id
    }
}

fn receiver_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> stream::BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn symbol_info(&self, symbol: &str) -> TradingResult<SymbolInfo> {
        if symbol == self.info.symbol {
            Ok(self.info.clone())
        } else {
            Err(TradingError::UnknownSymbol(symbol.to_string()))
        }
    }

    async fn account(&self) -> TradingResult<AccountSnapshot> {
        self.lock()
            .account
            .clone()
            .ok_or_else(|| TradingError::Transport("account unavailable".to_string()))
    }

    async fn open_orders(&self, _symbol: &str) -> TradingResult<Vec<OpenOrder>> {
        Ok(self.lock().open_orders.clone())
    }

    async fn last_price(&self, _symbol: &str) -> TradingResult<f64> {
        Ok(self.lock().last_price)
    }

    async fn place_order(&self, order: &OrderIntent, _filters: &ExchangeFilters) -> TradingResult<OrderAck> {
        let order_id = self.next_id();
        let reply = {
            let mut state = self.lock();
            state.placed.push(order.clone());
            state.order_replies.pop_front()
        };

        match reply {
            Some(OrderReply::Status(status)) => Ok(ack(order_id, order, status)),
            Some(OrderReply::Error(e)) => Err(e),
            None => {
                let status = match order.time_in_force {
                    TimeInForce::FillOrKill => OrderStatus::Filled,
                    TimeInForce::GoodTillCanceled => OrderStatus::New,
                };
                Ok(ack(order_id, order, status))
            }
        }
    }

    async fn place_bracket(&self, bracket: &BracketIntent, _filters: &ExchangeFilters) -> TradingResult<BracketAck> {
        let entry_id = self.next_id();
        let exit_id = self.next_id();
        let reply = {
            let mut state = self.lock();
            state.brackets.push(bracket.clone());
            state.bracket_replies.pop_front()
        };

        let (entry_status, exit_status) = match reply {
            Some(BracketReply::Statuses(entry, exit)) => (entry, exit),
            Some(BracketReply::Error(e)) => return Err(e),
            None => (OrderStatus::Filled, OrderStatus::New),
        };

        Ok(BracketAck {
            order_list_id: entry_id as i64,
            entry: ack(entry_id, &bracket.entry, entry_status),
            exit: ack(exit_id, &bracket.exit, exit_status),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> TradingResult<CanceledOrder> {
        let mut state = self.lock();
        if let Some(e) = state.cancel_errors.pop_front() {
            return Err(e);
        }
        state.canceled.push(order_id);

        let position = state
            .open_orders
            .iter()
            .position(|o| o.order_id == order_id)
            .ok_or_else(|| TradingError::UnexpectedRejection {
                code: -2011,
                message: "Unknown order sent.".to_string(),
            })?;
        let order = state.open_orders.remove(position);

        Ok(CanceledOrder {
            symbol: symbol.to_string(),
            order_id,
            order_list_id: -1,
            client_order_id: format!("grid{}", order_id),
            price: order.price,
            orig_qty: order.orig_qty,
            executed_qty: 0.0,
            cummulative_quote_qty: 0.0,
            status: "CANCELED".to_string(),
            time_in_force: "GTC".to_string(),
            order_type: "LIMIT".to_string(),
            side: order.side.as_str().to_string(),
        })
    }

    async fn start_user_session(&self) -> TradingResult<String> {
        let mut state = self.lock();
        if let Some(e) = state.session_errors.pop_front() {
            return Err(e);
        }
        state.sessions_started += 1;
        Ok(format!("listen-key-{}", state.sessions_started))
    }

    async fn keepalive_user_session(&self, _key: &str) -> TradingResult<()> {
        self.lock().keepalives += 1;
        Ok(())
    }

    async fn close_user_session(&self, key: &str) -> TradingResult<()> {
        self.lock().sessions_closed.push(key.to_string());
        Ok(())
    }

    async fn market_stream(&self, _symbol: &str) -> TradingResult<TickStream> {
        match self.lock().tick_rx.take() {
            Some(rx) => Ok(receiver_stream(rx)),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn user_stream(&self, _key: &str) -> TradingResult<UserEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().user_tx = Some(tx);
        Ok(receiver_stream(rx))
    }
}
