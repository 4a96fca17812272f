// Integration tests for session synchronization and reconnects

mod common;

use common::{create_test_snapshot, open_order, MockGateway};
use grid_bracket_bot::clients::ExchangeGateway;
use grid_bracket_bot::core::{
    ConnectionState, ExecutionReport, ExponentialBackoff, OrderStatus, Side, StateSynchronizer, UserEvent,
};
use grid_bracket_bot::core::sync::SyncAction;
use grid_bracket_bot::TradingError;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn synchronizer(mock: &Arc<MockGateway>) -> StateSynchronizer {
    let gateway: Arc<dyn ExchangeGateway> = mock.clone();
    StateSynchronizer::new(gateway, "BTCUSDT", 2, ExponentialBackoff::new(
        Duration::from_millis(10),
        Duration::from_millis(80),
        0.0,
    ))
}

fn new_order(order_id: u64, price: f64) -> UserEvent {
    UserEvent::Execution(ExecutionReport {
        symbol: "BTCUSDT".to_string(),
        order_id,
        side: Side::Sell,
        price,
        orig_qty: 0.001,
        status: OrderStatus::New,
    })
}

#[tokio::test]
async fn test_connect_loads_snapshot() {
    let mock = Arc::new(MockGateway::with_defaults());
    mock.set_open_orders(vec![open_order(1, Side::Sell, 51_000.0)]);
    let mut sync = synchronizer(&mock);

    assert_eq!(sync.state(), ConnectionState::Disconnected);
    let connecting = sync.connect();
    assert_eq!(sync.state(), ConnectionState::Connecting { attempt: 1 });

    let connection = connecting.await.unwrap();
    let _events = sync.established(connection);

    assert!(sync.is_connected());
    assert_eq!(sync.session_key(), Some("listen-key-1"));
    assert_eq!(sync.session().account.free("USDT"), 1_000.0);
    assert!(sync.session().open_orders.contains_order(1));
}

#[tokio::test]
async fn test_reconnect_replaces_stale_state() {
    let mock = Arc::new(MockGateway::with_defaults());
    mock.set_open_orders(vec![open_order(1, Side::Sell, 51_000.0)]);
    let mut sync = synchronizer(&mock);

    let connection = sync.connect().await.unwrap();
    let _events = sync.established(connection);
    assert_eq!(sync.apply(&new_order(2, 52_000.0)), SyncAction::Continue);
    assert!(sync.session().open_orders.contains_order(2));

    sync.disconnected(&TradingError::Stream("socket closed".to_string()));
    assert_eq!(sync.state(), ConnectionState::Disconnected);

    // Events seen while disconnected are not applied
    sync.apply(&new_order(3, 53_000.0));
    assert!(!sync.session().open_orders.contains_order(3));

    // Meanwhile both orders filled and the balance moved
    mock.set_open_orders(Vec::new());
    mock.set_account(create_test_snapshot(400.0, 0.02));

    let connection = sync.connect().await.unwrap();
    let _events = sync.established(connection);

    assert!(sync.session().open_orders.is_empty());
    assert_eq!(sync.session().account.free("USDT"), 400.0);
    assert_eq!(sync.session().account.free("BTC"), 0.02);
    assert_eq!(sync.session_key(), Some("listen-key-2"));
    assert_eq!(mock.sessions_closed(), vec!["listen-key-1".to_string()]);
}

#[tokio::test]
async fn test_failed_attempts_back_off() {
    let mock = Arc::new(MockGateway::with_defaults());
    mock.script_session_error(TradingError::Transport("connection refused".to_string()));
    mock.script_session_error(TradingError::Transport("connection refused".to_string()));
    let mut sync = synchronizer(&mock);

    let err = assert_err!(sync.connect().await);
    let first = sync.disconnected(&err);

    let err = assert_err!(sync.connect().await);
    assert_eq!(sync.state(), ConnectionState::Connecting { attempt: 2 });
    let second = sync.disconnected(&err);
    assert_eq!(sync.state(), ConnectionState::Disconnected);
    assert!(second >= first);
    assert!(second <= Duration::from_millis(80));

    assert_ok!(sync.connect().await);
}

#[tokio::test]
async fn test_successful_connect_resets_backoff() {
    let mock = Arc::new(MockGateway::with_defaults());
    mock.script_session_error(TradingError::Transport("connection refused".to_string()));
    let mut sync = synchronizer(&mock);

    let err = assert_err!(sync.connect().await);
    sync.disconnected(&err);

    let connection = assert_ok!(sync.connect().await);
    assert_eq!(sync.state(), ConnectionState::Connecting { attempt: 2 });
    let _events = sync.established(connection);

    assert_eq!(sync.disconnected(&TradingError::Stream("closed".to_string())), Duration::from_millis(10));
}

#[tokio::test]
async fn test_expired_session_requests_reconnect() {
    let mock = Arc::new(MockGateway::with_defaults());
    let mut sync = synchronizer(&mock);

    let connection = sync.connect().await.unwrap();
    let _events = sync.established(connection);

    assert_eq!(sync.apply(&UserEvent::SessionExpired), SyncAction::Reconnect);
}

#[tokio::test]
async fn test_keepalive_only_when_connected() {
    let mock = Arc::new(MockGateway::with_defaults());
    let mut sync = synchronizer(&mock);
    assert!(sync.keepalive().is_none());

    let connection = sync.connect().await.unwrap();
    let _events = sync.established(connection);
    sync.keepalive().expect("connected session has a key").await.unwrap();

    sync.close().await.unwrap();
    assert!(sync.keepalive().is_none());
    assert_eq!(mock.sessions_closed(), vec!["listen-key-1".to_string()]);
}
