//! State synchronizer for one symbol.
//!
//! Owns the [`SessionState`] and the user-data connection lifecycle:
//! `Disconnected -> Connecting -> Connected`, and back to `Disconnected` on any
//! stream loss. Events missed while disconnected cannot be replayed, so every
//! successful (re)connect replaces the whole session from a fresh snapshot.
//! The stream is opened before the snapshot is fetched; events racing the
//! snapshot are buffered by the stream and applied on top of it.

use crate::clients::gateway::{ExchangeGateway, UserEventStream};
use crate::core::backoff::ExponentialBackoff;
use crate::core::state::{AccountSnapshot, SessionState};
use crate::core::types::{OpenOrder, UserEvent};
use crate::error::{TradingError, TradingResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
}

/// A live user-data session together with the snapshot taken after it opened.
pub struct Established {
    pub key: String,
    pub events: UserEventStream,
    pub snapshot: AccountSnapshot,
    pub orders: Vec<OpenOrder>,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("key", &self.key)
            .field("snapshot", &self.snapshot)
            .field("orders", &self.orders)
            .finish_non_exhaustive()
    }
}

/// What the engine must do after an event is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Continue,
    Reconnect,
}

pub struct StateSynchronizer {
    gateway: Arc<dyn ExchangeGateway>,
    symbol: String,
    state: ConnectionState,
    backoff: ExponentialBackoff,
    session_key: Option<String>,
    session: SessionState,
}

impl StateSynchronizer {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        symbol: &str,
        price_precision: u32,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            gateway,
            symbol: symbol.to_string(),
            state: ConnectionState::Disconnected,
            backoff,
            session_key: None,
            session: SessionState::new(symbol, price_precision),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.state, ConnectionState::Connecting { .. })
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    /// Start a connection attempt. The returned future owns everything it
    /// needs so the caller can poll it next to other work.
    pub fn connect(&mut self) -> BoxFuture<'static, TradingResult<Established>> {
        let attempt = self.backoff.attempt() + 1;
        self.state = ConnectionState::Connecting { attempt };
        info!("🔌 {} user stream connecting (attempt {})", self.symbol, attempt);

        let gateway = Arc::clone(&self.gateway);
        let symbol = self.symbol.clone();
        let stale_key = self.session_key.take();

        async move {
            if let Some(key) = stale_key {
                if let Err(e) = gateway.close_user_session(&key).await {
                    debug!("closing stale user session failed: {}", e);
                }
            }
            let key = gateway.start_user_session().await?;
            let events = gateway.user_stream(&key).await?;
            let snapshot = gateway.account().await?;
            let orders = gateway.open_orders(&symbol).await?;
            Ok(Established { key, events, snapshot, orders })
        }
        .boxed()
    }

    /// Adopt a completed connection; returns its event stream.
    pub fn established(&mut self, connection: Established) -> UserEventStream {
        self.session.reset(&connection.snapshot, connection.orders);
        self.session_key = Some(connection.key);
        self.state = ConnectionState::Connected;
        self.backoff.reset();

        info!(
            "🔄 {} snapshot loaded: {} assets, {} open orders",
            self.symbol,
            self.session.account.assets().count(),
            self.session.open_orders.len()
        );
        connection.events
    }

    /// Record a failed attempt or a lost stream; returns the delay before the
    /// next attempt.
    pub fn disconnected(&mut self, cause: &TradingError) -> Duration {
        self.state = ConnectionState::Disconnected;
        let delay = self.backoff.next_delay();
        warn!(
            "📡 {} user stream down ({}), reconnecting in {:?}",
            self.symbol, cause, delay
        );
        delay
    }

    /// Apply one pushed event to the session.
    pub fn apply(&mut self, event: &UserEvent) -> SyncAction {
        if !self.is_connected() {
            return SyncAction::Continue;
        }
        match event {
            UserEvent::SessionExpired => SyncAction::Reconnect,
            other => {
                self.session.apply(other);
                SyncAction::Continue
            }
        }
    }

    pub fn keepalive(&self) -> Option<BoxFuture<'static, TradingResult<()>>> {
        if !self.is_connected() {
            return None;
        }
        let key = self.session_key.clone()?;
        let gateway = Arc::clone(&self.gateway);
        Some(async move { gateway.keepalive_user_session(&key).await }.boxed())
    }

    /// Close the user-data session, if any.
    pub async fn close(&mut self) -> TradingResult<()> {
        self.state = ConnectionState::Disconnected;
        match self.session_key.take() {
            Some(key) => {
                self.gateway.close_user_session(&key).await?;
                info!("👋 {} user session closed", self.symbol);
                Ok(())
            }
            None => Ok(()),
        }
    }
}
