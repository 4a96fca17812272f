//! Per-symbol trading loop.
//!
//! One [`SymbolEngine`] owns all state for one symbol and is driven by a
//! single task. Market ticks, user-data events, timers and the completions of
//! network calls are all handled one at a time in `run`, so nothing here is
//! shared or locked. Network calls run as owned futures in `tasks`; the slot
//! they trade stays claimed in the guard until their completion is handled.

use crate::clients::gateway::{ExchangeGateway, TickStream, UserEventStream};
use crate::config::{EngineConfig, GridConfig};
use crate::core::backoff::ExponentialBackoff;
use crate::core::filters::ExchangeFilters;
use crate::core::guard::ConcurrencyGuard;
use crate::core::sequencer::OrderSequencer;
use crate::core::sizing::SizingCalculator;
use crate::core::state::SessionState;
use crate::core::sync::{Established, StateSynchronizer, SyncAction};
use crate::core::types::{
    AbstainReason, BracketIntent, BracketResult, CanceledOrder, GuardMode, OpenOrder, OrderStatus,
    Protocol, Slot, UserEvent,
};
use crate::db::CanceledOrderStore;
use crate::error::{Disposition, TradingError, TradingResult, CODE_UNKNOWN_ORDER};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, Stream};
use futures_util::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Loop settings shared by every symbol.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub protocol: Protocol,
    pub guard: GuardMode,
    pub unsubscribe_on_shutdown: bool,
    pub keepalive_interval: Duration,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            protocol: config.protocol,
            guard: config.guard,
            unsubscribe_on_shutdown: config.unsubscribe_on_shutdown,
            keepalive_interval: config.keepalive_interval(),
            reconnect_base_ms: config.reconnect_base_ms,
            reconnect_max_ms: config.reconnect_max_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// User-data session not live; balances may be stale.
    NotSynchronized,
    SlotBusy,
    /// An open-order-cap cancel is outstanding.
    CancelPending,
    /// Resting orders plus placements in flight already fill the cap.
    OrderCapReached,
    InvalidPrice,
}

/// What one tick led to.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Dropped(DropReason),
    Abstained(AbstainReason),
    Submitted(BracketIntent),
    CancelSubmitted { order_id: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub ticks: u64,
    pub dropped: u64,
    pub abstained: u64,
    pub submitted: u64,
    pub filled: u64,
    pub expired: u64,
    pub canceled: u64,
}

enum TaskOutput {
    Placement {
        intent: BracketIntent,
        result: TradingResult<BracketResult>,
    },
    Cancel {
        order_id: u64,
        result: TradingResult<CanceledOrder>,
    },
    UserConnected(TradingResult<Established>),
    MarketConnected(TradingResult<TickStream>),
    Keepalive(TradingResult<()>),
}

async fn next_item<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub struct SymbolEngine {
    symbol: String,
    settings: EngineSettings,
    gateway: Arc<dyn ExchangeGateway>,
    sizing: SizingCalculator,
    sequencer: OrderSequencer,
    guard: ConcurrencyGuard,
    sync: StateSynchronizer,
    archive: Option<CanceledOrderStore>,
    tasks: FuturesUnordered<BoxFuture<'static, TaskOutput>>,
    user: Option<UserEventStream>,
    market: Option<TickStream>,
    user_retry: Option<Instant>,
    resync_pending: bool,
    market_retry: Option<Instant>,
    market_backoff: ExponentialBackoff,
    last_price: Option<f64>,
    cancel_in_flight: Option<u64>,
    stats: EngineStats,
}

impl SymbolEngine {
    /// Resolve the symbol's filters and build every component.
    pub async fn initialize(
        gateway: Arc<dyn ExchangeGateway>,
        grid: &GridConfig,
        settings: EngineSettings,
        archive: Option<CanceledOrderStore>,
    ) -> TradingResult<Self> {
        let symbol = grid.symbol();
        let info = gateway.symbol_info(&symbol).await?;

        if !info.base_asset.eq_ignore_ascii_case(&grid.base)
            || !info.quote_asset.eq_ignore_ascii_case(&grid.quote)
        {
            return Err(TradingError::Validation(format!(
                "{} is {}/{} on the exchange, configured as {}/{}",
                symbol, info.base_asset, info.quote_asset, grid.base, grid.quote
            )));
        }
        if settings.protocol == Protocol::Bracket && !info.oto_allowed {
            return Err(TradingError::Validation(format!(
                "{} does not accept one-triggers-the-other order lists; use protocol = \"two_step\"",
                symbol
            )));
        }

        let filters = ExchangeFilters::resolve(&info, grid)?;
        let sizing = SizingCalculator::new(grid, filters);
        let sequencer = OrderSequencer::new(
            Arc::clone(&gateway),
            settings.protocol,
            filters,
            sizing.funding_asset(),
        );
        let backoff = ExponentialBackoff::from_millis(settings.reconnect_base_ms, settings.reconnect_max_ms);
        let sync = StateSynchronizer::new(Arc::clone(&gateway), &symbol, filters.price_precision, backoff.clone());

        Ok(Self {
            symbol,
            guard: ConcurrencyGuard::new(settings.guard),
            settings,
            gateway,
            sizing,
            sequencer,
            sync,
            archive,
            tasks: FuturesUnordered::new(),
            user: None,
            market: None,
            user_retry: None,
            resync_pending: false,
            market_retry: None,
            market_backoff: backoff,
            last_price: None,
            cancel_in_flight: None,
            stats: EngineStats::default(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn filters(&self) -> &ExchangeFilters {
        self.sizing.filters()
    }

    pub fn session(&self) -> &SessionState {
        self.sync.session()
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    pub fn is_synchronized(&self) -> bool {
        self.sync.is_connected()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Connect the user-data session and load the snapshot, waiting for it.
    pub async fn synchronize(&mut self) -> TradingResult<()> {
        let connection = self.sync.connect().await?;
        self.user = Some(self.sync.established(connection));
        self.user_retry = None;
        Ok(())
    }

    /// Apply one user-data event.
    pub fn apply_user_event(&mut self, event: &UserEvent) {
        if self.sync.apply(event) == SyncAction::Reconnect {
            self.lose_user_stream(&TradingError::Stream(format!(
                "{} user session expired",
                self.symbol
            )));
        }
    }

    /// Evaluate one trade print. Placements and cancels it starts complete
    /// later through [`Self::process_next_task`] or the run loop.
    pub fn handle_tick(&mut self, price: f64) -> TickOutcome {
        self.stats.ticks += 1;

        if !self.sync.is_connected() {
            return self.drop_tick(DropReason::NotSynchronized, price);
        }
        if !price.is_finite() || price <= 0.0 {
            return self.drop_tick(DropReason::InvalidPrice, price);
        }
        self.last_price = Some(price);

        if self.cancel_in_flight.is_some() {
            return self.drop_tick(DropReason::CancelPending, price);
        }

        let slot = self.sizing.slot_of(price);
        if !self.guard.is_available(slot) {
            return self.drop_tick(DropReason::SlotBusy, price);
        }

        if let Some(cap) = self.sizing.filters().max_num_orders {
            let resting = self.sync.session().open_orders.len();
            if resting >= cap {
                if let Some(order) = self.sync.session().open_orders.furthest_from(price).cloned() {
                    return self.cancel_for_cap(order, cap);
                }
            }
            // Every placement in flight may leave one more exit resting.
            if resting + self.guard.in_flight() >= cap {
                return self.drop_tick(DropReason::OrderCapReached, price);
            }
        }

        match self.sizing.evaluate(price, self.sync.session()) {
            Err(reason) => {
                self.stats.abstained += 1;
                self.log_abstain(slot, price, &reason);
                TickOutcome::Abstained(reason)
            }
            Ok(intent) => {
                if !self.guard.try_claim(slot) {
                    return self.drop_tick(DropReason::SlotBusy, price);
                }
                self.stats.submitted += 1;

                let sequencer = self.sequencer.clone();
                let submitted = intent.clone();
                self.tasks.push(
                    async move {
                        let result = sequencer.execute(submitted.clone()).await;
                        TaskOutput::Placement { intent: submitted, result }
                    }
                    .boxed(),
                );
                TickOutcome::Submitted(intent)
            }
        }
    }

    /// Wait for the next outstanding network call and apply its result.
    /// Returns `Ok(false)` when nothing is outstanding.
    pub async fn process_next_task(&mut self) -> TradingResult<bool> {
        match self.tasks.next().await {
            Some(output) => {
                self.on_task(output)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run until shutdown is signalled or a fatal error occurs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TradingResult<EngineStats> {
        info!(
            "🚀 {} engine starting ({:?}, {:?} guard, grid step {}%)",
            self.symbol,
            self.settings.protocol,
            self.settings.guard,
            self.sizing.mapper().step_percent()
        );

        if self.user.is_none() {
            self.connect_user();
        }
        self.connect_market();

        let mut keepalive = tokio::time::interval_at(
            Instant::now() + self.settings.keepalive_interval,
            self.settings.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome: TradingResult<()> = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("🛑 {} shutdown requested", self.symbol);
                        break Ok(());
                    }
                }
                Some(output) = self.tasks.next(), if !self.tasks.is_empty() => {
                    if let Err(e) = self.on_task(output) {
                        break Err(e);
                    }
                }
                event = next_item(&mut self.user) => {
                    match event {
                        Some(Ok(event)) => self.apply_user_event(&event),
                        Some(Err(e)) => self.lose_user_stream(&e),
                        None => self.lose_user_stream(&TradingError::Stream("user stream ended".into())),
                    }
                }
                tick = next_item(&mut self.market) => {
                    match tick {
                        Some(Ok(tick)) => {
                            self.handle_tick(tick.price);
                        }
                        Some(Err(e)) => self.lose_market_stream(&e),
                        None => self.lose_market_stream(&TradingError::Stream("market stream ended".into())),
                    }
                }
                _ = wait_until(self.user_retry) => {
                    self.reconnect();
                }
                _ = wait_until(self.market_retry) => {
                    self.market_retry = None;
                    self.connect_market();
                }
                _ = keepalive.tick() => {
                    if let Some(ping) = self.sync.keepalive() {
                        self.tasks.push(async move { TaskOutput::Keepalive(ping.await) }.boxed());
                    }
                }
            }
        };

        if let Err(e) = outcome {
            error!("💥 {} stopping on fatal error: {}", self.symbol, e);
            return Err(e);
        }

        self.wind_down().await;
        Ok(self.stats)
    }

    async fn wind_down(&mut self) {
        self.market = None;
        self.user = None;

        while let Some(output) = self.tasks.next().await {
            match output {
                TaskOutput::Placement { intent, result } => {
                    self.guard.release(intent.slot);
                    match result {
                        Ok(outcome) => info!("🧾 {} slot {} settled during shutdown: {:?}", self.symbol, intent.slot, outcome),
                        Err(e) => warn!("🧾 {} slot {} failed during shutdown: {}", self.symbol, intent.slot, e),
                    }
                }
                TaskOutput::Cancel { order_id, result } => {
                    if let Ok(canceled) = result {
                        self.archive_cancel(&canceled);
                    } else {
                        debug!("cancel of {} unresolved at shutdown", order_id);
                    }
                }
                _ => {}
            }
        }

        if self.settings.unsubscribe_on_shutdown {
            if let Err(e) = self.sync.close().await {
                warn!("⚠️  {} closing user session failed: {}", self.symbol, e);
            }
        }
        info!("✅ {} stopped: {:?}", self.symbol, self.stats);
    }

    fn drop_tick(&mut self, reason: DropReason, price: f64) -> TickOutcome {
        self.stats.dropped += 1;
        debug!("⏭️  {} tick {} dropped: {:?}", self.symbol, price, reason);
        TickOutcome::Dropped(reason)
    }

    fn log_abstain(&self, slot: Slot, price: f64, reason: &AbstainReason) {
        match reason {
            AbstainReason::InsufficientBalance { .. } => {
                info!("💸 {} slot {} @ {}: {}", self.symbol, slot, price, reason)
            }
            r if r.is_invariant() => info!("⚖️  {} slot {} @ {}: {}", self.symbol, slot, price, reason),
            _ => debug!("{} slot {} @ {}: {}", self.symbol, slot, price, reason),
        }
    }

    fn cancel_for_cap(&mut self, order: OpenOrder, cap: usize) -> TickOutcome {
        info!(
            "✂️  {} at {} open orders (cap {}), canceling {} {} @ {}",
            self.symbol,
            self.sync.session().open_orders.len(),
            cap,
            order.order_id,
            order.side,
            order.price
        );
        self.cancel_in_flight = Some(order.order_id);

        let gateway = Arc::clone(&self.gateway);
        let symbol = self.symbol.clone();
        let order_id = order.order_id;
        self.tasks.push(
            async move {
                let result = gateway.cancel_order(&symbol, order_id).await;
                TaskOutput::Cancel { order_id, result }
            }
            .boxed(),
        );
        TickOutcome::CancelSubmitted { order_id }
    }

    /// Start reconnecting the user session in the background. No-op while an
    /// attempt is already outstanding, so at most one listen key is pending.
    pub fn reconnect(&mut self) {
        self.user_retry = None;
        if self.sync.is_connecting() {
            return;
        }
        self.connect_user();
    }

    fn connect_user(&mut self) {
        let connecting = self.sync.connect();
        self.tasks
            .push(async move { TaskOutput::UserConnected(connecting.await) }.boxed());
    }

    fn connect_market(&mut self) {
        let gateway = Arc::clone(&self.gateway);
        let symbol = self.symbol.clone();
        self.tasks.push(
            async move { TaskOutput::MarketConnected(gateway.market_stream(&symbol).await) }.boxed(),
        );
    }

    fn lose_user_stream(&mut self, cause: &TradingError) {
        self.user = None;
        if self.sync.is_connecting() {
            // The pending attempt may have snapshotted before this; redo it
            // once that attempt lands.
            self.resync_pending = true;
            return;
        }
        if self.user_retry.is_none() {
            self.schedule_user_retry(cause);
        }
    }

    fn schedule_user_retry(&mut self, cause: &TradingError) {
        let delay = self.sync.disconnected(cause);
        self.user_retry = Some(Instant::now() + delay);
    }

    fn lose_market_stream(&mut self, cause: &TradingError) {
        self.market = None;
        let delay = self.market_backoff.next_delay();
        warn!("📡 {} market stream down ({}), reconnecting in {:?}", self.symbol, cause, delay);
        self.market_retry = Some(Instant::now() + delay);
    }

    fn on_task(&mut self, output: TaskOutput) -> TradingResult<()> {
        match output {
            TaskOutput::Placement { intent, result } => self.on_placement(intent, result),
            TaskOutput::Cancel { order_id, result } => self.on_cancel(order_id, result),
            TaskOutput::UserConnected(Ok(connection)) => {
                self.user = Some(self.sync.established(connection));
                if std::mem::take(&mut self.resync_pending) {
                    self.lose_user_stream(&TradingError::Stream(format!(
                        "{} order state changed while connecting",
                        self.symbol
                    )));
                }
                Ok(())
            }
            TaskOutput::UserConnected(Err(e)) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                // The next attempt snapshots afresh anyway.
                self.resync_pending = false;
                self.schedule_user_retry(&e);
                Ok(())
            }
            TaskOutput::MarketConnected(Ok(stream)) => {
                info!("📈 {} market stream connected", self.symbol);
                self.market = Some(stream);
                self.market_backoff.reset();
                Ok(())
            }
            TaskOutput::MarketConnected(Err(e)) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                self.lose_market_stream(&e);
                Ok(())
            }
            TaskOutput::Keepalive(Ok(())) => {
                debug!("{} user session kept alive", self.symbol);
                Ok(())
            }
            TaskOutput::Keepalive(Err(e)) => {
                warn!("⚠️  {} keepalive failed: {}", self.symbol, e);
                self.lose_user_stream(&e);
                Ok(())
            }
        }
    }

    fn on_placement(&mut self, intent: BracketIntent, result: TradingResult<BracketResult>) -> TradingResult<()> {
        self.guard.release(intent.slot);

        match result {
            Ok(BracketResult::Filled { entry, exit }) => {
                self.stats.filled += 1;
                info!(
                    "✅ {} slot {}: entry {} filled @ {}, exit {} resting @ {}",
                    self.symbol, intent.slot, entry.order_id, intent.entry.price, exit.order_id, intent.exit.price
                );
                if matches!(exit.status, OrderStatus::New | OrderStatus::PendingNew) {
                    self.sync.session_mut().open_orders.insert(OpenOrder {
                        order_id: exit.order_id,
                        side: intent.exit.side,
                        price: intent.exit.price,
                        orig_qty: intent.exit.quantity,
                    });
                }
                Ok(())
            }
            Ok(BracketResult::Expired { .. }) => {
                self.stats.expired += 1;
                Ok(())
            }
            Ok(BracketResult::Rejected(reason)) | Ok(BracketResult::Aborted(reason)) => {
                self.stats.abstained += 1;
                self.log_abstain(intent.slot, intent.entry.price, &reason);
                Ok(())
            }
            Err(e) => match e.disposition() {
                Disposition::Abstain => {
                    self.stats.abstained += 1;
                    info!("⚖️  {} slot {}: {}", self.symbol, intent.slot, e);
                    Ok(())
                }
                Disposition::Retry => {
                    // Whether the entry reached the book is unknown; rebuild state.
                    warn!("📡 {} slot {}: placement failed in transport: {}", self.symbol, intent.slot, e);
                    self.lose_user_stream(&e);
                    Ok(())
                }
                Disposition::Fatal => {
                    error!("🚨 {} slot {}: {}", self.symbol, intent.slot, e.user_message());
                    Err(e)
                }
            },
        }
    }

    fn on_cancel(&mut self, order_id: u64, result: TradingResult<CanceledOrder>) -> TradingResult<()> {
        self.cancel_in_flight = None;

        match result {
            Ok(canceled) => {
                self.stats.canceled += 1;
                self.sync.session_mut().open_orders.remove(order_id);
                info!("🗑️  {} canceled order {} @ {}", self.symbol, order_id, canceled.price);
                self.archive_cancel(&canceled);
                Ok(())
            }
            Err(TradingError::UnexpectedRejection { code: CODE_UNKNOWN_ORDER, message }) => {
                // Filled or canceled elsewhere before the cancel landed.
                info!("🗑️  {} order {} already gone: {}", self.symbol, order_id, message);
                self.sync.session_mut().open_orders.remove(order_id);
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!("📡 {} cancel of {} failed: {}", self.symbol, order_id, e);
                self.lose_user_stream(&e);
                Ok(())
            }
            Err(e) => {
                error!("🚨 {} cancel of {} rejected: {}", self.symbol, order_id, e);
                Err(e)
            }
        }
    }

    fn archive_cancel(&self, canceled: &CanceledOrder) {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.record(canceled) {
                warn!("⚠️  {} archiving canceled order {} failed: {}", self.symbol, canceled.order_id, e);
            }
        }
    }
}
