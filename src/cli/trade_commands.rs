// Live trading command: one engine task per symbol under a supervisor

use grid_bracket_bot::clients::{BinanceGateway, ExchangeGateway};
use grid_bracket_bot::core::{EngineSettings, EngineStats, SymbolEngine};
use grid_bracket_bot::progress::StartupProgress;
use grid_bracket_bot::{
    CanceledOrderStore, Config, Database, GridConfig, PreFlightValidator, TradingError, TradingResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

type EngineExit = (String, TradingResult<EngineStats>);

/// Owns the running symbol loops and their stop signals.
struct Supervisor {
    gateway: Arc<dyn ExchangeGateway>,
    settings: EngineSettings,
    archive: Option<CanceledOrderStore>,
    tasks: JoinSet<EngineExit>,
    running: HashMap<String, watch::Sender<bool>>,
    /// Signalled but not yet reaped; not restarted until they are.
    stopping: HashSet<String>,
}

impl Supervisor {
    fn new(gateway: Arc<dyn ExchangeGateway>, settings: EngineSettings, archive: Option<CanceledOrderStore>) -> Self {
        Self {
            gateway,
            settings,
            archive,
            tasks: JoinSet::new(),
            running: HashMap::new(),
            stopping: HashSet::new(),
        }
    }

    fn is_active(&self, symbol: &str) -> bool {
        self.running.contains_key(symbol) || self.stopping.contains(symbol)
    }

    async fn prepare(&self, grid: &GridConfig, progress: &StartupProgress) -> TradingResult<SymbolEngine> {
        let symbol = grid.symbol();

        progress.update(&symbol, "📐 resolving filters");
        let mut engine = SymbolEngine::initialize(
            Arc::clone(&self.gateway),
            grid,
            self.settings.clone(),
            self.archive.clone(),
        )
        .await?;

        progress.update(&symbol, "🔄 loading account snapshot");
        if let Err(e) = engine.synchronize().await {
            if !e.is_retryable() {
                return Err(e);
            }
            // The loop keeps reconnecting on its own.
            warn!("📡 {} initial sync failed, will retry: {}", symbol, e);
        }

        Ok(engine)
    }

    fn spawn(&mut self, engine: SymbolEngine) {
        let symbol = engine.symbol().to_string();
        let (stop_tx, stop_rx) = watch::channel(false);
        self.running.insert(symbol.clone(), stop_tx);
        self.tasks.spawn(async move {
            let result = engine.run(stop_rx).await;
            (symbol, result)
        });
    }

    /// Bring up every symbol; any failure at startup is fatal.
    async fn start_all(&mut self, grids: &[GridConfig]) -> TradingResult<()> {
        let symbols: Vec<String> = grids.iter().map(GridConfig::symbol).collect();
        let progress = StartupProgress::new(&symbols);

        for grid in grids {
            match self.prepare(grid, &progress).await {
                Ok(engine) => {
                    progress.ready(engine.symbol());
                    self.spawn(engine);
                }
                Err(e) => {
                    progress.failed(&grid.symbol(), &e.to_string());
                    progress.finish_all();
                    return Err(e);
                }
            }
        }

        progress.finish_all();
        Ok(())
    }

    /// Start a symbol picked up by a reload; a failure only skips it.
    async fn start_one(&mut self, grid: &GridConfig) {
        let symbol = grid.symbol();
        let progress = StartupProgress::new(std::slice::from_ref(&symbol));
        match self.prepare(grid, &progress).await {
            Ok(engine) => {
                progress.ready(&symbol);
                info!("➕ {} added", symbol);
                self.spawn(engine);
            }
            Err(e) => {
                progress.failed(&symbol, &e.to_string());
                error!("❌ {} not started: {}", symbol, e.user_message());
            }
        }
        progress.finish_all();
    }

    fn stop(&mut self, symbol: &str) {
        if let Some(stop) = self.running.remove(symbol) {
            info!("➖ {} removed, stopping", symbol);
            let _ = stop.send(true);
            self.stopping.insert(symbol.to_string());
        }
    }

    fn stop_all(&mut self) {
        let symbols: Vec<String> = self.running.keys().cloned().collect();
        for symbol in symbols {
            self.stop(&symbol);
        }
    }

    /// Record one finished loop; a fatal error is handed back.
    fn reap(&mut self, joined: Result<EngineExit, tokio::task::JoinError>) -> TradingResult<()> {
        let (symbol, result) = joined.map_err(|e| TradingError::Internal(format!("engine task failed: {}", e)))?;
        self.running.remove(&symbol);
        self.stopping.remove(&symbol);

        match result {
            Ok(stats) => {
                info!(
                    "📊 {}: {} ticks, {} submitted, {} filled, {} expired, {} abstained, {} canceled",
                    symbol, stats.ticks, stats.submitted, stats.filled, stats.expired, stats.abstained, stats.canceled
                );
                Ok(())
            }
            Err(e) => {
                error!("💥 {} terminated: {}", symbol, e.user_message());
                Err(e)
            }
        }
    }

    /// Stop everything and wait for the loops to wind down.
    async fn drain(&mut self) -> TradingResult<()> {
        self.stop_all();
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = self.reap(joined) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reconcile running loops with a reloaded symbol list. Parameters of a
    /// symbol that keeps running are not touched.
    async fn reconcile(&mut self, wanted: &[GridConfig]) {
        let wanted_symbols: HashSet<String> = wanted.iter().map(GridConfig::symbol).collect();

        let removed: Vec<String> = self
            .running
            .keys()
            .filter(|s| !wanted_symbols.contains(*s))
            .cloned()
            .collect();
        for symbol in removed {
            self.stop(&symbol);
        }

        for grid in wanted {
            if !self.is_active(&grid.symbol()) {
                self.start_one(grid).await;
            }
        }
    }
}

/// Enabled symbols, narrowed to `only` when given.
pub fn select_symbols(config: &Config, only: &[String]) -> TradingResult<Vec<GridConfig>> {
    let active: Vec<GridConfig> = config.active_symbols().into_iter().cloned().collect();
    if only.is_empty() {
        return Ok(active);
    }

    let mut selected = Vec::new();
    for wanted in only {
        let wanted = wanted.to_uppercase();
        match active.iter().find(|g| g.symbol() == wanted) {
            Some(grid) => selected.push(grid.clone()),
            None => {
                return Err(TradingError::Validation(format!(
                    "{} is not an enabled symbol in the configuration",
                    wanted
                )))
            }
        }
    }
    Ok(selected)
}

pub fn open_archive(config: &Config) -> TradingResult<Option<CanceledOrderStore>> {
    match &config.database.path {
        Some(path) => {
            let db = Database::new(path)?;
            info!("💾 Archiving canceled orders to {}", path);
            Ok(Some(CanceledOrderStore::new(db)))
        }
        None => Ok(None),
    }
}

async fn next_reload(reload: &mut Option<Interval>) {
    match reload {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn reload_timer(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    })
}

pub async fn run_trading(config_path: &str, config: Config, only: &[String]) -> TradingResult<()> {
    config.require_credentials()?;
    let grids = select_symbols(&config, only)?;
    if grids.is_empty() {
        return Err(TradingError::Validation("no enabled symbols to trade".to_string()));
    }

    info!("🚀 LIVE TRADING on {}", config.api.rest_url);
    warn!("⚠️  Real money!");

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(BinanceGateway::new(&config.api)?);

    info!("");
    let validation = PreFlightValidator::new(config.clone(), Arc::clone(&gateway))
        .validate_all()
        .await;
    validation.display();
    if !validation.passed {
        error!("");
        error!("❌ Pre-flight validation failed. Cannot proceed.");
        return Err(TradingError::Validation(
            "critical validation checks did not pass".to_string(),
        ));
    }
    info!("");

    let archive = open_archive(&config)?;
    let mut supervisor = Supervisor::new(gateway, EngineSettings::from(&config.engine), archive);
    supervisor.start_all(&grids).await?;
    info!("✅ {} symbol engine(s) running, Ctrl-C to stop", grids.len());

    let mut reload = reload_timer(config.engine.reload_interval());

    let outcome: TradingResult<()> = loop {
        if supervisor.tasks.is_empty() && reload.is_none() {
            info!("🏁 No symbol engines left running");
            break Ok(());
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("⚠️  Ctrl-C handler failed: {}", e);
                }
                info!("🛑 Ctrl-C received, shutting down...");
                break Ok(());
            }
            Some(joined) = supervisor.tasks.join_next(), if !supervisor.tasks.is_empty() => {
                if let Err(e) = supervisor.reap(joined) {
                    break Err(e);
                }
            }
            _ = next_reload(&mut reload) => {
                match Config::from_file(config_path) {
                    Ok(fresh) => match select_symbols(&fresh, only) {
                        Ok(wanted) => supervisor.reconcile(&wanted).await,
                        Err(e) => warn!("⚠️  Reloaded config rejected: {}", e),
                    },
                    Err(e) => warn!("⚠️  Config reload failed, keeping current symbols: {}", e),
                }
            }
        }
    };

    let drained = supervisor.drain().await;
    outcome.and(drained)
}
