// Read-only commands: pre-flight report and account status

use grid_bracket_bot::clients::{BinanceGateway, ExchangeGateway};
use grid_bracket_bot::core::AccountState;
use grid_bracket_bot::progress::Spinner;
use grid_bracket_bot::{Config, Database, CanceledOrderStore, PreFlightValidator, TradingError, TradingResult};
use std::sync::Arc;
use tracing::{info, warn};

const RECENT_CANCELS: usize = 5;

pub async fn validate(config: Config) -> TradingResult<()> {
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(BinanceGateway::new(&config.api)?);

    let spinner = Spinner::new("Running pre-flight checks...");
    let result = PreFlightValidator::new(config, gateway).validate_all().await;
    if result.passed {
        spinner.finish("Pre-flight checks complete");
    } else {
        spinner.finish_with_error("Pre-flight checks failed");
    }

    result.display();
    if result.passed {
        Ok(())
    } else {
        Err(TradingError::Validation(format!(
            "{} critical check(s) failed",
            result.critical_failures().len()
        )))
    }
}

pub async fn show_status(config: Config) -> TradingResult<()> {
    config.require_credentials()?;
    let gateway = BinanceGateway::new(&config.api)?;

    let spinner = Spinner::new("Fetching account...");
    let account = match gateway.account().await {
        Ok(snapshot) => {
            spinner.finish("Account loaded");
            AccountState::from_snapshot(&snapshot)
        }
        Err(e) => {
            spinner.finish_with_error("Account unavailable");
            return Err(e);
        }
    };

    let archive = match &config.database.path {
        Some(path) => match Database::new(path) {
            Ok(db) => Some(CanceledOrderStore::new(db)),
            Err(e) => {
                warn!("⚠️  Cannot open archive {}: {}", path, e);
                None
            }
        },
        None => None,
    };

    info!("📊 Account Status");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "💱 Commission: maker {:.4}%, taker {:.4}%",
        account.maker_rate() * 100.0,
        account.taker_rate() * 100.0
    );

    for grid in &config.symbols {
        let symbol = grid.symbol();
        let base = account.balance(&grid.base);
        let quote = account.balance(&grid.quote);

        info!("");
        info!(
            "🔹 {} ({}, earn {}, step {}%, margin {}%){}",
            symbol,
            grid.side,
            grid.profit_asset(),
            grid.grid_step,
            grid.margin,
            if grid.enabled { "" } else { " [disabled]" }
        );
        info!("   {}: free {:.8}, locked {:.8}", grid.base, base.free, base.locked);
        info!("   {}: free {:.8}, locked {:.8}", grid.quote, quote.free, quote.locked);

        match gateway.open_orders(&symbol).await {
            Ok(orders) if orders.is_empty() => info!("   📭 No open orders"),
            Ok(mut orders) => {
                orders.sort_by(|a, b| a.price.total_cmp(&b.price));
                info!("   📬 {} open order(s):", orders.len());
                for order in orders {
                    info!("      #{} {} {} @ {}", order.order_id, order.side, order.orig_qty, order.price);
                }
            }
            Err(e) => warn!("   ⚠️  Open orders unavailable: {}", e),
        }

        if let Some(archive) = &archive {
            match archive.recent(&symbol, RECENT_CANCELS) {
                Ok(canceled) if !canceled.is_empty() => {
                    info!("   🗑️  Recently canceled:");
                    for entry in canceled {
                        info!(
                            "      #{} {} {} @ {} at {}",
                            entry.order.order_id,
                            entry.order.side,
                            entry.order.orig_qty,
                            entry.order.price,
                            entry.canceled_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("   ⚠️  Archive unavailable: {}", e),
            }
        }
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}
