// Symbol filter resolution: rounding precision and effective order minimums

use crate::config::GridConfig;
use crate::error::{TradingError, TradingResult};
use tracing::info;

/// Venue metadata for one symbol, as reported by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub tick_size: f64,
    pub step_size: f64,
    pub min_notional: f64,
    pub max_num_orders: Option<usize>,
    pub trading: bool,
    /// Whether the venue accepts one-triggers-the-other order lists.
    pub oto_allowed: bool,
}

/// Rounding and sizing limits derived once per symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeFilters {
    pub price_precision: u32,
    pub lot_precision: u32,
    /// `max(configured floor, venue minimum)`
    pub min_notional: f64,
    pub max_num_orders: Option<usize>,
}

/// Decimal places implied by an increment such as `0.01`.
pub fn precision_of(increment: f64) -> TradingResult<u32> {
    if !increment.is_finite() || increment <= 0.0 || increment > 1.0 {
        return Err(TradingError::Validation(format!(
            "increment {} must be in (0, 1]",
            increment
        )));
    }
    Ok((-increment.log10()).round() as u32)
}

impl ExchangeFilters {
    pub fn resolve(info: &SymbolInfo, grid: &GridConfig) -> TradingResult<Self> {
        if !info.trading {
            return Err(TradingError::Validation(format!(
                "{} is not open for trading",
                info.symbol
            )));
        }

        let filters = Self {
            price_precision: precision_of(info.tick_size)?,
            lot_precision: precision_of(info.step_size)?,
            min_notional: grid.min_notional.max(info.min_notional),
            max_num_orders: info.max_num_orders,
        };

        info!(
            "📐 {} filters: price precision {}, lot precision {}, notional {} (floor {}, venue {}), max orders {}",
            info.symbol,
            filters.price_precision,
            filters.lot_precision,
            filters.min_notional,
            grid.min_notional,
            info.min_notional,
            filters
                .max_num_orders
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        );

        Ok(filters)
    }
}
