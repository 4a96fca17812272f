//! Pre-flight validation for the grid bracket bot
//!
//! Runs before any order can be placed: configuration, credentials, symbol
//! resolution and a few sanity checks of the grid against the live book and
//! the account.

use crate::clients::gateway::ExchangeGateway;
use crate::config::{Config, GridConfig};
use crate::core::filters::{ExchangeFilters, SymbolInfo};
use crate::core::sizing::SizingCalculator;
use crate::core::state::AccountState;
use crate::core::types::Side;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Validation result with detailed findings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub checks: Vec<ValidationCheck>,
}

#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub level: ValidationLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must pass for trading to start
    Warning,  // Trading starts, but probably abstains a lot
    Info,     // Informational only
}

impl ValidationCheck {
    fn pass(name: impl Into<String>, message: impl Into<String>, level: ValidationLevel) -> Self {
        Self { name: name.into(), passed: true, message: message.into(), level }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>, level: ValidationLevel) -> Self {
        Self { name: name.into(), passed: false, message: message.into(), level }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            passed: true,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, check: ValidationCheck) {
        if !check.passed && check.level == ValidationLevel::Critical {
            self.passed = false;
        }
        self.checks.push(check);
    }

    pub fn critical_failures(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Critical)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Warning)
            .collect()
    }

    pub fn display(&self) {
        info!("🔍 Pre-flight Validation");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        for check in &self.checks {
            let icon = if check.passed {
                "✅"
            } else {
                match check.level {
                    ValidationLevel::Critical => "❌",
                    ValidationLevel::Warning => "⚠️",
                    ValidationLevel::Info => "ℹ️",
                }
            };

            info!("{} {} - {}", icon, check.name, check.message);
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if !self.passed {
            let failures = self.critical_failures();
            error!("❌ Validation failed: {} critical issue(s)", failures.len());
            for failure in failures {
                error!("   • {}: {}", failure.name, failure.message);
            }
        } else {
            let warnings = self.warnings();
            if !warnings.is_empty() {
                warn!("⚠️  {} warning(s) detected", warnings.len());
                for warning in warnings {
                    warn!("   • {}: {}", warning.name, warning.message);
                }
            }
            info!("✅ All critical checks passed");
        }
    }
}

/// Pre-flight validator for live trading
pub struct PreFlightValidator {
    config: Config,
    gateway: Arc<dyn ExchangeGateway>,
}

impl PreFlightValidator {
    pub fn new(config: Config, gateway: Arc<dyn ExchangeGateway>) -> Self {
        PreFlightValidator { config, gateway }
    }

    /// Run the full suite. Venue checks are skipped when the configuration
    /// itself is unusable.
    pub async fn validate_all(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(check_config(&self.config));
        result.add_check(check_credentials(&self.config));
        if !result.passed {
            return result;
        }

        let account = match self.gateway.account().await {
            Ok(snapshot) => {
                let account = AccountState::from_snapshot(&snapshot);
                result.add_check(check_commission(&account));
                Some(account)
            }
            Err(e) => {
                result.add_check(ValidationCheck::fail(
                    "Account",
                    format!("cannot read account: {}", e),
                    ValidationLevel::Critical,
                ));
                None
            }
        };

        for grid in self.config.active_symbols() {
            self.validate_symbol(grid, account.as_ref(), &mut result).await;
        }

        result
    }

    async fn validate_symbol(&self, grid: &GridConfig, account: Option<&AccountState>, result: &mut ValidationResult) {
        let symbol = grid.symbol();

        let info = match self.gateway.symbol_info(&symbol).await {
            Ok(info) => info,
            Err(e) => {
                result.add_check(ValidationCheck::fail(
                    format!("{} symbol", symbol),
                    e.to_string(),
                    ValidationLevel::Critical,
                ));
                return;
            }
        };

        let filters = match ExchangeFilters::resolve(&info, grid) {
            Ok(filters) => filters,
            Err(e) => {
                result.add_check(ValidationCheck::fail(
                    format!("{} symbol", symbol),
                    e.to_string(),
                    ValidationLevel::Critical,
                ));
                return;
            }
        };
        result.add_check(check_symbol(&info, grid, &filters));
        result.add_check(check_notional(&info, grid, &filters));

        if let Some(account) = account {
            result.add_check(check_fee_margin(grid, account));
        }

        let price = match self.gateway.last_price(&symbol).await {
            Ok(price) => price,
            Err(e) => {
                result.add_check(ValidationCheck::fail(
                    format!("{} price", symbol),
                    format!("cannot read last price: {}", e),
                    ValidationLevel::Warning,
                ));
                return;
            }
        };
        result.add_check(check_resolution(grid, &filters, price));

        if let Some(account) = account {
            result.add_check(check_funding(grid, filters, account, price));
        }
    }
}

pub fn check_config(config: &Config) -> ValidationCheck {
    match config.validate() {
        Ok(()) => ValidationCheck::pass(
            "Configuration",
            format!("{} symbol(s), {} enabled", config.symbols.len(), config.active_symbols().len()),
            ValidationLevel::Critical,
        ),
        Err(e) => ValidationCheck::fail("Configuration", e.to_string(), ValidationLevel::Critical),
    }
}

pub fn check_credentials(config: &Config) -> ValidationCheck {
    match config.require_credentials() {
        Ok(()) => ValidationCheck::pass("API credentials", "present", ValidationLevel::Critical),
        Err(e) => ValidationCheck::fail("API credentials", e.to_string(), ValidationLevel::Critical),
    }
}

pub fn check_commission(account: &AccountState) -> ValidationCheck {
    let (maker, taker) = (account.maker_rate(), account.taker_rate());
    let readable = maker.is_finite() && taker.is_finite() && maker >= 0.0 && taker >= 0.0;
    let message = format!("maker {:.4}%, taker {:.4}%", maker * 100.0, taker * 100.0);

    if readable {
        ValidationCheck::pass("Commission rates", message, ValidationLevel::Critical)
    } else {
        ValidationCheck::fail("Commission rates", message, ValidationLevel::Critical)
    }
}

/// Asset pair as configured versus as listed.
pub fn check_symbol(info: &SymbolInfo, grid: &GridConfig, filters: &ExchangeFilters) -> ValidationCheck {
    let name = format!("{} symbol", info.symbol);
    if !info.base_asset.eq_ignore_ascii_case(&grid.base) || !info.quote_asset.eq_ignore_ascii_case(&grid.quote) {
        return ValidationCheck::fail(
            name,
            format!(
                "listed as {}/{}, configured as {}/{}",
                info.base_asset, info.quote_asset, grid.base, grid.quote
            ),
            ValidationLevel::Critical,
        );
    }

    ValidationCheck::pass(
        name,
        format!(
            "price precision {}, lot precision {}, max orders {}",
            filters.price_precision,
            filters.lot_precision,
            filters
                .max_num_orders
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        ),
        ValidationLevel::Critical,
    )
}

pub fn check_notional(info: &SymbolInfo, grid: &GridConfig, filters: &ExchangeFilters) -> ValidationCheck {
    let name = format!("{} notional", info.symbol);
    let message = format!(
        "effective {} {} (configured {}, venue minimum {})",
        filters.min_notional, grid.quote, grid.min_notional, info.min_notional
    );

    if grid.min_notional >= info.min_notional {
        ValidationCheck::pass(name, message, ValidationLevel::Info)
    } else {
        ValidationCheck::fail(name, format!("{}; venue minimum applies", message), ValidationLevel::Info)
    }
}

/// A bucket or a margin narrower than one tick cannot be expressed in prices.
pub fn check_resolution(grid: &GridConfig, filters: &ExchangeFilters, price: f64) -> ValidationCheck {
    let name = format!("{} grid resolution", grid.symbol());
    let tick = 10f64.powi(-(filters.price_precision as i32));
    let bucket = price * grid.grid_step / 100.0;
    let margin = price * grid.margin_ratio();

    if bucket < tick {
        return ValidationCheck::fail(
            name,
            format!("bucket width {:.8} at {} is narrower than one tick ({})", bucket, price, tick),
            ValidationLevel::Warning,
        );
    }
    if margin < tick {
        return ValidationCheck::fail(
            name,
            format!("margin {:.8} at {} is narrower than one tick ({})", margin, price, tick),
            ValidationLevel::Warning,
        );
    }

    ValidationCheck::pass(
        name,
        format!("bucket width {:.8} at {} covers {:.0} tick(s)", bucket, price, (bucket / tick).floor()),
        ValidationLevel::Warning,
    )
}

/// Fees eating the whole margin make every bracket a loss.
pub fn check_fee_margin(grid: &GridConfig, account: &AccountState) -> ValidationCheck {
    let name = format!("{} fees", grid.symbol());
    let fees = account.maker_rate() + account.taker_rate();
    let margin = grid.margin_ratio();
    let message = format!("round-trip fees {:.4}% against margin {:.4}%", fees * 100.0, margin * 100.0);

    if fees < margin {
        ValidationCheck::pass(name, message, ValidationLevel::Warning)
    } else {
        ValidationCheck::fail(name, message, ValidationLevel::Warning)
    }
}

pub fn check_funding(grid: &GridConfig, filters: ExchangeFilters, account: &AccountState, price: f64) -> ValidationCheck {
    let sizing = SizingCalculator::new(grid, filters);
    let asset = sizing.funding_asset().to_string();
    let legs = sizing.size(price, account.maker_rate(), account.taker_rate());
    let required = match grid.side {
        Side::Buy => legs.entry_qty * legs.entry_price,
        Side::Sell => legs.entry_qty,
    };
    let available = account.free(&asset);

    let name = format!("{} funding", grid.symbol());
    let message = format!("one entry needs {:.8} {}, free {:.8}", required, asset, available);
    if available >= required {
        ValidationCheck::pass(name, message, ValidationLevel::Warning)
    } else {
        ValidationCheck::fail(name, message, ValidationLevel::Warning)
    }
}
