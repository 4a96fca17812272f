// Configuration management for the grid bracket bot

use crate::core::types::{EarnAsset, GuardMode, Protocol, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const API_KEY_ENV: &str = "BINANCE_API_KEY";
pub const API_SECRET_ENV: &str = "BINANCE_API_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub guard: GuardMode,
    #[serde(default = "default_true")]
    pub unsubscribe_on_shutdown: bool,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
    /// Seconds between re-reads of the symbol list, 0 disables hot reload.
    #[serde(default)]
    pub reload_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Canceled-order archive; archiving is off when unset.
    #[serde(default)]
    pub path: Option<String>,
}

/// Grid parameters for one trading symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub base: String,
    pub quote: String,
    /// Bucket width in percent.
    pub grid_step: f64,
    pub side: Side,
    pub earn: EarnAsset,
    /// Profit margin between entry and exit, in percent.
    pub margin: f64,
    /// Notional floor; the venue minimum wins when larger.
    #[serde(default = "default_min_notional")]
    pub min_notional: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl GridConfig {
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote).to_uppercase()
    }

    /// Asset a completed round trip accrues its profit in.
    pub fn profit_asset(&self) -> &str {
        match self.earn {
            EarnAsset::Base => &self.base,
            EarnAsset::Quote => &self.quote,
        }
    }

    /// Margin as a fraction.
    pub fn margin_ratio(&self) -> f64 {
        self.margin / 100.0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let symbol = self.symbol();
        if self.base.trim().is_empty() || self.quote.trim().is_empty() {
            return Err(ConfigError::Validation("base and quote must be set".to_string()));
        }
        if !self.grid_step.is_finite() || self.grid_step <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{}: grid_step must be positive",
                symbol
            )));
        }
        if !self.margin.is_finite() || self.margin <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{}: margin must be positive",
                symbol
            )));
        }
        if !self.min_notional.is_finite() || self.min_notional < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{}: min_notional must be non-negative",
                symbol
            )));
        }
        if let Some(trigger) = self.trigger_price {
            if !trigger.is_finite() || trigger <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{}: trigger_price must be positive",
                    symbol
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub symbols: Vec<GridConfig>,
}

fn default_rest_url() -> String { "https://api.binance.com".to_string() }
fn default_ws_url() -> String { "wss://stream.binance.com:9443".to_string() }
fn default_recv_window() -> u64 { 5000 }
fn default_true() -> bool { true }
fn default_keepalive() -> u64 { 30 * 60 }
fn default_reconnect_base() -> u64 { 1000 }
fn default_reconnect_max() -> u64 { 60_000 }
fn default_min_notional() -> f64 { 10.2 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            recv_window_ms: default_recv_window(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            guard: GuardMode::default(),
            unsubscribe_on_shutdown: true,
            keepalive_interval_secs: default_keepalive(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_max_ms: default_reconnect_max(),
            reload_interval_secs: 0,
        }
    }
}

impl EngineConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            engine: EngineConfig::default(),
            database: DatabaseConfig {
                path: Some("data/canceled_orders.db".to_string()),
            },
            symbols: vec![GridConfig {
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                grid_step: 1.0,
                side: Side::Buy,
                earn: EarnAsset::Quote,
                margin: 1.0,
                min_notional: default_min_notional(),
                trigger_price: None,
                enabled: true,
            }],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::FileWrite(e.to_string()))?;
            }
        }

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Credentials from the environment take precedence over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api.api_key = key;
            }
        }
        if let Ok(secret) = std::env::var(API_SECRET_ENV) {
            if !secret.is_empty() {
                self.api.api_secret = secret;
            }
        }
    }

    /// Symbols that should be traded right now.
    pub fn active_symbols(&self) -> Vec<&GridConfig> {
        self.symbols.iter().filter(|s| s.enabled).collect()
    }

    pub fn has_credentials(&self) -> bool {
        !self.api.api_key.trim().is_empty() && !self.api.api_secret.trim().is_empty()
    }

    /// Live commands need signed endpoints.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.has_credentials() {
            Ok(())
        } else {
            Err(ConfigError::Validation(format!(
                "api_key and api_secret are required (set them in [api] or via {} / {})",
                API_KEY_ENV, API_SECRET_ENV
            )))
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Validation("at least one [[symbols]] entry is required".to_string()));
        }

        let mut seen = HashSet::new();
        for grid in &self.symbols {
            grid.validate()?;
            if !seen.insert(grid.symbol()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate symbol {}",
                    grid.symbol()
                )));
            }
        }

        if self.engine.keepalive_interval_secs == 0 {
            return Err(ConfigError::Validation("keepalive_interval_secs must be greater than 0".to_string()));
        }

        if self.engine.reconnect_base_ms == 0 || self.engine.reconnect_base_ms > self.engine.reconnect_max_ms {
            return Err(ConfigError::Validation(
                "reconnect_base_ms must be positive and not exceed reconnect_max_ms".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [api]
        api_key = "k"
        api_secret = "s"

        [[symbols]]
        base = "ETH"
        quote = "USDT"
        grid_step = 0.5
        side = "sell"
        earn = "base"
        margin = 0.8
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        let grid = &config.symbols[0];

        assert_eq!(grid.symbol(), "ETHUSDT");
        assert_eq!(grid.side, Side::Sell);
        assert_eq!(grid.earn, EarnAsset::Base);
        assert_eq!(grid.min_notional, 10.2);
        assert!(grid.enabled);
        assert_eq!(config.engine.protocol, Protocol::TwoStep);
        assert_eq!(config.engine.guard, GuardMode::PerSlot);
        assert!(config.engine.reload_interval().is_none());
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_profit_asset_follows_earn_preference() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.symbols[0].profit_asset(), "ETH");

        config.symbols[0].earn = EarnAsset::Quote;
        assert_eq!(config.symbols[0].profit_asset(), "USDT");
    }

    #[test]
    fn test_rejects_non_positive_grid_step() {
        let toml = MINIMAL.replace("grid_step = 0.5", "grid_step = 0.0");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("grid_step")));
    }

    #[test]
    fn test_rejects_duplicate_symbols() {
        let mut config = Config::default();
        let dup = config.symbols[0].clone();
        config.symbols.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_margin_ratio() {
        let config = Config::default();
        assert!((config.symbols[0].margin_ratio() - 0.01).abs() < 1e-12);
    }
}
