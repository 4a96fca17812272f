//! Unified error handling for the grid bracket bot
//!
//! Every failure the engine can meet is classified into one of three
//! dispositions: abstain from the current bucket, retry the transport, or
//! stop the process because the exchange state is no longer known.

use std::io;
use thiserror::Error;

/// Venue error code for a rejected new order (message carries the reason).
pub const CODE_NEW_ORDER_REJECTED: i64 = -2010;
/// Venue error code for a cancel of an order it no longer knows.
pub const CODE_UNKNOWN_ORDER: i64 = -2011;
/// Venue error code for insufficient margin.
pub const CODE_MARGIN_INSUFFICIENT: i64 = -2019;

/// Main error type for the grid bracket bot
#[derive(Debug, Error)]
pub enum TradingError {
    // Startup validation
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    // Business-rule aborts
    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: f64,
        available: f64,
    },

    #[error("Order {order_id} expired unfilled")]
    OrderExpired { order_id: u64 },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Transport
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    // Unknown exchange state
    #[error("Unexpected rejection ({code}): {message}")]
    UnexpectedRejection { code: i64, message: String },

    #[error("Orphaned position on {symbol}: entry order {entry_order_id} filled but exit leg failed: {reason}")]
    OrphanedPosition {
        symbol: String,
        entry_order_id: u64,
        reason: String,
    },

    // Ambient
    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the caller should do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Give up on the current bucket, keep trading.
    Abstain,
    /// Reconnect or retry with backoff.
    Retry,
    /// Terminate rather than guess.
    Fatal,
}

impl TradingError {
    pub fn disposition(&self) -> Disposition {
        match self {
            TradingError::InsufficientBalance { .. }
            | TradingError::OrderExpired { .. }
            | TradingError::InvariantViolation(_) => Disposition::Abstain,

            TradingError::Transport(_) | TradingError::Stream(_) | TradingError::Timeout(_) => {
                Disposition::Retry
            }

            _ => Disposition::Fatal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retry
    }

    pub fn is_fatal(&self) -> bool {
        self.disposition() == Disposition::Fatal
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::ConfigNotFound(_)
            | TradingError::ConfigParse(_)
            | TradingError::Validation(_)
            | TradingError::UnknownSymbol(_) => "validation",

            TradingError::InsufficientBalance { .. } => "balance",
            TradingError::OrderExpired { .. } => "expired",
            TradingError::InvariantViolation(_) => "invariant",

            TradingError::Transport(_) | TradingError::Stream(_) | TradingError::Timeout(_) => {
                "transport"
            }

            TradingError::UnexpectedRejection { .. } | TradingError::OrphanedPosition { .. } => {
                "rejection"
            }

            TradingError::Database(_) => "database",
            TradingError::Parse(_) => "parse",
            TradingError::Io(_) => "io",
            TradingError::Internal(_) => "internal",
        }
    }

    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: grid-bot init\n\
                    2. Edit config.toml with your API keys and symbols\n\
                    3. Try again",
                    path
                )
            }
            TradingError::Validation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - Positive grid_step and margin\n\
                    - API key and secret (or BINANCE_API_KEY / BINANCE_API_SECRET)\n\
                    - No duplicate symbols",
                    msg
                )
            }
            TradingError::UnknownSymbol(symbol) => {
                format!(
                    "Symbol not listed by the exchange: {}\n\n\
                    💡 base and quote are concatenated, e.g. base = \"BTC\", quote = \"USDT\"",
                    symbol
                )
            }
            TradingError::OrphanedPosition { .. } => {
                format!(
                    "{}\n\n\
                    ⚠️  The entry leg is filled with no resting exit order.\n\
                    Place the exit manually or switch engine.protocol to \"bracket\".",
                    self
                )
            }
            _ => self.to_string(),
        }
    }

    /// Classify a venue error body returned for an order request.
    pub fn from_venue(code: i64, message: &str) -> Self {
        if is_insufficient_balance(code, message) {
            TradingError::InsufficientBalance {
                asset: String::new(),
                required: 0.0,
                available: 0.0,
            }
        } else {
            TradingError::UnexpectedRejection {
                code,
                message: message.to_string(),
            }
        }
    }
}

/// True when a venue rejection means the account lacks funds for the order.
pub fn is_insufficient_balance(code: i64, message: &str) -> bool {
    match code {
        CODE_MARGIN_INSUFFICIENT => true,
        CODE_NEW_ORDER_REJECTED => message.to_lowercase().contains("insufficient balance"),
        _ => false,
    }
}

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TradingError::Timeout(err.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => TradingError::Transport(err.to_string()),
            _ => TradingError::Io(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for TradingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TradingError::Timeout(err.to_string())
        } else if err.is_decode() {
            TradingError::Parse(err.to_string())
        } else {
            TradingError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TradingError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TradingError::Stream(err.to_string())
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::Parse(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        TradingError::Database(err.to_string())
    }
}

impl From<crate::config::ConfigError> for TradingError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileNotFound(path) => TradingError::ConfigNotFound(path),
            ConfigError::FileRead(msg) | ConfigError::FileWrite(msg) => TradingError::Io(msg),
            ConfigError::Parse(msg) | ConfigError::Serialize(msg) => TradingError::ConfigParse(msg),
            ConfigError::Validation(msg) => TradingError::Validation(msg),
        }
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TradingError::ConfigNotFound("config.toml".to_string());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_dispositions_follow_taxonomy() {
        assert_eq!(
            TradingError::Validation("grid_step".into()).disposition(),
            Disposition::Fatal
        );
        assert_eq!(
            TradingError::OrderExpired { order_id: 7 }.disposition(),
            Disposition::Abstain
        );
        assert_eq!(
            TradingError::InvariantViolation("entry == exit".into()).disposition(),
            Disposition::Abstain
        );
        assert_eq!(
            TradingError::Stream("closed".into()).disposition(),
            Disposition::Retry
        );
        assert_eq!(
            TradingError::UnexpectedRejection {
                code: -1013,
                message: "Filter failure: PRICE_FILTER".into()
            }
            .disposition(),
            Disposition::Fatal
        );
    }

    #[test]
    fn test_venue_classification() {
        let err = TradingError::from_venue(
            -2010,
            "Account has insufficient balance for requested action.",
        );
        assert!(matches!(err, TradingError::InsufficientBalance { .. }));

        let err = TradingError::from_venue(-2010, "Order would immediately match and take.");
        assert!(err.is_fatal());

        let err = TradingError::from_venue(-2019, "Margin is insufficient.");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_category() {
        assert_eq!(TradingError::Timeout("x".into()).category(), "transport");
        assert_eq!(TradingError::Database("x".into()).category(), "database");
        assert_eq!(TradingError::UnknownSymbol("X".into()).category(), "validation");
    }

    #[test]
    fn test_user_message() {
        let msg = TradingError::ConfigNotFound("config.toml".into()).user_message();
        assert!(msg.contains("grid-bot init"));
        assert!(msg.contains("💡"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let trading_err: TradingError = io_err.into();
        assert!(trading_err.is_retryable());
    }
}
