// Grid Bracket Bot Library
//
// Logarithmic grid trading engine: every trade print is mapped to a price
// bucket, and a profitable entry/exit bracket is placed for buckets that are
// free, funded and not already resting on the book.

pub mod core;
pub mod clients;
pub mod config;
pub mod db;          // SQLite archive of canceled orders
pub mod error;       // Unified error handling
pub mod validation;  // Pre-flight validation
pub mod progress;    // Console feedback during startup

// Re-export core trading types
pub use core::{
    BracketIntent, BracketResult, ExchangeFilters, GridMapper, OrderSequencer, SizingCalculator,
    SymbolEngine, SymbolInfo, TickOutcome,
};

// Re-export error types
pub use error::{Disposition, TradingError, TradingResult};

// Re-export validation types
pub use validation::{PreFlightValidator, ValidationCheck, ValidationLevel, ValidationResult};

// Re-export client types
pub use clients::{BinanceGateway, ExchangeGateway};

// Re-export configuration
pub use config::{ApiConfig, Config, ConfigError, DatabaseConfig, EngineConfig, GridConfig};

// Re-export database types
pub use db::{CanceledOrderStore, Database};
