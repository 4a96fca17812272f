// Core trading logic modules

pub mod backoff;
pub mod filters;
pub mod grid;
pub mod guard;
pub mod live_trading;
pub mod sequencer;
pub mod sizing;
pub mod state;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use backoff::ExponentialBackoff;
pub use filters::{ExchangeFilters, SymbolInfo};
pub use grid::GridMapper;
pub use guard::ConcurrencyGuard;
pub use live_trading::{DropReason, EngineSettings, EngineStats, SymbolEngine, TickOutcome};
pub use sequencer::{OrderPairMachine, OrderSequencer, PairState};
pub use sizing::SizingCalculator;
pub use state::{AccountSnapshot, AccountState, OpenOrderSet, SessionState};
pub use sync::{ConnectionState, StateSynchronizer};
pub use types::*;
