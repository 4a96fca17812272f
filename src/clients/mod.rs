// Exchange clients

pub mod binance;
pub mod binance_rest;
pub mod binance_ws;
pub mod gateway;
pub mod signer;

// Re-export client types
pub use binance::BinanceGateway;
pub use binance_rest::BinanceRestClient;
pub use binance_ws::{parse_trade, parse_user_event};
pub use gateway::{ExchangeGateway, TickStream, UserEventStream};
pub use signer::QuerySigner;
