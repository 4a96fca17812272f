// Common types used across the application

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the entry leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset in which a completed round trip accrues its profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarnAsset {
    Base,
    Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTillCanceled,
    #[serde(rename = "FOK")]
    FillOrKill,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::GoodTillCanceled => "GTC",
            TimeInForce::FillOrKill => "FOK",
        }
    }
}

/// Order placement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Fill-or-kill entry, then a good-till-canceled exit.
    #[default]
    TwoStep,
    /// Entry and exit submitted as one one-triggers-the-other order list.
    Bracket,
}

/// Granularity of the concurrency guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    #[default]
    PerSlot,
    Serialized,
}

/// Integer index of one logarithmic price bucket.
pub type Slot = i64;

/// A single limit order the engine wants placed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub time_in_force: TimeInForce,
}

impl OrderIntent {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Entry and exit legs produced for one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketIntent {
    pub slot: Slot,
    pub entry: OrderIntent,
    pub exit: OrderIntent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected { code: i64, message: String },
    /// Pending leg of an order list, waiting on its working leg.
    PendingNew,
}

impl OrderStatus {
    pub fn parse(s: &str) -> OrderStatus {
        match s {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            "PENDING_NEW" => OrderStatus::PendingNew,
            other => OrderStatus::Rejected {
                code: 0,
                message: other.to_string(),
            },
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Rejected { .. } => "REJECTED",
            OrderStatus::PendingNew => "PENDING_NEW",
        }
    }
}

/// Venue acknowledgement of one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub client_order_id: String,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub cummulative_quote_qty: f64,
    pub status: OrderStatus,
}

/// Per-leg acknowledgements of an order list.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketAck {
    pub order_list_id: i64,
    pub entry: OrderAck,
    pub exit: OrderAck,
}

/// An order resting on the book.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: u64,
    pub side: Side,
    pub price: f64,
    pub orig_qty: f64,
}

/// Full record of a canceled order as returned by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanceledOrder {
    pub symbol: String,
    pub order_id: u64,
    pub order_list_id: i64,
    pub client_order_id: String,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub cummulative_quote_qty: f64,
    pub status: String,
    pub time_in_force: String,
    pub order_type: String,
    pub side: String,
}

/// Why the engine declined to trade a bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum AbstainReason {
    EntryEqualsExit { price: f64 },
    ExitExceedsHoldings { available: f64, required: f64 },
    RoundTripLoss { entry_notional: f64, exit_notional: f64 },
    InsufficientBalance { asset: String, required: f64, available: f64 },
    /// The venue refused the order for lack of funds.
    BalanceRejected { asset: String },
    TriggerCrossed { exit_price: f64, trigger: f64 },
    ZeroQuantity,
    SlotOccupied { price: f64 },
}

impl AbstainReason {
    /// Abstains that break a sizing invariant rather than a market condition.
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            AbstainReason::EntryEqualsExit { .. }
                | AbstainReason::ExitExceedsHoldings { .. }
                | AbstainReason::RoundTripLoss { .. }
                | AbstainReason::ZeroQuantity
        )
    }
}

impl fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstainReason::EntryEqualsExit { price } => {
                write!(f, "entry price equals exit price ({})", price)
            }
            AbstainReason::ExitExceedsHoldings { available, required } => {
                write!(f, "exit needs {} but only {} held after fees", required, available)
            }
            AbstainReason::RoundTripLoss { entry_notional, exit_notional } => {
                write!(f, "round trip loses: exit {} < entry {}", exit_notional, entry_notional)
            }
            AbstainReason::InsufficientBalance { asset, required, available } => {
                write!(f, "{} free {} below required {}", asset, available, required)
            }
            AbstainReason::BalanceRejected { asset } => {
                write!(f, "exchange rejected the order: insufficient {}", asset)
            }
            AbstainReason::TriggerCrossed { exit_price, trigger } => {
                write!(f, "exit price {} crosses trigger {}", exit_price, trigger)
            }
            AbstainReason::ZeroQuantity => write!(f, "quantity rounds to zero"),
            AbstainReason::SlotOccupied { price } => {
                write!(f, "an order already rests at {}", price)
            }
        }
    }
}

/// Outcome of one attempted entry/exit pair.
#[derive(Debug, Clone, PartialEq)]
pub enum BracketResult {
    /// Entry filled and the exit leg is resting (or armed, for order lists).
    Filled { entry: OrderAck, exit: OrderAck },
    /// Fill-or-kill entry found no counterparty; nothing rests.
    Expired { entry_order_id: u64 },
    /// Venue refused the order for a known, benign reason.
    Rejected(AbstainReason),
    /// Never submitted: a pre-check failed.
    Aborted(AbstainReason),
}

/// Last trade print for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceEntry {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// Order update pushed on the user-data stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub symbol: String,
    pub order_id: u64,
    pub side: Side,
    pub price: f64,
    pub orig_qty: f64,
    pub status: OrderStatus,
}

/// Push events from the user-data stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    /// Full positions of every asset changed by an account event.
    AccountPosition(Vec<BalanceEntry>),
    /// Deposit, withdrawal or transfer delta on one asset.
    BalanceDelta { asset: String, delta: f64 },
    Execution(ExecutionReport),
    /// The session key expired; the stream must be re-established.
    SessionExpired,
}
