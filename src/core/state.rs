// Session state: balances and resting orders mirrored from the exchange

use crate::core::types::{BalanceEntry, ExecutionReport, OpenOrder, OrderStatus, UserEvent};
use std::collections::{BTreeMap, HashMap};

/// Free and locked amounts of one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Balance {
    pub free: f64,
    pub locked: f64,
}

/// Authoritative account snapshot fetched over REST.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub balances: Vec<BalanceEntry>,
    pub maker_rate: f64,
    pub taker_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    balances: HashMap<String, Balance>,
    maker_rate: f64,
    taker_rate: f64,
}

impl AccountState {
    pub fn from_snapshot(snapshot: &AccountSnapshot) -> Self {
        let balances = snapshot
            .balances
            .iter()
            .filter(|b| b.free != 0.0 || b.locked != 0.0)
            .map(|b| (b.asset.clone(), Balance { free: b.free, locked: b.locked }))
            .collect();

        Self {
            balances,
            maker_rate: snapshot.maker_rate,
            taker_rate: snapshot.taker_rate,
        }
    }

    pub fn balance(&self, asset: &str) -> Balance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    pub fn free(&self, asset: &str) -> f64 {
        self.balance(asset).free
    }

    pub fn maker_rate(&self) -> f64 {
        self.maker_rate
    }

    pub fn taker_rate(&self) -> f64 {
        self.taker_rate
    }

    pub fn assets(&self) -> impl Iterator<Item = (&String, &Balance)> {
        self.balances.iter()
    }

    pub fn apply(&mut self, event: &UserEvent) {
        match event {
            UserEvent::AccountPosition(entries) => {
                for entry in entries {
                    self.balances.insert(
                        entry.asset.clone(),
                        Balance { free: entry.free, locked: entry.locked },
                    );
                }
            }
            UserEvent::BalanceDelta { asset, delta } => {
                self.balances.entry(asset.clone()).or_default().free += delta;
            }
            UserEvent::Execution(_) | UserEvent::SessionExpired => {}
        }
    }
}

/// Resting orders of one symbol keyed by order id.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrderSet {
    symbol: String,
    half_tick: f64,
    orders: BTreeMap<u64, OpenOrder>,
}

impl OpenOrderSet {
    pub fn new(symbol: &str, price_precision: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            half_tick: 0.5 * 10f64.powi(-(price_precision as i32)),
            orders: BTreeMap::new(),
        }
    }

    pub fn from_snapshot(symbol: &str, price_precision: u32, orders: Vec<OpenOrder>) -> Self {
        let mut set = Self::new(symbol, price_precision);
        for order in orders {
            set.insert(order);
        }
        set
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// True when an order rests at `price` (same tick).
    pub fn contains(&self, price: f64) -> bool {
        self.orders
            .values()
            .any(|o| (o.price - price).abs() < self.half_tick)
    }

    pub fn contains_order(&self, order_id: u64) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn insert(&mut self, order: OpenOrder) {
        self.orders.insert(order.order_id, order);
    }

    pub fn remove(&mut self, order_id: u64) -> Option<OpenOrder> {
        self.orders.remove(&order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpenOrder> {
        self.orders.values()
    }

    /// Resting order whose price is furthest from `price`.
    pub fn furthest_from(&self, price: f64) -> Option<&OpenOrder> {
        self.orders.values().max_by(|a, b| {
            (a.price - price)
                .abs()
                .total_cmp(&(b.price - price).abs())
        })
    }

    pub fn apply(&mut self, event: &UserEvent) {
        if let UserEvent::Execution(report) = event {
            self.apply_execution(report);
        }
    }

    fn apply_execution(&mut self, report: &ExecutionReport) {
        if report.symbol != self.symbol {
            return;
        }

        match report.status {
            OrderStatus::New => self.insert(OpenOrder {
                order_id: report.order_id,
                side: report.side,
                price: report.price,
                orig_qty: report.orig_qty,
            }),
            OrderStatus::Filled
            | OrderStatus::Canceled
            | OrderStatus::Expired
            | OrderStatus::Rejected { .. } => {
                self.remove(report.order_id);
            }
            OrderStatus::PartiallyFilled | OrderStatus::PendingNew => {}
        }
    }
}

/// Everything one symbol's loop knows about the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub account: AccountState,
    pub open_orders: OpenOrderSet,
}

impl SessionState {
    pub fn new(symbol: &str, price_precision: u32) -> Self {
        Self {
            account: AccountState::default(),
            open_orders: OpenOrderSet::new(symbol, price_precision),
        }
    }

    /// Replace everything with a fresh snapshot.
    pub fn reset(&mut self, snapshot: &AccountSnapshot, orders: Vec<OpenOrder>) {
        let symbol = self.open_orders.symbol.clone();
        let half_tick = self.open_orders.half_tick;
        self.account = AccountState::from_snapshot(snapshot);
        self.open_orders = OpenOrderSet {
            symbol,
            half_tick,
            orders: BTreeMap::new(),
        };
        for order in orders {
            self.open_orders.insert(order);
        }
    }

    pub fn apply(&mut self, event: &UserEvent) {
        self.account.apply(event);
        self.open_orders.apply(event);
    }
}
