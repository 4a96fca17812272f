//! Order sequencing for one entry/exit pair.
//!
//! [`OrderPairMachine`] tracks a pair through
//! `Idle -> EntrySubmitted -> Filled -> ExitSubmitted`, with an expired entry
//! returning to `Idle`. The `Filled` state is the orphan window of the
//! two-step protocol: the entry is done and nothing rests to close it.
//! The bracket protocol crosses that window inside the venue.

use crate::clients::gateway::ExchangeGateway;
use crate::core::filters::ExchangeFilters;
use crate::core::types::{
    AbstainReason, BracketIntent, BracketResult, OrderAck, OrderStatus, Protocol, Slot,
};
use crate::error::{TradingError, TradingResult};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PairState {
    Idle,
    EntrySubmitted,
    Filled { entry: OrderAck },
    ExitSubmitted { entry: OrderAck, exit: OrderAck },
}

impl PairState {
    fn name(&self) -> &'static str {
        match self {
            PairState::Idle => "idle",
            PairState::EntrySubmitted => "entry-submitted",
            PairState::Filled { .. } => "filled",
            PairState::ExitSubmitted { .. } => "exit-submitted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderPairMachine {
    symbol: String,
    slot: Slot,
    state: PairState,
}

impl OrderPairMachine {
    pub fn new(symbol: &str, slot: Slot) -> Self {
        Self {
            symbol: symbol.to_string(),
            slot,
            state: PairState::Idle,
        }
    }

    pub fn state(&self) -> &PairState {
        &self.state
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Entry filled with no exit resting yet.
    pub fn in_orphan_window(&self) -> bool {
        matches!(self.state, PairState::Filled { .. })
    }

    fn illegal(&self, event: &str) -> TradingError {
        TradingError::Internal(format!(
            "order pair {} slot {}: {} while {}",
            self.symbol,
            self.slot,
            event,
            self.state.name()
        ))
    }

    pub fn submit_entry(&mut self) -> TradingResult<()> {
        match self.state {
            PairState::Idle => {
                self.state = PairState::EntrySubmitted;
                Ok(())
            }
            _ => Err(self.illegal("entry submitted")),
        }
    }

    /// Apply the entry acknowledgement. Expiry returns the pair to `Idle`;
    /// any status other than filled or expired leaves the exchange state unknown.
    pub fn entry_acknowledged(&mut self, entry: OrderAck) -> TradingResult<()> {
        if self.state != PairState::EntrySubmitted {
            return Err(self.illegal("entry acknowledged"));
        }

        match entry.status {
            OrderStatus::Filled => {
                self.state = PairState::Filled { entry };
                Ok(())
            }
            OrderStatus::Expired => {
                self.state = PairState::Idle;
                Ok(())
            }
            ref other => Err(TradingError::UnexpectedRejection {
                code: 0,
                message: format!(
                    "fill-or-kill entry {} on {} returned status {}",
                    entry.order_id,
                    self.symbol,
                    other.as_str()
                ),
            }),
        }
    }

    pub fn exit_acknowledged(&mut self, exit: OrderAck) -> TradingResult<()> {
        match std::mem::replace(&mut self.state, PairState::Idle) {
            PairState::Filled { entry } => {
                self.state = PairState::ExitSubmitted { entry, exit };
                Ok(())
            }
            previous => {
                self.state = previous;
                Err(self.illegal("exit acknowledged"))
            }
        }
    }

    /// The exit leg failed after the entry filled.
    pub fn exit_failed(&self, cause: &TradingError) -> TradingError {
        match &self.state {
            PairState::Filled { entry } => TradingError::OrphanedPosition {
                symbol: self.symbol.clone(),
                entry_order_id: entry.order_id,
                reason: cause.to_string(),
            },
            _ => self.illegal("exit failed"),
        }
    }

    /// Final result once the machine has come to rest.
    pub fn outcome(self, entry_order_id: u64) -> TradingResult<BracketResult> {
        match self.state {
            PairState::Idle => Ok(BracketResult::Expired { entry_order_id }),
            PairState::ExitSubmitted { entry, exit } => Ok(BracketResult::Filled { entry, exit }),
            other => Err(TradingError::Internal(format!(
                "order pair {} slot {} stopped while {}",
                self.symbol,
                self.slot,
                other.name()
            ))),
        }
    }
}

/// Submits bracket intents with the configured protocol.
#[derive(Clone)]
pub struct OrderSequencer {
    gateway: Arc<dyn ExchangeGateway>,
    protocol: Protocol,
    filters: ExchangeFilters,
    funding_asset: String,
}

impl OrderSequencer {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        protocol: Protocol,
        filters: ExchangeFilters,
        funding_asset: &str,
    ) -> Self {
        Self {
            gateway,
            protocol,
            filters,
            funding_asset: funding_asset.to_string(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Place one pair. `Ok` covers every outcome the engine can continue
    /// from; `Err` is either a transport failure before anything was known to
    /// fill, or a fatal state.
    pub async fn execute(&self, bracket: BracketIntent) -> TradingResult<BracketResult> {
        match self.protocol {
            Protocol::TwoStep => self.two_step(bracket).await,
            Protocol::Bracket => self.bracket(bracket).await,
        }
    }

    fn balance_rejection(&self, err: TradingError) -> TradingResult<BracketResult> {
        match err {
            TradingError::InsufficientBalance { .. } => {
                Ok(BracketResult::Rejected(AbstainReason::BalanceRejected {
                    asset: self.funding_asset.clone(),
                }))
            }
            other => Err(other),
        }
    }

    async fn two_step(&self, bracket: BracketIntent) -> TradingResult<BracketResult> {
        let entry_intent = &bracket.entry;
        let mut machine = OrderPairMachine::new(&entry_intent.symbol, bracket.slot);

        machine.submit_entry()?;
        info!(
            "📤 {} slot {}: {} {} @ {} (FOK)",
            entry_intent.symbol, bracket.slot, entry_intent.side, entry_intent.quantity, entry_intent.price
        );

        let entry = match self.gateway.place_order(entry_intent, &self.filters).await {
            Ok(ack) => ack,
            Err(err) => return self.balance_rejection(err),
        };
        let entry_order_id = entry.order_id;
        machine.entry_acknowledged(entry)?;

        if !machine.in_orphan_window() {
            info!(
                "⌛ {} slot {}: entry {} expired unfilled, no exit placed",
                entry_intent.symbol, bracket.slot, entry_order_id
            );
            return machine.outcome(entry_order_id);
        }

        let exit_intent = &bracket.exit;
        info!(
            "📥 {} slot {}: entry {} filled, placing {} {} @ {} (GTC)",
            exit_intent.symbol, bracket.slot, entry_order_id, exit_intent.side, exit_intent.quantity, exit_intent.price
        );

        match self.gateway.place_order(exit_intent, &self.filters).await {
            Ok(exit) => {
                machine.exit_acknowledged(exit)?;
                machine.outcome(entry_order_id)
            }
            Err(err) => {
                let orphan = machine.exit_failed(&err);
                error!("🚨 {}", orphan);
                Err(orphan)
            }
        }
    }

    async fn bracket(&self, bracket: BracketIntent) -> TradingResult<BracketResult> {
        let mut machine = OrderPairMachine::new(&bracket.entry.symbol, bracket.slot);

        machine.submit_entry()?;
        info!(
            "📤 {} slot {}: order list {} {} @ {} (FOK) -> {} {} @ {} (GTC)",
            bracket.entry.symbol,
            bracket.slot,
            bracket.entry.side,
            bracket.entry.quantity,
            bracket.entry.price,
            bracket.exit.side,
            bracket.exit.quantity,
            bracket.exit.price
        );

        let ack = match self.gateway.place_bracket(&bracket, &self.filters).await {
            Ok(ack) => ack,
            Err(err) => return self.balance_rejection(err),
        };
        let entry_order_id = ack.entry.order_id;
        machine.entry_acknowledged(ack.entry)?;

        if machine.in_orphan_window() {
            match ack.exit.status {
                OrderStatus::New | OrderStatus::PendingNew | OrderStatus::Filled | OrderStatus::PartiallyFilled => {
                    machine.exit_acknowledged(ack.exit)?;
                }
                ref other => {
                    let cause = TradingError::UnexpectedRejection {
                        code: 0,
                        message: format!(
                            "order list {} exit leg {} is {}",
                            ack.order_list_id,
                            ack.exit.order_id,
                            other.as_str()
                        ),
                    };
                    let orphan = machine.exit_failed(&cause);
                    error!("🚨 {}", orphan);
                    return Err(orphan);
                }
            }
        } else {
            warn!(
                "⌛ {} slot {}: order list {} entry expired, exit leg dropped by the venue",
                bracket.entry.symbol, bracket.slot, ack.order_list_id
            );
        }

        machine.outcome(entry_order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(order_id: u64, status: OrderStatus) -> OrderAck {
        OrderAck {
            order_id,
            client_order_id: format!("c{}", order_id),
            price: 100.0,
            orig_qty: 1.0,
            executed_qty: 0.0,
            cummulative_quote_qty: 0.0,
            status,
        }
    }

    #[test]
    fn test_filled_pair_walks_every_state() {
        let mut machine = OrderPairMachine::new("BTCUSDT", 5);
        machine.submit_entry().unwrap();
        assert_eq!(machine.state(), &PairState::EntrySubmitted);

        machine.entry_acknowledged(ack(1, OrderStatus::Filled)).unwrap();
        assert!(machine.in_orphan_window());

        machine.exit_acknowledged(ack(2, OrderStatus::New)).unwrap();
        assert!(!machine.in_orphan_window());

        match machine.outcome(1).unwrap() {
            BracketResult::Filled { entry, exit } => {
                assert_eq!(entry.order_id, 1);
                assert_eq!(exit.order_id, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_expired_entry_returns_to_idle() {
        let mut machine = OrderPairMachine::new("BTCUSDT", 5);
        machine.submit_entry().unwrap();
        machine.entry_acknowledged(ack(1, OrderStatus::Expired)).unwrap();
        assert_eq!(machine.state(), &PairState::Idle);
        assert_eq!(machine.outcome(1).unwrap(), BracketResult::Expired { entry_order_id: 1 });
    }

    #[test]
    fn test_resting_entry_is_fatal() {
        let mut machine = OrderPairMachine::new("BTCUSDT", 5);
        machine.submit_entry().unwrap();
        let err = machine.entry_acknowledged(ack(1, OrderStatus::New)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_exit_failure_reports_orphan() {
        let mut machine = OrderPairMachine::new("BTCUSDT", 5);
        machine.submit_entry().unwrap();
        machine.entry_acknowledged(ack(9, OrderStatus::Filled)).unwrap();

        let orphan = machine.exit_failed(&TradingError::Transport("reset".into()));
        match orphan {
            TradingError::OrphanedPosition { entry_order_id, .. } => assert_eq!(entry_order_id, 9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_out_of_order_events_rejected() {
        let mut machine = OrderPairMachine::new("BTCUSDT", 5);
        assert!(machine.exit_acknowledged(ack(2, OrderStatus::New)).is_err());
        assert_eq!(machine.state(), &PairState::Idle);
        assert!(machine.entry_acknowledged(ack(1, OrderStatus::Filled)).is_err());

        machine.submit_entry().unwrap();
        assert!(machine.submit_entry().is_err());
    }
}
