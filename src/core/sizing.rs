//! Order sizing for one grid bucket.
//!
//! Fee and rounding policy, applied identically on both sides:
//!
//! * The entry leg crosses the book (fill-or-kill) and pays the taker rate;
//!   the exit leg rests (good-till-canceled) and pays the maker rate.
//! * Each fee is charged in the asset that leg receives.
//! * Prices round against the strategy: the exit price is floored when
//!   selling and ceiled when buying back, so rounding can only shrink the
//!   margin that the profitability check then verifies.
//! * The entry quantity is ceiled so the order clears the notional minimum.
//!   An exit quantity that spends what the entry produced is floored, and one
//!   that must recover what the entry spent is ceiled.

use crate::config::GridConfig;
use crate::core::filters::ExchangeFilters;
use crate::core::grid::{ceil_to, floor_to, round_to, GridMapper};
use crate::core::state::SessionState;
use crate::core::types::{
    AbstainReason, BracketIntent, EarnAsset, OrderIntent, Side, Slot, TimeInForce,
};

/// Relative slack for comparisons between already-rounded amounts.
const COMPARE_EPSILON: f64 = 1e-12;

fn at_least(value: f64, required: f64) -> bool {
    value >= required - COMPARE_EPSILON * required.abs().max(1.0)
}

/// Smallest lot-rounded quantity whose notional at `price` reaches `notional`.
/// `ceil_to` absorbs binary noise, which can leave it a fraction of a lot short.
fn entry_quantity(notional: f64, price: f64, lot_precision: u32) -> f64 {
    let qty = ceil_to(notional / price, lot_precision);
    if qty * price >= notional {
        qty
    } else {
        round_to(qty + 10f64.powi(-(lot_precision as i32)), lot_precision)
    }
}

/// Prices and quantities of both legs before the feasibility checks.
#[derive(Debug, Clone, PartialEq)]
pub struct LegSizes {
    pub slot: Slot,
    pub entry_price: f64,
    pub entry_qty: f64,
    pub exit_price: f64,
    pub exit_qty: f64,
}

#[derive(Debug, Clone)]
pub struct SizingCalculator {
    symbol: String,
    base: String,
    quote: String,
    side: Side,
    earn: EarnAsset,
    margin: f64,
    trigger_price: Option<f64>,
    mapper: GridMapper,
    filters: ExchangeFilters,
}

impl SizingCalculator {
    pub fn new(grid: &GridConfig, filters: ExchangeFilters) -> Self {
        Self {
            symbol: grid.symbol(),
            base: grid.base.to_uppercase(),
            quote: grid.quote.to_uppercase(),
            side: grid.side,
            earn: grid.earn,
            margin: grid.margin_ratio(),
            trigger_price: grid.trigger_price,
            mapper: GridMapper::new(grid.grid_step),
            filters,
        }
    }

    pub fn mapper(&self) -> &GridMapper {
        &self.mapper
    }

    pub fn filters(&self) -> &ExchangeFilters {
        &self.filters
    }

    pub fn slot_of(&self, price: f64) -> Slot {
        self.mapper.price_to_slot(price)
    }

    /// Asset the entry leg spends.
    pub fn funding_asset(&self) -> &str {
        match self.side {
            Side::Buy => &self.quote,
            Side::Sell => &self.base,
        }
    }

    /// Leg prices and quantities for the bucket containing `price`.
    pub fn size(&self, price: f64, maker_rate: f64, taker_rate: f64) -> LegSizes {
        let pp = self.filters.price_precision;
        let lp = self.filters.lot_precision;
        let notional = self.filters.min_notional;
        let slot = self.mapper.price_to_slot(price);

        match self.side {
            Side::Buy => {
                let entry_price = self.mapper.upper_bound(price, pp);
                let exit_price = floor_to(entry_price * (1.0 + self.margin), pp);
                let entry_qty = entry_quantity(notional, entry_price, lp);
                let post_fee_base = entry_qty * (1.0 - taker_rate);

                let exit_qty = match self.earn {
                    EarnAsset::Quote => floor_to(post_fee_base, lp),
                    EarnAsset::Base => {
                        let entry_notional = entry_price * entry_qty;
                        ceil_to(entry_notional / exit_price / (1.0 - maker_rate), lp)
                    }
                };

                LegSizes { slot, entry_price, entry_qty, exit_price, exit_qty }
            }
            Side::Sell => {
                let entry_price = self.mapper.lower_bound(price, pp);
                let exit_price = ceil_to(entry_price / (1.0 + self.margin), pp);
                let entry_qty = entry_quantity(notional, entry_price, lp);
                let post_fee_quote = entry_price * entry_qty * (1.0 - taker_rate);

                let exit_qty = match self.earn {
                    EarnAsset::Base => floor_to(post_fee_quote / exit_price, lp),
                    EarnAsset::Quote => ceil_to(entry_qty / (1.0 - maker_rate), lp),
                };

                LegSizes { slot, entry_price, entry_qty, exit_price, exit_qty }
            }
        }
    }

    /// Size the bucket containing `price` and run every pre-submission check.
    pub fn evaluate(&self, price: f64, session: &SessionState) -> Result<BracketIntent, AbstainReason> {
        let maker = session.account.maker_rate();
        let taker = session.account.taker_rate();
        let legs = self.size(price, maker, taker);
        let half_tick = 0.5 * 10f64.powi(-(self.filters.price_precision as i32));

        if (legs.entry_price - legs.exit_price).abs() < half_tick {
            return Err(AbstainReason::EntryEqualsExit { price: legs.entry_price });
        }

        if legs.entry_qty <= 0.0 || legs.exit_qty <= 0.0 {
            return Err(AbstainReason::ZeroQuantity);
        }

        let entry_notional = legs.entry_price * legs.entry_qty;

        match self.side {
            Side::Buy => {
                let post_fee_base = legs.entry_qty * (1.0 - taker);
                if !at_least(post_fee_base, legs.exit_qty) {
                    return Err(AbstainReason::ExitExceedsHoldings {
                        available: post_fee_base,
                        required: legs.exit_qty,
                    });
                }

                let exit_notional = legs.exit_price * legs.exit_qty * (1.0 - maker);
                if !at_least(exit_notional, entry_notional) {
                    return Err(AbstainReason::RoundTripLoss { entry_notional, exit_notional });
                }
            }
            Side::Sell => {
                let post_fee_quote = entry_notional * (1.0 - taker);
                let exit_cost = legs.exit_price * legs.exit_qty;
                if !at_least(post_fee_quote, exit_cost) {
                    return Err(AbstainReason::ExitExceedsHoldings {
                        available: post_fee_quote,
                        required: exit_cost,
                    });
                }

                // Round trip measured in the base asset the entry sold.
                let restored = legs.exit_qty * (1.0 - maker);
                if !at_least(restored, legs.entry_qty) {
                    return Err(AbstainReason::RoundTripLoss {
                        entry_notional: legs.entry_qty,
                        exit_notional: restored,
                    });
                }
            }
        }

        let required = match self.side {
            Side::Buy => entry_notional,
            Side::Sell => legs.entry_qty,
        };
        let available = session.account.free(self.funding_asset());
        if !at_least(available, required) {
            return Err(AbstainReason::InsufficientBalance {
                asset: self.funding_asset().to_string(),
                required,
                available,
            });
        }

        if let Some(trigger) = self.trigger_price {
            let crossed = match self.side {
                Side::Buy => legs.exit_price < trigger,
                Side::Sell => legs.exit_price > trigger,
            };
            if crossed {
                return Err(AbstainReason::TriggerCrossed { exit_price: legs.exit_price, trigger });
            }
        }

        for resting in [legs.entry_price, legs.exit_price] {
            if session.open_orders.contains(resting) {
                return Err(AbstainReason::SlotOccupied { price: resting });
            }
        }

        Ok(BracketIntent {
            slot: legs.slot,
            entry: OrderIntent {
                symbol: self.symbol.clone(),
                side: self.side,
                price: legs.entry_price,
                quantity: legs.entry_qty,
                time_in_force: TimeInForce::FillOrKill,
            },
            exit: OrderIntent {
                symbol: self.symbol.clone(),
                side: self.side.opposite(),
                price: legs.exit_price,
                quantity: legs.exit_qty,
                time_in_force: TimeInForce::GoodTillCanceled,
            },
        })
    }
}
