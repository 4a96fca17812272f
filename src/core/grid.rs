//! Logarithmic price grid.
//!
//! Bucket `n` covers `[(1 + step)^n, (1 + step)^(n + 1))` where `step` is the
//! configured grid step as a fraction. Rounded bounds are pulled inward so a
//! rounded boundary price still maps back into its own bucket.

use crate::core::types::Slot;

/// Scaled values this close to an integer are treated as that integer, so
/// binary noise (e.g. `0.0002 * 1e5 = 20.000000000000004`) cannot push a
/// ceil or floor one unit too far.
const ROUNDING_EPSILON: f64 = 1e-8;

/// Same guard for `log(price) / log(1 + step)` landing a hair under an integer.
const SLOT_EPSILON: f64 = 1e-9;

fn scale(precision: u32) -> f64 {
    10f64.powi(precision as i32)
}

/// Round half away from zero to `precision` decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = scale(precision);
    (value * factor).round() / factor
}

/// Smallest multiple of `10^-precision` not below `value`.
pub fn ceil_to(value: f64, precision: u32) -> f64 {
    let factor = scale(precision);
    ((value * factor) - ROUNDING_EPSILON).ceil() / factor
}

/// Largest multiple of `10^-precision` not above `value`.
pub fn floor_to(value: f64, precision: u32) -> f64 {
    let factor = scale(precision);
    ((value * factor) + ROUNDING_EPSILON).floor() / factor
}

/// Format a value for the wire with exactly `precision` decimals.
pub fn format_decimal(value: f64, precision: u32) -> String {
    format!("{:.*}", precision as usize, value)
}

/// Price/slot arithmetic for one grid step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMapper {
    step_percent: f64,
    log_base: f64,
}

impl GridMapper {
    /// `step_percent` must be positive and finite; config validation enforces
    /// this before any mapper is built.
    pub fn new(step_percent: f64) -> Self {
        debug_assert!(step_percent > 0.0 && step_percent.is_finite());
        Self {
            step_percent,
            log_base: (1.0 + step_percent / 100.0).ln(),
        }
    }

    pub fn step_percent(&self) -> f64 {
        self.step_percent
    }

    pub fn price_to_slot(&self, price: f64) -> Slot {
        debug_assert!(price > 0.0);
        ((price.ln() / self.log_base) + SLOT_EPSILON).floor() as Slot
    }

    pub fn slot_to_price(&self, slot: Slot) -> f64 {
        (self.log_base * slot as f64).exp()
    }

    /// Lowest price of the bucket containing `price`, rounded up to `precision`.
    pub fn lower_bound(&self, price: f64, precision: u32) -> f64 {
        ceil_to(self.slot_to_price(self.price_to_slot(price)), precision)
    }

    /// Top of the bucket containing `price`, rounded down to `precision`.
    pub fn upper_bound(&self, price: f64, precision: u32) -> f64 {
        floor_to(self.slot_to_price(self.price_to_slot(price) + 1), precision)
    }

    /// Both bounds of the bucket containing `price`.
    pub fn bounds(&self, price: f64, precision: u32) -> (f64, f64) {
        (self.lower_bound(price, precision), self.upper_bound(price, precision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slot_for_round_price() {
        let grid = GridMapper::new(1.0);
        assert_eq!(grid.price_to_slot(100.0), 462);
        assert!((grid.slot_to_price(463) - 1.01f64.powi(463)).abs() < 1e-6);
    }

    #[test]
    fn test_upper_bound_example() {
        let grid = GridMapper::new(1.0);
        let expected = floor_to(1.01f64.powi(463), 2);
        assert_eq!(grid.upper_bound(100.0, 2), expected);
        assert!(grid.upper_bound(100.0, 2) >= 100.0);
    }

    #[test]
    fn test_rounding_helpers_absorb_binary_noise() {
        assert_eq!(ceil_to(10.0 / 50000.0, 5), 0.0002);
        assert_eq!(floor_to(0.0002 * 0.999, 5), 0.00019);
        assert_eq!(floor_to(50000.0 * 1.01, 2), 50500.0);
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(format_decimal(0.0002, 5), "0.00020");
    }

    #[test]
    fn test_negative_slots_below_one() {
        let grid = GridMapper::new(2.0);
        let slot = grid.price_to_slot(0.5);
        assert!(slot < 0);
        assert!(grid.slot_to_price(slot) <= 0.5);
        assert!(grid.slot_to_price(slot + 1) > 0.5);
    }

    proptest! {
        #[test]
        fn prop_slot_round_trip(price in 1e-6f64..1e7, step in 0.05f64..25.0) {
            let grid = GridMapper::new(step);
            let slot = grid.price_to_slot(price);
            prop_assert_eq!(grid.price_to_slot(grid.slot_to_price(slot)), slot);
        }

        #[test]
        fn prop_bounds_contain_price(price in 1.0f64..1e6, step in 0.1f64..10.0) {
            let grid = GridMapper::new(step);
            let precision = 2;
            let price = round_to(price, precision);
            let (lower, upper) = grid.bounds(price, precision);
            prop_assert!(lower <= price + 1e-9, "lower {} > price {}", lower, price);
            prop_assert!(price <= upper + 1e-9, "price {} > upper {}", price, upper);
        }

        #[test]
        fn prop_boundary_remaps_to_same_or_adjacent(price in 1.0f64..1e6, step in 0.1f64..10.0) {
            let grid = GridMapper::new(step);
            let slot = grid.price_to_slot(price);
            let (lower, upper) = grid.bounds(price, 2);
            prop_assert!((grid.price_to_slot(lower) - slot).abs() <= 1);
            prop_assert!((grid.price_to_slot(upper) - slot).abs() <= 1);
        }
    }
}
