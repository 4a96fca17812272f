// Per-slot admission control for order placement

use crate::core::types::{GuardMode, Slot};
use std::collections::HashSet;

/// Tracks which buckets have a placement in flight.
///
/// Owned by the symbol's engine loop; a claim is taken before the placement
/// future is spawned and released when its result is applied, so no tick can
/// observe a slot between "checked" and "submitted".
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    mode: GuardMode,
    claimed: HashSet<Slot>,
}

impl ConcurrencyGuard {
    pub fn new(mode: GuardMode) -> Self {
        Self {
            mode,
            claimed: HashSet::new(),
        }
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Whether a tick for `slot` would be admitted right now.
    pub fn is_available(&self, slot: Slot) -> bool {
        match self.mode {
            GuardMode::PerSlot => !self.claimed.contains(&slot),
            GuardMode::Serialized => self.claimed.is_empty(),
        }
    }

    /// Claim `slot`; returns false when the tick must be dropped.
    pub fn try_claim(&mut self, slot: Slot) -> bool {
        if !self.is_available(slot) {
            return false;
        }
        self.claimed.insert(slot)
    }

    pub fn release(&mut self, slot: Slot) {
        self.claimed.remove(&slot);
    }

    pub fn in_flight(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_idle(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_slot_allows_distinct_slots() {
        let mut guard = ConcurrencyGuard::new(GuardMode::PerSlot);
        assert!(guard.try_claim(10));
        assert!(!guard.try_claim(10));
        assert!(guard.try_claim(11));
        assert_eq!(guard.in_flight(), 2);

        guard.release(10);
        assert!(guard.try_claim(10));
    }

    #[test]
    fn test_serialized_admits_one_at_a_time() {
        let mut guard = ConcurrencyGuard::new(GuardMode::Serialized);
        assert!(guard.try_claim(10));
        assert!(!guard.try_claim(11));
        guard.release(10);
        assert!(guard.is_idle());
        assert!(guard.try_claim(11));
    }

    #[test]
    fn test_release_of_unclaimed_slot_is_noop() {
        let mut guard = ConcurrencyGuard::new(GuardMode::PerSlot);
        guard.release(3);
        assert!(guard.is_idle());
    }
}
