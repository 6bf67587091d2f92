// Copyright @yucwang 2026

use crate::math::constants::Float;

use std::sync::atomic::{AtomicU32, Ordering};

/// A `Float` that many threads may accumulate into without locking.
///
/// The value lives as its bit pattern inside an `AtomicU32`; additions retry
/// a compare-exchange until no other writer raced them.
pub struct AtomicFloat {
    bits: AtomicU32,
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.load(Ordering::Relaxed))
    }
}

impl std::fmt::Debug for AtomicFloat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AtomicFloat({})", self.load(Ordering::Relaxed))
    }
}

impl AtomicFloat {
    pub fn new(v: Float) -> Self {
        Self { bits: AtomicU32::new(v.to_bits()) }
    }

    pub fn load(&self, ordering: Ordering) -> Float {
        Float::from_bits(self.bits.load(ordering))
    }

    pub fn store(&self, v: Float, ordering: Ordering) {
        self.bits.store(v.to_bits(), ordering)
    }

    /// Adds `v` and returns the previous value.
    pub fn fetch_add(&self, v: Float, ordering: Ordering) -> Float {
        let mut old_bits = self.bits.load(Ordering::Relaxed);
        loop {
            let new_bits = (Float::from_bits(old_bits) + v).to_bits();
            match self.bits.compare_exchange_weak(old_bits, new_bits, ordering, Ordering::Relaxed) {
                Ok(_) => break,
                Err(current) => old_bits = current,
            }
        }
        Float::from_bits(old_bits)
    }
}
