//! Volatility trailing stop with a ratchet.
//!
//! **Core rule:** the level may rise, never fall, even when volatility expands.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    level: f64,
    trail_multiple: f64,
}

impl TrailingStop {
    /// Initial level = entry - stop_multiple * volatility. An undefined
    /// volatility leaves the stop unarmed until a later bar ratchets it.
    pub fn open(entry_price: f64, volatility: f64, stop_multiple: f64, trail_multiple: f64) -> Self {
        let initial = entry_price - stop_multiple * volatility;
        Self {
            level: if initial.is_finite() {
                initial
            } else {
                f64::NEG_INFINITY
            },
            trail_multiple,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn is_breached(&self, close: f64) -> bool {
        close <= self.level
    }

    /// Raise the level toward close - trail_multiple * volatility.
    /// Non-finite proposals are ignored.
    pub fn ratchet(&mut self, close: f64, volatility: f64) -> f64 {
        let proposed = close - self.trail_multiple * volatility;
        if proposed.is_finite() && proposed > self.level {
            self.level = proposed;
        }
        self.level
    }
}
