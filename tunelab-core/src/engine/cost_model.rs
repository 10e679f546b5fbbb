//! Cost model: proportional slippage on the fill price, proportional fee on capital.
//!
//! Slippage is directional: buys fill above the reference, sells below.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Fraction of capital charged on every fill.
    pub fee_rate: f64,
    /// Fraction of the reference price lost on every fill.
    pub slippage_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(0.00075, 0.0004)
    }
}

impl CostModel {
    pub fn new(fee_rate: f64, slippage_rate: f64) -> Self {
        Self {
            fee_rate,
            slippage_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn buy_fill(&self, reference: f64) -> f64 {
        reference * (1.0 + self.slippage_rate)
    }

    pub fn sell_fill(&self, reference: f64) -> f64 {
        reference * (1.0 - self.slippage_rate)
    }

    /// Multiplier applied to capital on each fill.
    pub fn fee_factor(&self) -> f64 {
        1.0 - self.fee_rate
    }

    /// Both rates finite and in [0, 1).
    pub fn is_valid(&self) -> bool {
        [self.fee_rate, self.slippage_rate]
            .iter()
            .all(|r| r.is_finite() && (0.0..1.0).contains(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_is_adverse_both_ways() {
        let c = CostModel::new(0.001, 0.0005);
        assert!((c.buy_fill(100.0) - 100.05).abs() < 1e-10);
        assert!((c.sell_fill(100.0) - 99.95).abs() < 1e-10);
        assert!((c.fee_factor() - 0.999).abs() < 1e-12);
    }

    #[test]
    fn frictionless_is_identity() {
        let c = CostModel::frictionless();
        assert_eq!(c.buy_fill(42.0), 42.0);
        assert_eq!(c.sell_fill(42.0), 42.0);
        assert_eq!(c.fee_factor(), 1.0);
    }

    #[test]
    fn validity() {
        assert!(CostModel::default().is_valid());
        assert!(!CostModel::new(-0.1, 0.0).is_valid());
        assert!(!CostModel::new(0.0, 1.0).is_valid());
        assert!(!CostModel::new(f64::NAN, 0.0).is_valid());
    }
}
