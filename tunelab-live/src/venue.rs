//! Execution venue boundary and a paper implementation.
//!
//! The live loop only places market orders for a quantity and reads back the
//! fill. Order routing, partial fills and balances beyond the paper ledger
//! live behind the trait.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tunelab_core::domain::PriceBar;
use tunelab_core::engine::CostModel;
use tunelab_core::retry::Transient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// Execution report for one market order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: Side,
    pub avg_price: f64,
    pub filled_quantity: f64,
    /// Quote-currency fee.
    pub fee: f64,
}

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("insufficient balance: need {needed:.8}, have {available:.8}")]
    InsufficientBalance { needed: f64, available: f64 },

    #[error("no reference price yet")]
    NoPrice,

    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

impl Transient for VenueError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub trait ExecutionVenue: Send {
    fn name(&self) -> &str;

    /// Latest closed bar, seen before any order on it.
    fn observe(&mut self, _bar: &PriceBar) {}

    fn place_order(&mut self, side: Side, quantity: f64) -> Result<Fill, VenueError>;
}

/// Fills at the last observed close with slippage and fee rates.
#[derive(Debug, Clone)]
pub struct PaperVenue {
    costs: CostModel,
    last_price: Option<f64>,
    quote_balance: f64,
    base_balance: f64,
}

impl PaperVenue {
    pub fn new(costs: CostModel, quote_balance: f64) -> Self {
        Self {
            costs,
            last_price: None,
            quote_balance,
            base_balance: 0.0,
        }
    }

    pub fn quote_balance(&self) -> f64 {
        self.quote_balance
    }

    pub fn base_balance(&self) -> f64 {
        self.base_balance
    }
}

impl ExecutionVenue for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    fn observe(&mut self, bar: &PriceBar) {
        self.last_price = Some(bar.close);
    }

    fn place_order(&mut self, side: Side, quantity: f64) -> Result<Fill, VenueError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(VenueError::Rejected(format!("quantity {quantity} must be positive")));
        }
        let reference = self.last_price.ok_or(VenueError::NoPrice)?;

        let fill = match side {
            Side::Buy => {
                let avg_price = self.costs.buy_fill(reference);
                let notional = avg_price * quantity;
                let fee = notional * self.costs.fee_rate;
                if notional + fee > self.quote_balance {
                    return Err(VenueError::InsufficientBalance {
                        needed: notional + fee,
                        available: self.quote_balance,
                    });
                }
                self.quote_balance -= notional + fee;
                self.base_balance += quantity;
                Fill {
                    side,
                    avg_price,
                    filled_quantity: quantity,
                    fee,
                }
            }
            Side::Sell => {
                if quantity > self.base_balance + f64::EPSILON {
                    return Err(VenueError::InsufficientBalance {
                        needed: quantity,
                        available: self.base_balance,
                    });
                }
                let avg_price = self.costs.sell_fill(reference);
                let notional = avg_price * quantity;
                let fee = notional * self.costs.fee_rate;
                self.quote_balance += notional - fee;
                self.base_balance = (self.base_balance - quantity).max(0.0);
                Fill {
                    side,
                    avg_price,
                    filled_quantity: quantity,
                    fee,
                }
            }
        };
        tracing::debug!(venue = "paper", %side, price = fill.avg_price, quantity, fee = fill.fee, "paper fill");
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn round_trip_applies_slippage_and_fees() {
        let mut venue = PaperVenue::new(CostModel::new(0.001, 0.0005), 1_000.0);
        venue.observe(&bar(100.0));
        let buy = venue.place_order(Side::Buy, 2.0).unwrap();
        assert!((buy.avg_price - 100.05).abs() < 1e-9);
        assert!((buy.fee - 0.2001).abs() < 1e-9);
        assert_eq!(venue.base_balance(), 2.0);

        venue.observe(&bar(110.0));
        let sell = venue.place_order(Side::Sell, 2.0).unwrap();
        assert!((sell.avg_price - 109.945).abs() < 1e-9);
        assert_eq!(venue.base_balance(), 0.0);
        let expected = 1_000.0 - 200.1 - 0.2001 + 219.89 - 0.21989;
        assert!((venue.quote_balance() - expected).abs() < 1e-9);
    }

    #[test]
    fn refuses_without_price_or_funds() {
        let mut venue = PaperVenue::new(CostModel::frictionless(), 50.0);
        assert!(matches!(venue.place_order(Side::Buy, 1.0), Err(VenueError::NoPrice)));
        venue.observe(&bar(100.0));
        assert!(matches!(
            venue.place_order(Side::Buy, 1.0),
            Err(VenueError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            venue.place_order(Side::Sell, 1.0),
            Err(VenueError::InsufficientBalance { .. })
        ));
        assert!(matches!(venue.place_order(Side::Buy, 0.0), Err(VenueError::Rejected(_))));
        assert!(!VenueError::NoPrice.is_transient());
        assert!(VenueError::Unavailable("timeout".into()).is_transient());
    }
}
