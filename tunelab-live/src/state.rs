//! Owned strategy state threaded through the live loop.
//!
//! Holds the bound strategy, its parameters and the FLAT/LONG position.
//! Exactly one position per instance; entering while LONG or exiting while
//! FLAT is refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tunelab_core::domain::{ParamError, ParameterSet, Signature};
use tunelab_core::strategy::StrategyKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionState {
    Flat,
    Long {
        entry_price: f64,
        quantity: f64,
        entered_at: DateTime<Utc>,
    },
}

impl PositionState {
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long { .. })
    }
}

#[derive(Debug, Clone)]
pub struct StrategyState {
    params: ParameterSet,
    signature: Signature,
    strategy: StrategyKind,
    position: PositionState,
    /// Timestamp of the last bar a decision was made on.
    last_decision_bar: Option<DateTime<Utc>>,
}

impl StrategyState {
    pub fn new(params: ParameterSet) -> Result<Self, ParamError> {
        let strategy = StrategyKind::from_params(&params)?;
        Ok(Self {
            signature: params.signature(),
            params,
            strategy,
            position: PositionState::Flat,
            last_decision_bar: None,
        })
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn strategy(&self) -> &StrategyKind {
        &self.strategy
    }

    pub fn position(&self) -> PositionState {
        self.position
    }

    pub fn in_position(&self) -> bool {
        self.position.is_long()
    }

    /// Bind new parameters. On error the current ones stay in place.
    pub fn swap_params(&mut self, params: ParameterSet) -> Result<(), ParamError> {
        let strategy = StrategyKind::from_params(&params)?;
        self.signature = params.signature();
        self.params = params;
        self.strategy = strategy;
        Ok(())
    }

    /// `false` if a decision was already made on this bar.
    pub fn begin_bar(&mut self, bar_time: DateTime<Utc>) -> bool {
        if self.last_decision_bar.is_some_and(|t| t >= bar_time) {
            return false;
        }
        self.last_decision_bar = Some(bar_time);
        true
    }

    pub fn enter(&mut self, entry_price: f64, quantity: f64, at: DateTime<Utc>) -> bool {
        if self.in_position() {
            return false;
        }
        self.position = PositionState::Long {
            entry_price,
            quantity,
            entered_at: at,
        };
        true
    }

    /// Close the position, returning it.
    pub fn exit(&mut self) -> Option<PositionState> {
        if !self.in_position() {
            return None;
        }
        Some(std::mem::replace(&mut self.position, PositionState::Flat))
    }
}
