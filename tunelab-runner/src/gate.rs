//! Quality gate: the acceptance predicate a candidate must pass before it
//! replaces a published record.
//!
//! `return >= min_total_return AND sharpe >= min_sharpe AND
//! max_drawdown >= -max_drawdown_magnitude`. NaN metrics fail every criterion.

use serde::{Deserialize, Serialize};
use std::fmt;
use tunelab_core::engine::PerformanceMetrics;
use tunelab_core::record::GateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    pub min_total_return: f64,
    pub min_sharpe: f64,
    /// Positive fraction; 0.2 allows drawdowns down to -20%.
    pub max_drawdown_magnitude: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_total_return: 0.0,
            min_sharpe: 0.0,
            max_drawdown_magnitude: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCriterion {
    TotalReturn,
    Sharpe,
    MaxDrawdown,
}

impl fmt::Display for GateCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotalReturn => f.write_str("total_return"),
            Self::Sharpe => f.write_str("sharpe"),
            Self::MaxDrawdown => f.write_str("max_drawdown"),
        }
    }
}

/// One failed criterion with the observed value and the bound it missed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateFailure {
    pub criterion: GateCriterion,
    pub actual: f64,
    pub bound: f64,
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.4} < {:.4}", self.criterion, self.actual, self.bound)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateVerdict {
    pub failures: Vec<GateFailure>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_on(&self, criterion: GateCriterion) -> bool {
        self.failures.iter().any(|f| f.criterion == criterion)
    }
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return f.write_str("passed");
        }
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl QualityGate {
    pub fn new(min_total_return: f64, min_sharpe: f64, max_drawdown_magnitude: f64) -> Self {
        Self {
            min_total_return,
            min_sharpe,
            max_drawdown_magnitude,
        }
    }

    pub fn evaluate(&self, metrics: &PerformanceMetrics) -> GateVerdict {
        let mut failures = Vec::new();
        let mut check = |criterion, actual: f64, bound: f64| {
            if !(actual >= bound) {
                failures.push(GateFailure {
                    criterion,
                    actual,
                    bound,
                });
            }
        };
        check(GateCriterion::TotalReturn, metrics.total_return, self.min_total_return);
        check(GateCriterion::Sharpe, metrics.annualized_sharpe, self.min_sharpe);
        check(
            GateCriterion::MaxDrawdown,
            metrics.max_drawdown,
            -self.max_drawdown_magnitude,
        );
        GateVerdict { failures }
    }

    pub fn snapshot(&self, verdict: &GateVerdict) -> GateSnapshot {
        GateSnapshot {
            min_total_return: self.min_total_return,
            min_sharpe: self.min_sharpe,
            max_drawdown_magnitude: self.max_drawdown_magnitude,
            passed: verdict.passed(),
            failures: verdict.failures.iter().map(ToString::to_string).collect(),
        }
    }

    /// Thresholds finite, drawdown magnitude in [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        if !self.min_total_return.is_finite() || !self.min_sharpe.is_finite() {
            return Err("gate thresholds must be finite".into());
        }
        if !(0.0..=1.0).contains(&self.max_drawdown_magnitude) {
            return Err(format!(
                "max_drawdown_magnitude {} must be in [0, 1]",
                self.max_drawdown_magnitude
            ));
        }
        Ok(())
    }
}
