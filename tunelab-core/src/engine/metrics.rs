//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar out.

use super::simulate::TradeRecord;
use crate::domain::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Profit factor reported when there are winners and no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Periods per year used when a timeframe has no table entry.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_sharpe: f64,
    /// Non-positive fraction, e.g. -0.15 for a 15% drawdown.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
}

impl PerformanceMetrics {
    pub fn zero() -> Self {
        Self {
            total_return: 0.0,
            annualized_sharpe: 0.0,
            max_drawdown: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            trade_count: 0,
        }
    }

    /// Compute all metrics from an equity curve and trade list.
    pub fn compute(
        equity_curve: &[f64],
        trades: &[TradeRecord],
        initial_capital: f64,
        periods_per_year: f64,
    ) -> Self {
        if equity_curve.is_empty() {
            return Self::zero();
        }
        Self {
            total_return: total_return(equity_curve, initial_capital),
            annualized_sharpe: sharpe_ratio(equity_curve, periods_per_year),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
        }
    }
}

/// Timeframe label → periods per year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnualizationTable(pub BTreeMap<String, f64>);

impl Default for AnnualizationTable {
    fn default() -> Self {
        let entries = [
            ("1d", 252.0),
            ("4h", 2_190.0),
            ("1h", 8_760.0),
            ("30m", 17_520.0),
            ("15m", 35_040.0),
            ("5m", 105_120.0),
        ];
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl AnnualizationTable {
    pub fn get(&self, timeframe: &Timeframe) -> Option<f64> {
        self.0.get(&timeframe.label()).copied()
    }

    /// Table entry, or 252 when the timeframe is missing.
    pub fn periods_per_year(&self, timeframe: &Timeframe) -> f64 {
        self.get(timeframe).unwrap_or(DEFAULT_PERIODS_PER_YEAR)
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// equity[-1] / initial - 1. Zero for empty equity or non-positive capital.
pub fn total_return(equity_curve: &[f64], initial_capital: f64) -> f64 {
    match equity_curve.last() {
        Some(last) if initial_capital > 0.0 => last / initial_capital - 1.0,
        _ => 0.0,
    }
}

/// Annualized Sharpe ratio of per-bar returns.
///
/// Sharpe = mean(returns) / std(returns) * sqrt(periods_per_year), sample std.
/// Returns 0.0 if the deviation is zero or there are fewer than 2 bars.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std * periods_per_year.max(0.0).sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of closed trades with a positive return.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Gross profit / gross loss over position-weighted trade returns.
///
/// Capped at 100.0 (all winners, zero losses). 0.0 with no trades.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let (gross_profit, gross_loss) = trades.iter().fold((0.0, 0.0), |(gp, gl), t| {
        let pnl = t.weighted_pnl();
        if pnl > 0.0 {
            (gp + pnl, gl)
        } else {
            (gp, gl - pnl)
        }
    });
    if gross_loss < 1e-12 {
        return if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Per-bar percentage change of equity; the first bar's return is 0.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.is_empty() {
        return Vec::new();
    }
    let mut returns = Vec::with_capacity(equity_curve.len());
    returns.push(0.0);
    returns.extend(equity_curve.windows(2).map(|w| {
        if w[0] > 0.0 {
            (w[1] - w[0]) / w[0]
        } else {
            0.0
        }
    }));
    returns
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
