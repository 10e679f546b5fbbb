//! Candidate ranking.
//!
//! Two modes over the same eligibility rule (`trade_count >= min_trades`):
//! - **Lexicographic**: total return desc, Sharpe desc, |max drawdown| asc.
//! - **Robust**: `0.6·z(return) + 0.3·z(sharpe) − 0.1·z(|drawdown|)`, z-scores
//!   over the eligible population (population std; z = 0 when std is 0).
//!
//! Remaining ties break by grid index, so a ranking is a pure function of its
//! input order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tunelab_core::engine::{BacktestResult, PerformanceMetrics};

pub const RETURN_WEIGHT: f64 = 0.6;
pub const SHARPE_WEIGHT: f64 = 0.3;
pub const DRAWDOWN_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    #[default]
    Lexicographic,
    Robust,
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexicographic => f.write_str("lexicographic"),
            Self::Robust => f.write_str("robust"),
        }
    }
}

/// One evaluated parameter set and its place in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    /// 1-based rank among eligible rows; `None` for ineligible rows.
    pub rank: Option<usize>,
    /// Position of the combination in grid order.
    pub grid_index: usize,
    pub eligible: bool,
    /// Composite score (robust mode, eligible rows only).
    pub score: Option<f64>,
    pub result: BacktestResult,
}

impl RankedRow {
    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.result.metrics
    }
}

/// Top of the table, or the reason there is none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopCandidate<'a> {
    Selected(&'a RankedRow),
    NoViableCandidate { evaluated: usize, min_trades: usize },
}

/// Full ranked table: eligible rows first in rank order, then ineligible rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTable {
    pub mode: RankingMode,
    pub min_trades: usize,
    pub rows: Vec<RankedRow>,
}

impl RankedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn eligible_count(&self) -> usize {
        self.rows.iter().filter(|r| r.eligible).count()
    }

    pub fn top(&self) -> TopCandidate<'_> {
        match self.rows.first() {
            Some(row) if row.eligible => TopCandidate::Selected(row),
            _ => TopCandidate::NoViableCandidate {
                evaluated: self.rows.len(),
                min_trades: self.min_trades,
            },
        }
    }

    /// Eligible rows in rank order.
    pub fn eligible(&self) -> impl Iterator<Item = &RankedRow> {
        self.rows.iter().filter(|r| r.eligible)
    }
}

/// Rank `results`, which must be in grid order.
pub fn rank(results: Vec<BacktestResult>, mode: RankingMode, min_trades: usize) -> RankedTable {
    let mut rows: Vec<RankedRow> = results
        .into_iter()
        .enumerate()
        .map(|(grid_index, result)| RankedRow {
            rank: None,
            grid_index,
            eligible: result.metrics.trade_count >= min_trades,
            score: None,
            result,
        })
        .collect();

    if mode == RankingMode::Robust {
        assign_robust_scores(&mut rows);
    }

    rows.sort_by(|a, b| {
        b.eligible
            .cmp(&a.eligible)
            .then_with(|| match mode {
                RankingMode::Lexicographic => lexicographic_cmp(a.metrics(), b.metrics()),
                RankingMode::Robust if a.eligible && b.eligible => {
                    desc(a.score.unwrap_or(0.0), b.score.unwrap_or(0.0))
                }
                RankingMode::Robust => lexicographic_cmp(a.metrics(), b.metrics()),
            })
            .then_with(|| a.grid_index.cmp(&b.grid_index))
    });

    let mut next_rank = 1;
    for row in rows.iter_mut().filter(|r| r.eligible) {
        row.rank = Some(next_rank);
        next_rank += 1;
    }

    RankedTable {
        mode,
        min_trades,
        rows,
    }
}

/// Orders better candidates first.
pub fn lexicographic_cmp(a: &PerformanceMetrics, b: &PerformanceMetrics) -> Ordering {
    desc(a.total_return, b.total_return)
        .then_with(|| desc(a.annualized_sharpe, b.annualized_sharpe))
        .then_with(|| asc(a.max_drawdown.abs(), b.max_drawdown.abs()))
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn asc(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn assign_robust_scores(rows: &mut [RankedRow]) {
    let eligible: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].eligible).collect();
    let column = |f: fn(&PerformanceMetrics) -> f64| -> Vec<f64> {
        eligible.iter().map(|&i| f(rows[i].metrics())).collect()
    };
    let returns = z_scores(&column(|m| m.total_return));
    let sharpes = z_scores(&column(|m| m.annualized_sharpe));
    let drawdowns = z_scores(&column(|m| m.max_drawdown.abs()));

    for (slot, &i) in eligible.iter().enumerate() {
        rows[i].score = Some(
            RETURN_WEIGHT * returns[slot] + SHARPE_WEIGHT * sharpes[slot]
                - DRAWDOWN_WEIGHT * drawdowns[slot],
        );
    }
}

/// Population z-scores; all zeros when the spread is zero.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}
