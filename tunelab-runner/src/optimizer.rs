//! Grid optimizer: backtest every valid combination, then rank.
//!
//! The sweep may run on the rayon pool. Results are always collected in grid
//! order, so serial and parallel sweeps produce identical tables.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tunelab_core::domain::{ParamError, ParameterSet, PriceBar};
use tunelab_core::engine::{backtest_params, BacktestResult, SimulationConfig};

use crate::grid::ParamGrid;
use crate::ranking::{rank, RankedTable, RankingMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Minimum realized trades for a candidate to be eligible.
    pub min_trades: usize,
    pub ranking: RankingMode,
    pub parallel: bool,
    /// Wall-clock budget for one sweep.
    pub deadline_secs: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_trades: 5,
            ranking: RankingMode::Lexicographic,
            parallel: true,
            deadline_secs: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("grid for '{strategy}' has no valid combinations")]
    NoValidCombinations {
        strategy: String,
        #[source]
        reason: Option<ParamError>,
    },

    #[error("sweep deadline of {deadline:?} exceeded after {completed}/{total} combinations")]
    DeadlineExceeded {
        deadline: Duration,
        completed: usize,
        total: usize,
    },

    #[error("invalid parameters: {0}")]
    Param(#[from] ParamError),
}

pub struct Optimizer {
    config: OptimizerConfig,
    simulation: SimulationConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, simulation: SimulationConfig) -> Self {
        Self { config, simulation }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    /// Backtest every valid combination. Results are in grid order.
    pub fn sweep(&self, bars: &[PriceBar], grid: &ParamGrid) -> Result<Vec<BacktestResult>, OptimizeError> {
        let combos = grid.combinations();
        if combos.is_empty() {
            return Err(OptimizeError::NoValidCombinations {
                strategy: grid.strategy.clone(),
                reason: grid.first_rejection(),
            });
        }

        let total = combos.len();
        let deadline = self.config.deadline_secs.map(Duration::from_secs);
        let started = Instant::now();
        let completed = AtomicUsize::new(0);

        let run_one = |params: &ParameterSet| -> Result<BacktestResult, OptimizeError> {
            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    return Err(OptimizeError::DeadlineExceeded {
                        deadline: limit,
                        completed: completed.load(Ordering::Relaxed),
                        total,
                    });
                }
            }
            let result = backtest_params(bars, params, &self.simulation)?;
            completed.fetch_add(1, Ordering::Relaxed);
            Ok(result)
        };

        let results = if self.config.parallel {
            combos.par_iter().map(run_one).collect::<Result<Vec<_>, _>>()?
        } else {
            combos.iter().map(run_one).collect::<Result<Vec<_>, _>>()?
        };

        tracing::debug!(
            strategy = %grid.strategy,
            combinations = total,
            bars = bars.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            parallel = self.config.parallel,
            "grid sweep complete"
        );
        Ok(results)
    }

    /// Sweep and rank.
    pub fn optimize(&self, bars: &[PriceBar], grid: &ParamGrid) -> Result<RankedTable, OptimizeError> {
        let results = self.sweep(bars, grid)?;
        Ok(rank(results, self.config.ranking, self.config.min_trades))
    }
}
