//! Simulation engine: FLAT/LONG state machine, costs, trailing stop and metrics.
//!
//! A backtest is a pure function of (bars, parameters, configuration):
//! 1. Indicators are precomputed once for the whole series
//! 2. Each bar is evaluated with the simulator's own in-position flag
//! 3. Fills apply slippage to the close and charge the fee on capital
//! 4. Capital is recorded once per bar into the equity curve

pub mod cost_model;
pub mod metrics;
pub mod simulate;
pub mod trailing;

pub use cost_model::CostModel;
pub use metrics::{AnnualizationTable, PerformanceMetrics};
pub use simulate::{
    backtest, backtest_params, simulate, BacktestResult, ExitReason, RiskConfig,
    SimulationConfig, SimulationRun, TradeRecord,
};
pub use trailing::TrailingStop;
