//! Bar-by-bar simulation of a single long-only exposure.
//!
//! FLAT →(ENTER_LONG)→ LONG →(EXIT_LONG or trailing stop)→ FLAT
//!
//! Per bar, in order:
//! 1. While LONG with a trailing stop: exit if close <= level, else ratchet
//! 2. While LONG: exit on an EXIT_LONG signal
//! 3. While FLAT (and not exited this bar): enter on an ENTER_LONG signal
//! 4. Record capital into the equity curve
//!
//! A position still open after the last bar is neither closed nor counted.

use super::cost_model::CostModel;
use super::metrics::{PerformanceMetrics, DEFAULT_PERIODS_PER_YEAR};
use super::trailing::TrailingStop;
use crate::domain::{ParamError, ParameterSet, PriceBar, Signal};
use crate::indicators::IndicatorFrame;
use crate::strategy::{Strategy, StrategyKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Volatility-based sizing and trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of capital at risk between entry and the initial stop.
    pub max_risk_per_trade: f64,
    /// Upper bound on the position size as a fraction of capital.
    pub max_capital_fraction: f64,
    /// Initial stop distance in volatility units.
    pub stop_multiple: f64,
    /// Trailing distance in volatility units.
    pub trail_multiple: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: 0.02,
            max_capital_fraction: 0.2,
            stop_multiple: 2.0,
            trail_multiple: 1.5,
        }
    }
}

impl RiskConfig {
    /// Position size as a fraction of capital.
    ///
    /// units = capital * max_risk / (stop_multiple * volatility), converted to
    /// a capital fraction at the entry price and capped. Without a usable
    /// volatility the cap is used.
    pub fn position_size(&self, capital: f64, entry_price: f64, volatility: f64) -> f64 {
        let stop_distance = self.stop_multiple * volatility;
        if !(stop_distance > 0.0) || !(capital > 0.0) {
            return self.max_capital_fraction;
        }
        let units = capital * self.max_risk_per_trade / stop_distance;
        let fraction = units * entry_price / capital;
        fraction.clamp(0.0, self.max_capital_fraction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub costs: CostModel,
    /// `None` runs the plain variant: full exposure, no trailing stop.
    pub risk: Option<RiskConfig>,
    pub periods_per_year: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            costs: CostModel::default(),
            risk: None,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    TrailingStop,
}

/// One closed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Entry fill, slippage included.
    pub entry_price: f64,
    /// Exit fill, slippage included.
    pub exit_price: f64,
    pub position_size: f64,
    /// (exit_price - entry_price) / entry_price.
    pub pnl: f64,
    pub exit_reason: ExitReason,
    /// Signal reason, or "trailing_stop".
    pub exit_note: String,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Return scaled by the fraction of capital exposed.
    pub fn weighted_pnl(&self) -> f64 {
        self.pnl * self.position_size
    }

    pub fn bars_held(&self) -> usize {
        self.exit_index - self.entry_index
    }
}

/// Equity, trade log and metrics of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub equity: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub metrics: PerformanceMetrics,
}

/// A scored ParameterSet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub params: ParameterSet,
    pub metrics: PerformanceMetrics,
    pub equity: Vec<f64>,
    pub trades: Vec<TradeRecord>,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    entry_index: usize,
    entry_time: DateTime<Utc>,
    entry_price: f64,
    size: f64,
    stop: Option<TrailingStop>,
}

/// Mutable simulation state. Owned by one run.
struct Ledger<'a> {
    config: &'a SimulationConfig,
    capital: f64,
    position: Option<OpenPosition>,
    equity: Vec<f64>,
    trades: Vec<TradeRecord>,
}

impl<'a> Ledger<'a> {
    fn new(config: &'a SimulationConfig, bars: usize) -> Self {
        Self {
            config,
            capital: config.initial_capital,
            position: None,
            equity: Vec::with_capacity(bars),
            trades: Vec::new(),
        }
    }

    fn in_position(&self) -> bool {
        self.position.is_some()
    }

    fn on_bar(&mut self, index: usize, frame: &IndicatorFrame, signal: &Signal) {
        let close = frame.close();
        let mut exited = false;

        let stop_hit = match self.position.as_mut().and_then(|p| p.stop.as_mut()) {
            Some(stop) if stop.is_breached(close) => true,
            Some(stop) => {
                stop.ratchet(close, frame.volatility_range);
                false
            }
            None => false,
        };
        if stop_hit {
            self.exit(index, frame, ExitReason::TrailingStop, "trailing_stop");
            exited = true;
        } else if self.in_position() && signal.is_exit() {
            self.exit(index, frame, ExitReason::Signal, &signal.reason);
            exited = true;
        }

        if !exited && !self.in_position() && signal.is_entry() {
            self.enter(index, frame);
        }

        self.equity.push(self.capital);
    }

    fn enter(&mut self, index: usize, frame: &IndicatorFrame) {
        let costs = &self.config.costs;
        let entry_price = costs.buy_fill(frame.close());
        self.capital *= costs.fee_factor();

        let (size, stop) = match &self.config.risk {
            Some(risk) => (
                risk.position_size(self.capital, entry_price, frame.volatility_range),
                Some(TrailingStop::open(
                    entry_price,
                    frame.volatility_range,
                    risk.stop_multiple,
                    risk.trail_multiple,
                )),
            ),
            None => (1.0, None),
        };

        self.position = Some(OpenPosition {
            entry_index: index,
            entry_time: frame.bar.timestamp,
            entry_price,
            size,
            stop,
        });
    }

    fn exit(&mut self, index: usize, frame: &IndicatorFrame, reason: ExitReason, note: &str) {
        let Some(position) = self.position.take() else {
            return;
        };
        let costs = &self.config.costs;
        let exit_price = costs.sell_fill(frame.close());
        let pnl = (exit_price - position.entry_price) / position.entry_price;
        self.capital *= (1.0 + pnl * position.size) * costs.fee_factor();

        self.trades.push(TradeRecord {
            entry_index: position.entry_index,
            exit_index: index,
            entry_time: position.entry_time,
            exit_time: frame.bar.timestamp,
            entry_price: position.entry_price,
            exit_price,
            position_size: position.size,
            pnl,
            exit_reason: reason,
            exit_note: note.to_string(),
        });
    }

    fn finish(self) -> SimulationRun {
        let metrics = PerformanceMetrics::compute(
            &self.equity,
            &self.trades,
            self.config.initial_capital,
            self.config.periods_per_year,
        );
        SimulationRun {
            equity: self.equity,
            trades: self.trades,
            metrics,
        }
    }
}

/// Replay a fixed signal sequence. Missing signals count as HOLD.
pub fn simulate(
    frames: &[IndicatorFrame],
    signals: &[Signal],
    config: &SimulationConfig,
) -> SimulationRun {
    let hold = Signal::hold("no_signal");
    let mut ledger = Ledger::new(config, frames.len());
    for (index, frame) in frames.iter().enumerate() {
        ledger.on_bar(index, frame, signals.get(index).unwrap_or(&hold));
    }
    ledger.finish()
}

/// Evaluate `strategy` bar by bar with the simulator's own position state.
pub fn backtest(
    bars: &[PriceBar],
    strategy: &StrategyKind,
    params: &ParameterSet,
    config: &SimulationConfig,
) -> BacktestResult {
    let frames = strategy.frames(bars);
    let mut ledger = Ledger::new(config, frames.len());
    for (index, frame) in frames.iter().enumerate() {
        let signal = strategy.evaluate(&frames, index, ledger.in_position());
        ledger.on_bar(index, frame, &signal);
    }
    let run = ledger.finish();
    BacktestResult {
        params: params.clone(),
        metrics: run.metrics,
        equity: run.equity,
        trades: run.trades,
    }
}

/// Resolve the strategy family from `params`, then backtest.
pub fn backtest_params(
    bars: &[PriceBar],
    params: &ParameterSet,
    config: &SimulationConfig,
) -> Result<BacktestResult, ParamError> {
    let strategy = StrategyKind::from_params(params)?;
    Ok(backtest(bars, &strategy, params, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{compute_frames, make_bars, IndicatorSettings};

    fn frames_for(closes: &[f64]) -> Vec<IndicatorFrame> {
        let settings = IndicatorSettings {
            oscillator_period: 2,
            average_period: 2,
            fast_average_period: None,
            trend_span: 2,
            volatility_period: 2,
        };
        compute_frames(&make_bars(closes), &settings)
    }

    fn config(fee: f64, slip: f64) -> SimulationConfig {
        SimulationConfig {
            initial_capital: 1_000.0,
            costs: CostModel::new(fee, slip),
            risk: None,
            periods_per_year: 252.0,
        }
    }

    fn signals(spec: &str) -> Vec<Signal> {
        spec.chars()
            .map(|c| match c {
                'E' => Signal::enter("test"),
                'X' => Signal::exit("test"),
                _ => Signal::hold("test"),
            })
            .collect()
    }

    #[test]
    fn round_trip_applies_fees_and_slippage() {
        let frames = frames_for(&[100.0, 100.0, 110.0]);
        let run = simulate(&frames, &signals("E.X"), &config(0.001, 0.0005));

        let entry = 100.0 * 1.0005;
        let exit = 110.0 * 0.9995;
        let expected = 1_000.0 * 0.999 * (1.0 + (exit - entry) / entry) * 0.999;
        assert_eq!(run.trades.len(), 1);
        assert!((run.equity[2] - expected).abs() < 1e-9);
        assert!((run.equity[0] - 999.0).abs() < 1e-9);
    }

    #[test]
    fn equity_has_one_value_per_bar() {
        let frames = frames_for(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let run = simulate(&frames, &signals("E"), &config(0.0, 0.0));
        assert_eq!(run.equity.len(), 5);
    }

    #[test]
    fn exit_while_flat_and_entry_while_long_are_ignored() {
        let frames = frames_for(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let run = simulate(&frames, &signals("XEEXX"), &config(0.0, 0.0));
        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].entry_index, 1);
        assert_eq!(run.trades[0].exit_index, 3);
    }

    #[test]
    fn open_position_at_end_is_not_counted() {
        let frames = frames_for(&[100.0, 120.0, 140.0]);
        let run = simulate(&frames, &signals("E.."), &config(0.0, 0.0));
        assert!(run.trades.is_empty());
        assert_eq!(run.metrics.trade_count, 0);
        assert_eq!(*run.equity.last().unwrap(), 1_000.0);
    }

    #[test]
    fn empty_input_is_zeroed() {
        let run = simulate(&[], &[], &SimulationConfig::default());
        assert!(run.equity.is_empty());
        assert_eq!(run.metrics, PerformanceMetrics::zero());
    }

    #[test]
    fn risk_sizing_caps_exposure() {
        let risk = RiskConfig::default();
        // tiny volatility → huge unit count → capped at 20%
        assert_eq!(risk.position_size(10_000.0, 100.0, 0.01), 0.2);
        // capital 10k, risk 200, stop distance 20 → 10 units → 1000 notional → 10%
        assert!((risk.position_size(10_000.0, 100.0, 10.0) - 0.1).abs() < 1e-12);
        assert_eq!(risk.position_size(10_000.0, 100.0, f64::NAN), 0.2);
    }

    #[test]
    fn trailing_stop_forces_exit() {
        let mut frames = frames_for(&[100.0, 100.0, 100.0, 110.0, 90.0, 95.0]);
        for f in &mut frames {
            f.volatility_range = 2.0;
        }
        let cfg = SimulationConfig {
            risk: Some(RiskConfig::default()),
            ..config(0.0, 0.0)
        };
        let run = simulate(&frames, &signals("..E..."), &cfg);
        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TrailingStop);
        assert_eq!(trade.exit_index, 4);
        assert!((trade.position_size - 0.2).abs() < 1e-12);
    }
}
