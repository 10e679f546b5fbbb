//! Strategy families and their dispatch.
//!
//! A `ParameterSet` names its family in `strategy_name`; `StrategyKind::from_params`
//! validates the parameters and binds them to the matching implementation.
//! Strategies never see capital or fills, only frames and the in-position flag.

pub mod ma_crossover;
pub mod oscillator_regime;

pub use ma_crossover::MaCrossover;
pub use oscillator_regime::OscillatorRegime;

use crate::domain::{ParamError, ParameterSet, PriceBar, Signal};
use crate::indicators::{compute_frames, IndicatorFrame, IndicatorSettings};

/// Relative margin below the moving average that counts as a breakdown.
pub const AVERAGE_EXIT_MARGIN: f64 = 0.005;

/// Trait for strategy families.
pub trait Strategy: Send + Sync {
    /// Family name as stored in `ParameterSet::strategy_name`.
    fn name(&self) -> &'static str;

    /// Indicator windows this strategy reads.
    fn indicator_settings(&self) -> IndicatorSettings;

    /// Bars evaluated as HOLD before any decision is made.
    fn warmup_bars(&self) -> usize {
        self.indicator_settings().warmup_bars()
    }

    /// Signal for `frames[index]`. Only frames up to `index` may be read.
    fn evaluate(&self, frames: &[IndicatorFrame], index: usize, in_position: bool) -> Signal;

    /// Frames for a bar series under this strategy's settings.
    fn frames(&self, bars: &[PriceBar]) -> Vec<IndicatorFrame> {
        compute_frames(bars, &self.indicator_settings())
    }

    /// Stateless signal sequence, every bar evaluated as if flat.
    fn signals(&self, frames: &[IndicatorFrame]) -> Vec<Signal> {
        (0..frames.len())
            .map(|i| self.evaluate(frames, i, false))
            .collect()
    }
}

/// Tagged dispatch over the supported families.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    OscillatorRegime(OscillatorRegime),
    MaCrossover(MaCrossover),
}

impl StrategyKind {
    /// Names accepted in `ParameterSet::strategy_name`.
    pub const NAMES: [&'static str; 2] = [OscillatorRegime::NAME, MaCrossover::NAME];

    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        match params.strategy_name.as_str() {
            OscillatorRegime::NAME => Ok(Self::OscillatorRegime(OscillatorRegime::from_params(params)?)),
            MaCrossover::NAME => Ok(Self::MaCrossover(MaCrossover::from_params(params)?)),
            other => Err(ParamError::UnknownStrategy(other.to_string())),
        }
    }

    /// Grid validity predicate.
    pub fn validate(params: &ParameterSet) -> Result<(), ParamError> {
        Self::from_params(params).map(|_| ())
    }

    pub fn is_known(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    fn inner(&self) -> &dyn Strategy {
        match self {
            Self::OscillatorRegime(s) => s,
            Self::MaCrossover(s) => s,
        }
    }
}

impl Strategy for StrategyKind {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn indicator_settings(&self) -> IndicatorSettings {
        self.inner().indicator_settings()
    }

    fn warmup_bars(&self) -> usize {
        self.inner().warmup_bars()
    }

    fn evaluate(&self, frames: &[IndicatorFrame], index: usize, in_position: bool) -> Signal {
        self.inner().evaluate(frames, index, in_position)
    }
}

/// Single-bar decline beyond `stop_fraction`. Shared by both families.
pub(crate) fn is_stop_bar(frames: &[IndicatorFrame], index: usize, stop_fraction: f64) -> bool {
    index > 0 && frames[index].close() < frames[index - 1].close() * (1.0 - stop_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_name() {
        let p = ParameterSet::new("rsi_sma")
            .with("rsi_period", 14.0)
            .with("sma_period", 20.0)
            .with("rsi_buy", 35.0)
            .with("rsi_sell", 65.0);
        let kind = StrategyKind::from_params(&p).unwrap();
        assert_eq!(kind.name(), "rsi_sma");

        let p = ParameterSet::new("ma_crossover")
            .with("fast_period", 10.0)
            .with("slow_period", 30.0);
        let kind = StrategyKind::from_params(&p).unwrap();
        assert_eq!(kind.name(), "ma_crossover");
    }

    #[test]
    fn unknown_family_rejected() {
        let p = ParameterSet::new("martingale");
        assert_eq!(
            StrategyKind::validate(&p),
            Err(ParamError::UnknownStrategy("martingale".into()))
        );
        assert!(!StrategyKind::is_known("martingale"));
        assert!(StrategyKind::is_known("rsi_sma"));
    }

    #[test]
    fn strategy_kind_is_send_sync() {
        fn require<T: Send + Sync>() {}
        require::<StrategyKind>();
    }
}
