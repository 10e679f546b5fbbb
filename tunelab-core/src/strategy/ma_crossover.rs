//! Moving average crossover with the same long-horizon regime filter.
//!
//! Enters when the fast SMA crosses above the slow SMA in an uptrend.
//! Exits when the fast SMA falls back under the slow SMA, or on a stop bar.

use super::{is_stop_bar, Strategy};
use crate::domain::{ParamError, ParameterSet, Signal};
use crate::indicators::{IndicatorFrame, IndicatorSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct MaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
    pub trend_span: usize,
    pub stop_fraction: f64,
    pub volatility_period: usize,
}

impl MaCrossover {
    pub const NAME: &'static str = "ma_crossover";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        let strategy = Self {
            fast_period: params.period("fast_period")?,
            slow_period: params.period("slow_period")?,
            trend_span: params.period_or("trend_span", 200)?,
            stop_fraction: params.get_or("stop_fraction", 0.02)?,
            volatility_period: params.period_or("volatility_period", 14)?,
        };
        if strategy.fast_period >= strategy.slow_period {
            return Err(ParamError::Invalid {
                key: "fast_period".into(),
                value: strategy.fast_period as f64,
                reason: "must be below slow_period".into(),
            });
        }
        if !(strategy.stop_fraction > 0.0 && strategy.stop_fraction < 1.0) {
            return Err(ParamError::Invalid {
                key: "stop_fraction".into(),
                value: strategy.stop_fraction,
                reason: "must be in (0, 1)".into(),
            });
        }
        Ok(strategy)
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn indicator_settings(&self) -> IndicatorSettings {
        IndicatorSettings {
            oscillator_period: 1,
            average_period: self.slow_period,
            fast_average_period: Some(self.fast_period),
            trend_span: self.trend_span,
            volatility_period: self.volatility_period,
        }
    }

    fn evaluate(&self, frames: &[IndicatorFrame], index: usize, in_position: bool) -> Signal {
        if index >= frames.len() || index == 0 || index < self.warmup_bars() {
            return Signal::hold("warmup");
        }
        let (cur, prev) = (&frames[index], &frames[index - 1]);
        let values = [
            cur.fast_average,
            cur.moving_average,
            prev.fast_average,
            prev.moving_average,
            cur.trend_reference,
        ];
        if values.iter().any(|v| v.is_nan()) {
            return Signal::hold("indicator_undefined");
        }

        let crossed_up = cur.fast_average > cur.moving_average
            && prev.fast_average <= prev.moving_average;
        if !in_position && crossed_up && cur.uptrend {
            return Signal::enter("golden_cross");
        }
        if cur.fast_average < cur.moving_average {
            return Signal::exit("fast_below_slow");
        }
        if in_position && is_stop_bar(frames, index, self.stop_fraction) {
            return Signal::exit("stop_bar");
        }
        Signal::hold(if in_position { "holding" } else { "no_setup" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalKind;
    use crate::indicators::make_bars;

    fn strategy() -> MaCrossover {
        MaCrossover::from_params(
            &ParameterSet::new("ma_crossover")
                .with("fast_period", 2.0)
                .with("slow_period", 4.0)
                .with("trend_span", 4.0)
                .with("volatility_period", 3.0),
        )
        .unwrap()
    }

    #[test]
    fn rejects_fast_not_below_slow() {
        let p = ParameterSet::new("ma_crossover")
            .with("fast_period", 20.0)
            .with("slow_period", 10.0);
        assert!(MaCrossover::from_params(&p).is_err());
    }

    #[test]
    fn golden_cross_after_dip() {
        let s = strategy();
        let bars = make_bars(&[10.0, 10.0, 10.0, 10.0, 9.0, 8.0, 9.0, 12.0, 14.0]);
        let frames = s.frames(&bars);
        let signals = s.signals(&frames);
        let entries: Vec<usize> = signals
            .iter()
            .enumerate()
            .filter(|(_, sig)| sig.kind == SignalKind::EnterLong)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(entries, vec![7]);
    }

    #[test]
    fn exits_when_fast_drops_under_slow() {
        let s = strategy();
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 12.0, 10.0]);
        let frames = s.frames(&bars);
        assert_eq!(s.evaluate(&frames, 6, true).reason, "fast_below_slow");
    }
}
