//! Oscillator + moving-average strategy with a long-horizon regime filter.
//!
//! Entry while flat, in an uptrend with close above the average:
//! - classic: the oscillator crosses up through `rsi_buy` (prev < buy, now >= buy).
//!   On the first bar after warm-up an undefined previous reading counts as below.
//! - recovery: the oscillator was below `rsi_buy` within the last `lookback_bars`
//!   bars and is now >= buy and rising
//!
//! Exit: oscillator above `rsi_sell`, close more than 0.5% under the average,
//! or (in position only) a single-bar drop larger than `stop_fraction`.

use super::{is_stop_bar, Strategy, AVERAGE_EXIT_MARGIN};
use crate::domain::{ParamError, ParameterSet, Signal};
use crate::indicators::{IndicatorFrame, IndicatorSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorRegime {
    pub rsi_period: usize,
    pub sma_period: usize,
    pub rsi_buy: f64,
    pub rsi_sell: f64,
    pub lookback_bars: usize,
    pub trend_span: usize,
    pub stop_fraction: f64,
    pub volatility_period: usize,
}

impl OscillatorRegime {
    pub const NAME: &'static str = "rsi_sma";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        let strategy = Self {
            rsi_period: params.period("rsi_period")?,
            sma_period: params.period("sma_period")?,
            rsi_buy: params.require("rsi_buy")?,
            rsi_sell: params.require("rsi_sell")?,
            lookback_bars: params.period_or("lookback_bars", 8)?,
            trend_span: params.period_or("trend_span", 200)?,
            stop_fraction: params.get_or("stop_fraction", 0.02)?,
            volatility_period: params.period_or("volatility_period", 14)?,
        };

        if !(strategy.rsi_buy > 0.0 && strategy.rsi_buy < 100.0) {
            return Err(invalid("rsi_buy", strategy.rsi_buy, "must be in (0, 100)"));
        }
        if !(strategy.rsi_sell > 0.0 && strategy.rsi_sell < 100.0) {
            return Err(invalid("rsi_sell", strategy.rsi_sell, "must be in (0, 100)"));
        }
        if strategy.rsi_buy >= strategy.rsi_sell {
            return Err(invalid("rsi_buy", strategy.rsi_buy, "must be below rsi_sell"));
        }
        if !(strategy.stop_fraction > 0.0 && strategy.stop_fraction < 1.0) {
            return Err(invalid(
                "stop_fraction",
                strategy.stop_fraction,
                "must be in (0, 1)",
            ));
        }
        Ok(strategy)
    }

    fn recently_oversold(&self, frames: &[IndicatorFrame], index: usize) -> bool {
        let start = (index + 1).saturating_sub(self.lookback_bars);
        frames[start..=index]
            .iter()
            .any(|f| f.oscillator < self.rsi_buy)
    }
}

impl Strategy for OscillatorRegime {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn indicator_settings(&self) -> IndicatorSettings {
        IndicatorSettings {
            oscillator_period: self.rsi_period,
            average_period: self.sma_period,
            fast_average_period: None,
            trend_span: self.trend_span,
            volatility_period: self.volatility_period,
        }
    }

    fn evaluate(&self, frames: &[IndicatorFrame], index: usize, in_position: bool) -> Signal {
        if index >= frames.len() || index == 0 || index < self.warmup_bars() {
            return Signal::hold("warmup");
        }
        let frame = &frames[index];
        let prev = &frames[index - 1];
        let osc = frame.oscillator;
        let average = frame.moving_average;
        if osc.is_nan()
            || average.is_nan()
            || frame.trend_reference.is_nan()
            || frame.volatility_range.is_nan()
        {
            return Signal::hold("indicator_undefined");
        }

        if !in_position && frame.uptrend && frame.close() > average && osc >= self.rsi_buy {
            // The first evaluable bar counts as a cross: there is no defined
            // previous reading to have been below the threshold.
            let prev_undefined = index - 1 < self.warmup_bars() || prev.oscillator.is_nan();
            if prev_undefined || prev.oscillator < self.rsi_buy {
                return Signal::enter("classic_cross");
            }
            if osc > prev.oscillator && self.recently_oversold(frames, index) {
                return Signal::enter("recovery");
            }
        }

        if osc > self.rsi_sell {
            return Signal::exit("oscillator_above_sell");
        }
        if frame.close() < average * (1.0 - AVERAGE_EXIT_MARGIN) {
            return Signal::exit("below_average");
        }
        if in_position && is_stop_bar(frames, index, self.stop_fraction) {
            return Signal::exit("stop_bar");
        }

        Signal::hold(if in_position { "holding" } else { "no_setup" })
    }
}

fn invalid(key: &str, value: f64, reason: &str) -> ParamError {
    ParamError::Invalid {
        key: key.to_string(),
        value,
        reason: reason.to_string(),
    }
}
