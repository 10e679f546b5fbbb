//! `IndicatorFrame`: one bar plus every indicator value a strategy reads.

use super::{Ema, Indicator, Rsi, Sma, VolatilityRange};
use crate::domain::PriceBar;
use serde::{Deserialize, Serialize};

/// Windows for the indicator set. `fast_average_period` is only set by
/// strategy families that compare two averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    pub oscillator_period: usize,
    pub average_period: usize,
    pub fast_average_period: Option<usize>,
    pub trend_span: usize,
    pub volatility_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            oscillator_period: 14,
            average_period: 20,
            fast_average_period: None,
            trend_span: 200,
            volatility_period: 14,
        }
    }
}

impl IndicatorSettings {
    /// Bars before every configured series is defined.
    pub fn warmup_bars(&self) -> usize {
        [
            self.oscillator_period,
            self.average_period,
            self.fast_average_period.unwrap_or(0),
            self.trend_span,
            self.volatility_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// A bar with its derived indicators. Warm-up values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFrame {
    pub bar: PriceBar,
    pub oscillator: f64,
    pub moving_average: f64,
    pub fast_average: f64,
    pub trend_reference: f64,
    pub volatility_range: f64,
    /// close >= trend_reference; false while the reference is undefined.
    pub uptrend: bool,
}

impl IndicatorFrame {
    pub fn close(&self) -> f64 {
        self.bar.close
    }
}

/// Compute one frame per bar.
pub fn compute_frames(bars: &[PriceBar], settings: &IndicatorSettings) -> Vec<IndicatorFrame> {
    let oscillator = Rsi::new(settings.oscillator_period).compute(bars);
    let average = Sma::new(settings.average_period).compute(bars);
    let fast = match settings.fast_average_period {
        Some(period) => Sma::new(period).compute(bars),
        None => vec![f64::NAN; bars.len()],
    };
    let trend = Ema::new(settings.trend_span).compute(bars);
    let volatility = VolatilityRange::new(settings.volatility_period).compute(bars);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let trend_reference = trend[i];
            IndicatorFrame {
                bar: bar.clone(),
                oscillator: oscillator[i],
                moving_average: average[i],
                fast_average: fast[i],
                trend_reference,
                volatility_range: volatility[i],
                // NaN compares false
                uptrend: bar.close >= trend_reference,
            }
        })
        .collect()
}
