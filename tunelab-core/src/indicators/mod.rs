//! Indicator series and the per-bar `IndicatorFrame`.
//!
//! Every indicator is a pure function of the bar history: full series in,
//! same-length series out, with `f64::NAN` during warm-up. Series are computed
//! once per backtest and then read bar by bar by the strategy.

pub mod ema;
pub mod frame;
pub mod rsi;
pub mod sma;
pub mod volatility;

pub use ema::{ema_of_series, Ema};
pub use frame::{compute_frames, IndicatorFrame, IndicatorSettings};
pub use rsi::{oscillator_value, Rsi};
pub use sma::{sma_of_series, Sma};
pub use volatility::{true_range, VolatilityRange};

use crate::domain::PriceBar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of leading values that are `f64::NAN`.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[PriceBar]) -> Vec<f64>;
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high/low = ±1.0 around the
/// body, volume = 1000, one bar per minute.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    use chrono::TimeZone;
    let start = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                timestamp: start + chrono::Duration::minutes(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    /// Truncating the series must not change any already-computed value.
    #[test]
    fn indicators_do_not_look_ahead() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let full = make_bars(&closes);
        let cut = &full[..80];
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Rsi::new(14)),
            Box::new(Sma::new(20)),
            Box::new(Ema::new(30)),
            Box::new(VolatilityRange::new(14)),
        ];
        for ind in &indicators {
            let a = ind.compute(&full);
            let b = ind.compute(cut);
            for i in 0..cut.len() {
                if b[i].is_nan() {
                    assert!(a[i].is_nan(), "{} diverged at {i}", ind.name());
                } else {
                    assert_approx(a[i], b[i], DEFAULT_EPSILON);
                }
            }
        }
    }

    #[test]
    fn warmup_prefix_matches_lookback() {
        let bars = make_bars(&(0..50).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Rsi::new(14)),
            Box::new(Sma::new(20)),
            Box::new(Ema::new(30)),
            Box::new(VolatilityRange::new(14)),
        ];
        for ind in &indicators {
            let values = ind.compute(&bars);
            let lookback = ind.lookback();
            assert!(values[..lookback].iter().all(|v| v.is_nan()), "{}", ind.name());
            assert!(!values[lookback].is_nan(), "{}", ind.name());
        }
    }
}
