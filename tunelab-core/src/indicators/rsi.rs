//! Momentum oscillator (RSI flavour, simple rolling means).
//!
//! Over the last `period` close-to-close changes:
//! avg_gain = mean(max(change, 0)), avg_loss = mean(max(-change, 0)),
//! value = 100 - 100 / (1 + avg_gain / avg_loss).
//! Lookback: period (needs period+1 closes).
//! Edge case: avg_loss == 0 → 100, including a perfectly flat window.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    /// A period of 0 is treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n <= self.period {
            return result;
        }

        let changes: Vec<f64> = bars.windows(2).map(|w| w[1].close - w[0].close).collect();

        // changes[j] is the move into bar j+1, so bar i closes the window
        // changes[i-period..i].
        for i in self.period..n {
            let window = &changes[i - self.period..i];
            if window.iter().any(|c| c.is_nan()) {
                continue;
            }
            let (gain, loss) = window.iter().fold((0.0, 0.0), |(g, l), &c| {
                if c > 0.0 {
                    (g + c, l)
                } else {
                    (g, l - c)
                }
            });
            let p = self.period as f64;
            result[i] = oscillator_value(gain / p, loss / p);
        }

        result
    }
}

/// 100 - 100 / (1 + gain/loss), saturating at 100 when there are no losses.
pub fn oscillator_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn rsi_all_gains() {
        let bars = make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let result = Rsi::new(3).compute(&bars);
        assert_approx(result[3], 100.0, 1e-9);
        assert_approx(result[5], 100.0, 1e-9);
    }

    #[test]
    fn rsi_all_losses() {
        let bars = make_bars(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0]);
        let result = Rsi::new(3).compute(&bars);
        assert_approx(result[3], 0.0, 1e-9);
    }

    #[test]
    fn rsi_flat_window_saturates() {
        let bars = make_bars(&[100.0; 6]);
        let result = Rsi::new(3).compute(&bars);
        assert_approx(result[4], 100.0, 1e-9);
    }

    #[test]
    fn rsi_simple_mean_window() {
        // Changes: +0.34, -0.25, -0.48, +0.72
        // Bar 3 window: gains 0.34, losses 0.73 → 100 - 100/(1 + 0.34/0.73)
        // Bar 4 window: gains 0.72, losses 0.73 (Wilder would differ here)
        let bars = make_bars(&[44.0, 44.34, 44.09, 43.61, 44.33]);
        let result = Rsi::new(3).compute(&bars);

        assert!(result[..3].iter().all(|v| v.is_nan()));
        assert_approx(result[3], 100.0 - 100.0 / (1.0 + 0.34 / 0.73), 1e-9);
        assert_approx(result[4], 100.0 - 100.0 / (1.0 + 0.72 / 0.73), 1e-9);
    }

    #[test]
    fn rsi_bounds() {
        let bars = make_bars(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0]);
        let result = Rsi::new(3).compute(&bars);
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "RSI out of bounds at bar {i}: {v}");
            }
        }
    }

    #[test]
    fn rsi_short_series_is_all_nan() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        assert!(Rsi::new(3).compute(&bars).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_period_larger_than_any_series_is_all_nan() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        assert!(Rsi::new(usize::MAX).compute(&bars).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_lookback() {
        assert_eq!(Rsi::new(14).lookback(), 14);
        assert_eq!(Rsi::new(0).lookback(), 1);
    }
}
