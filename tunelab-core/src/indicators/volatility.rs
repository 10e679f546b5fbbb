//! Volatility range: rolling simple mean of the true range.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! Lookback: period - 1 (TR[0] is defined as high-low).

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct VolatilityRange {
    period: usize,
    name: String,
}

impl VolatilityRange {
    /// A period of 0 is treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("volatility_{period}"),
        }
    }
}

impl Indicator for VolatilityRange {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        sma_of_series(&true_range(bars), self.period)
    }
}

/// True Range series.
/// TR[0] = high[0] - low[0] (no previous close).
pub fn true_range(bars: &[PriceBar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    let mut prev_close: Option<f64> = None;
    for bar in bars {
        let hl = bar.high - bar.low;
        let value = match prev_close {
            Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
            None => hl,
        };
        tr.push(value);
        prev_close = Some(bar.close);
    }
    tr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn true_range_uses_gap_to_prev_close() {
        let mut bars = make_bars(&[100.0, 110.0]);
        bars[1].high = 111.0;
        bars[1].low = 108.0;
        let tr = true_range(&bars);
        assert_approx(tr[0], 2.0, DEFAULT_EPSILON);
        // |111 - 100| beats 111 - 108
        assert_approx(tr[1], 11.0, DEFAULT_EPSILON);
    }

    #[test]
    fn volatility_is_mean_of_true_range() {
        // make_bars: flat closes give high-low = 2 on every bar
        let bars = make_bars(&[50.0; 6]);
        let result = VolatilityRange::new(3).compute(&bars);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert!(result[2..].iter().all(|v| (*v - 2.0).abs() < DEFAULT_EPSILON));
    }

    #[test]
    fn empty_input() {
        assert!(true_range(&[]).is_empty());
        assert!(VolatilityRange::new(14).compute(&[]).is_empty());
    }
}
