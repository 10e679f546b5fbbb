//! Exponential Moving Average (EMA), used as the long-horizon trend reference.
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2/(span+1)
//! Seed: EMA[span-1] = SMA of first `span` close values.
//! Lookback: span - 1.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    name: String,
}

impl Ema {
    /// A span of 0 is treated as 1.
    pub fn new(span: usize) -> Self {
        let span = span.max(1);
        Self {
            span,
            name: format!("ema_{span}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.span - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.span)
    }
}

/// EMA of a pre-extracted series. A NaN taints every value after it.
pub fn ema_of_series(values: &[f64], span: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if span == 0 || n < span {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);

    let seed_window = &values[..span];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = seed_window.iter().sum::<f64>() / span as f64;
    result[span - 1] = seed;

    let mut prev = seed;
    for i in span..n {
        if values[i].is_nan() {
            break;
        }
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}
