//! PriceBar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for one fixed interval of the traded symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Returns true if any price field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: positive prices, high >= low, non-negative volume.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.open > 0.0
            && self.close > 0.0
            && self.low > 0.0
            && self.volume >= 0.0
    }
}

/// Validate, sort and deduplicate a raw bar series.
///
/// - Bars failing [`PriceBar::is_sane`] are dropped.
/// - Output is sorted by timestamp ascending.
/// - When two bars share a timestamp, the one that appeared later in the input wins.
pub fn sanitize_bars(bars: Vec<PriceBar>) -> Vec<PriceBar> {
    let mut sane: Vec<PriceBar> = bars.into_iter().filter(PriceBar::is_sane).collect();
    // Stable sort keeps input order among equal timestamps, so "last" is preserved.
    sane.sort_by_key(|b| b.timestamp);

    let mut out: Vec<PriceBar> = Vec::with_capacity(sane.len());
    for bar in sane {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// Extract the close series.
pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
