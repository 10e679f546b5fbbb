//! Seeded random-walk bars.
//!
//! The seed is derived from (symbol, timeframe, seed) with blake3, so the same
//! request always produces the same series. Bars end at a fixed anchor time.

use super::provider::{DataError, MarketDataProvider};
use crate::domain::{PriceBar, Timeframe};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    start_price: f64,
    drift: f64,
    volatility: f64,
    end: Option<DateTime<Utc>>,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: 20_000.0,
            drift: 0.0002,
            volatility: 0.01,
            end: None,
        }
    }
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Per-bar mean log return and half-width of the uniform shock.
    pub fn with_dynamics(mut self, drift: f64, volatility: f64) -> Self {
        self.drift = drift;
        self.volatility = volatility.abs();
        self
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    /// Timestamp of the last bar. Defaults to the current bar boundary.
    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    fn rng_for(&self, symbol: &str, timeframe: Timeframe) -> StdRng {
        let key = format!("{symbol}|{}|{}", timeframe.label(), self.seed);
        StdRng::from_seed(*blake3::hash(key.as_bytes()).as_bytes())
    }

    /// Generate `count` bars for the request.
    pub fn generate(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Vec<PriceBar> {
        let step = timeframe.seconds() as i64;
        let end = self.end.unwrap_or_else(|| {
            let now = Utc::now().timestamp();
            DateTime::from_timestamp(now - now.rem_euclid(step), 0).unwrap_or_else(Utc::now)
        });
        let mut rng = self.rng_for(symbol, timeframe);
        let mut close = self.start_price;

        (0..count)
            .map(|i| {
                let bars_before_end = (count - 1 - i) as i64;
                let timestamp = end - chrono::Duration::seconds(step * bars_before_end);
                let open = close;
                let shock: f64 = rng.gen_range(-1.0..1.0);
                close = open * (self.drift + self.volatility * shock).exp();
                let wick_up: f64 = rng.gen_range(0.0..0.5);
                let wick_down: f64 = rng.gen_range(0.0..0.5);
                PriceBar {
                    timestamp,
                    open,
                    high: open.max(close) * (1.0 + self.volatility * wick_up),
                    low: open.min(close) * (1.0 - self.volatility * wick_down),
                    close,
                    volume: rng.gen_range(1.0..100.0),
                }
            })
            .collect()
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn get_price_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PriceBar>, DataError> {
        Ok(self.generate(symbol, timeframe, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn provider() -> SyntheticProvider {
        SyntheticProvider::new(7).ending_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn deterministic_per_request() {
        let tf: Timeframe = "1h".parse().unwrap();
        let a = provider().generate("BTCUSDT", tf, 300);
        let b = provider().generate("BTCUSDT", tf, 300);
        assert_eq!(a, b);
        let c = provider().generate("ETHUSDT", tf, 300);
        assert_ne!(a, c);
    }

    #[test]
    fn bars_are_sane_and_spaced() {
        let tf: Timeframe = "15m".parse().unwrap();
        let bars = provider().generate("BTCUSDT", tf, 200);
        assert_eq!(bars.len(), 200);
        assert!(bars.iter().all(PriceBar::is_sane));
        assert!(bars.windows(2).all(|w| (w[1].timestamp - w[0].timestamp).num_seconds() == 900));
        assert_eq!(
            bars.last().unwrap().timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn zero_count_is_empty() {
        assert!(provider().generate("X", "1d".parse().unwrap(), 0).is_empty());
    }
}
