//! Market data boundary.
//!
//! - `MarketDataProvider` trait and `DataError`
//! - `BinanceProvider`: public klines REST endpoint, paginated backwards
//! - `CsvProvider`: local OHLCV file
//! - `SyntheticProvider`: seeded random walk for dry runs and tests
//!
//! Providers don't retry and don't sanitize beyond their own parsing; callers
//! wrap them in a `RetryPolicy` and pass results through `sanitize_bars`.

pub mod binance;
pub mod csv_provider;
pub mod provider;
pub mod synthetic;

pub use binance::BinanceProvider;
pub use csv_provider::CsvProvider;
pub use provider::{fetch_sanitized, DataError, MarketDataProvider};
pub use synthetic::SyntheticProvider;
