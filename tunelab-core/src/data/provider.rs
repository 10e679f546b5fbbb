//! Data provider trait and structured error types.

use crate::domain::{sanitize_bars, PriceBar, Timeframe};
use crate::retry::Transient;
use std::time::Duration;
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no bars returned for {symbol} {timeframe}")]
    Empty { symbol: String, timeframe: String },

    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("validation error: {0}")]
    ValidationError(String),
}

impl Transient for DataError {
    fn is_transient(&self) -> bool {
        match self {
            Self::NetworkUnreachable(_) | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }
}

/// Source of recent OHLCV history.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Up to `count` most recent bars, oldest first.
    fn get_price_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PriceBar>, DataError>;
}

/// Fetch, sanitize and trim to the last `count` bars.
pub fn fetch_sanitized(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    timeframe: Timeframe,
    count: usize,
) -> Result<Vec<PriceBar>, DataError> {
    let raw = provider.get_price_history(symbol, timeframe, count)?;
    let fetched = raw.len();
    let mut bars = sanitize_bars(raw);
    if bars.len() < fetched {
        tracing::debug!(
            provider = provider.name(),
            dropped = fetched - bars.len(),
            "sanitize dropped bars"
        );
    }
    if bars.len() > count {
        bars.drain(..bars.len() - count);
    }
    Ok(bars)
}
