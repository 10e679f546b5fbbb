//! Binance spot klines provider.
//!
//! Requests at most 1000 klines per call and pages backwards with `endTime`
//! until `count` bars are collected or the exchange runs out of history.
//! The still-forming kline is dropped unless `include_unclosed` is set.

use super::provider::{DataError, MarketDataProvider};
use crate::domain::{PriceBar, Timeframe};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::time::Duration;

/// Exchange cap on klines per request.
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

pub struct BinanceProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    include_unclosed: bool,
}

impl BinanceProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.binance.com";

    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("tunelab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("HTTP client setup: {e}")))?;
        Ok(Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            include_unclosed: false,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn include_unclosed(mut self, include: bool) -> Self {
        self.include_unclosed = include;
        self
    }

    /// "btc/usdt" → "BTCUSDT".
    pub fn exchange_symbol(symbol: &str) -> String {
        symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    fn klines_url(&self, symbol: &str, interval: &str, limit: usize, end_time: Option<i64>) -> String {
        let mut url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}",
            self.base_url
        );
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={end}"));
        }
        url
    }

    fn fetch_page(&self, url: &str, symbol: &str) -> Result<Vec<Vec<Value>>, DataError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST && body.contains("Invalid symbol") {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            return Err(DataError::Http {
                status: status.as_u16(),
                body,
            });
        }

        resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("klines for {symbol} did not parse: {e}"))
        })
    }
}

impl MarketDataProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    fn get_price_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PriceBar>, DataError> {
        let exchange_symbol = Self::exchange_symbol(symbol);
        let interval = timeframe.label();
        let now_ms = Utc::now().timestamp_millis();
        let mut bars: Vec<PriceBar> = Vec::with_capacity(count);
        let mut end_time: Option<i64> = None;

        while bars.len() < count {
            let limit = (count - bars.len()).min(MAX_KLINES_PER_REQUEST);
            let url = self.klines_url(&exchange_symbol, &interval, limit, end_time);
            let rows = self.fetch_page(&url, symbol)?;
            let received = rows.len();
            if received == 0 {
                break;
            }

            let cutoff = if self.include_unclosed { None } else { Some(now_ms) };
            let page = parse_klines(&rows, cutoff)?;
            let earliest_ms = rows
                .first()
                .and_then(|row| row.first())
                .and_then(Value::as_i64)
                .ok_or_else(|| DataError::ResponseFormatChanged("kline without open time".into()))?;

            tracing::debug!(symbol = %exchange_symbol, %interval, received, "fetched klines page");

            let mut merged = page;
            merged.append(&mut bars);
            bars = merged;

            if received < limit {
                break;
            }
            end_time = Some(earliest_ms - 1);
        }

        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
                timeframe: interval,
            });
        }
        if bars.len() > count {
            bars.drain(..bars.len() - count);
        }
        Ok(bars)
    }
}

/// Parse raw kline rows:
/// `[open_time_ms, "open", "high", "low", "close", "volume", close_time_ms, ...]`.
/// Rows whose close time is after `closed_before_ms` are still forming and skipped.
pub fn parse_klines(rows: &[Vec<Value>], closed_before_ms: Option<i64>) -> Result<Vec<PriceBar>, DataError> {
    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() < 7 {
            return Err(DataError::ResponseFormatChanged(format!(
                "kline row has {} fields, expected at least 7",
                row.len()
            )));
        }
        let close_time = row[6].as_i64().ok_or_else(|| format_err("close_time", &row[6]))?;
        if closed_before_ms.is_some_and(|cutoff| close_time > cutoff) {
            continue;
        }
        let open_time = row[0].as_i64().ok_or_else(|| format_err("open_time", &row[0]))?;
        bars.push(PriceBar {
            timestamp: millis_to_utc(open_time)?,
            open: number(&row[1], "open")?,
            high: number(&row[2], "high")?,
            low: number(&row[3], "low")?,
            close: number(&row[4], "close")?,
            volume: number(&row[5], "volume")?,
        });
    }
    Ok(bars)
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, DataError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("timestamp {ms} out of range")))
}

/// Prices arrive as decimal strings; accept plain numbers too.
fn number(value: &Value, field: &str) -> Result<f64, DataError> {
    match value {
        Value::String(s) => s.parse().map_err(|_| format_err(field, value)),
        Value::Number(n) => n.as_f64().ok_or_else(|| format_err(field, value)),
        _ => Err(format_err(field, value)),
    }
}

fn format_err(field: &str, value: &Value) -> DataError {
    DataError::ResponseFormatChanged(format!("kline field {field} has unexpected value {value}"))
}
