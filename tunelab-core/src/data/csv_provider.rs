//! Local CSV file provider.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. Only `timestamp`
//! and `close` are required; missing open/high/low default to close and a
//! missing volume to 0. Timestamps may be RFC 3339, `YYYY-MM-DD HH:MM:SS`
//! (UTC), or unix seconds / milliseconds.

use super::provider::{DataError, MarketDataProvider};
use crate::domain::{PriceBar, Timeframe};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: f64,
    volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CsvProvider {
    path: PathBuf,
}

impl CsvProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row in file order.
    pub fn read_all(&self) -> Result<Vec<PriceBar>, DataError> {
        let io_err = |reason: String| DataError::Io {
            path: self.path.display().to_string(),
            reason,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| io_err(e.to_string()))?;

        let mut bars = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| io_err(format!("row {}: {e}", line + 1)))?;
            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| {
                DataError::ValidationError(format!(
                    "row {}: unrecognized timestamp '{}'",
                    line + 1,
                    row.timestamp
                ))
            })?;
            bars.push(PriceBar {
                timestamp,
                open: row.open.unwrap_or(row.close),
                high: row.high.unwrap_or(row.close),
                low: row.low.unwrap_or(row.close),
                close: row.close,
                volume: row.volume.unwrap_or(0.0),
            });
        }
        Ok(bars)
    }
}

impl MarketDataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    /// The file holds one series; `symbol` and `timeframe` are not checked.
    fn get_price_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<PriceBar>, DataError> {
        let mut bars = self.read_all()?;
        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
                timeframe: timeframe.label(),
            });
        }
        if bars.len() > count {
            bars.drain(..bars.len() - count);
        }
        Ok(bars)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let n: i64 = raw.parse().ok()?;
    // Anything past ~5138 AD in seconds is taken as milliseconds.
    if n.abs() >= 100_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}
