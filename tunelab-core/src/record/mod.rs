//! ActiveParameterRecord: the published parameters for one (symbol, timeframe).
//!
//! One writer (the publisher) and any number of readers share a record
//! through a [`RecordStore`]. Readers compare `content_signature` to detect a
//! meaningful change; metrics and timestamps never enter the signature.

pub mod store;

pub use store::{FileRecordStore, RecordKey, RecordStore, RecordVersion, StoreError, VersionedRecord};

use crate::domain::{ParameterSet, Signature, Timeframe};
use crate::engine::PerformanceMetrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Why a record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// No usable record existed.
    Bootstrap,
    /// The existing record outlived the staleness window.
    StaleRefresh,
    /// A different candidate passed the quality gate.
    Promotion,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bootstrap => "bootstrap",
            Self::StaleRefresh => "stale_refresh",
            Self::Promotion => "promotion",
        };
        f.write_str(s)
    }
}

/// Gate thresholds and verdict at publication time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub min_total_return: f64,
    pub min_sharpe: f64,
    pub max_drawdown_magnitude: f64,
    pub passed: bool,
    #[serde(default)]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveParameterRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(flatten)]
    pub params: ParameterSet,
    pub metrics: PerformanceMetrics,
    /// Timestamp of the last bar the parameters were scored on.
    pub data_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub content_signature: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateSnapshot>,
    pub source: RecordSource,
}

impl ActiveParameterRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        params: ParameterSet,
        metrics: PerformanceMetrics,
        data_end: DateTime<Utc>,
        generated_at: DateTime<Utc>,
        gate: Option<GateSnapshot>,
        source: RecordSource,
    ) -> Self {
        let content_signature = params.signature();
        Self {
            symbol: symbol.into(),
            timeframe,
            params,
            metrics,
            data_end,
            generated_at,
            content_signature,
            gate,
            source,
        }
    }

    /// Signature recomputed from the parameters, ignoring the stored field.
    pub fn computed_signature(&self) -> Signature {
        self.params.signature()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.generated_at
    }

    /// Strictly older than `window`.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) > window
    }
}

#[cfg(test)]
pub(crate) fn sample_record(buy: f64) -> ActiveParameterRecord {
    use chrono::TimeZone;
    let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    ActiveParameterRecord::new(
        "BTCUSDT",
        "1h".parse().unwrap(),
        ParameterSet::new("rsi_sma")
            .with("rsi_period", 14.0)
            .with("sma_period", 20.0)
            .with("rsi_buy", buy)
            .with("rsi_sell", 65.0),
        PerformanceMetrics::zero(),
        t,
        t,
        None,
        RecordSource::Bootstrap,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_layout_is_flat() {
        let record = sample_record(35.0);
        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["strategy_name"], "rsi_sma");
        assert_eq!(value["parameters"]["rsi_buy"], 35.0);
        assert_eq!(value["timeframe"], "1h");
        assert_eq!(value["source"], "bootstrap");
        assert!(value.get("gate").is_none());
    }

    #[test]
    fn json_roundtrip_keeps_signature() {
        let record = sample_record(35.0);
        let json = serde_json::to_string_pretty(&record).unwrap();
        let back: ActiveParameterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.computed_signature(), record.content_signature);
    }

    #[test]
    fn signature_ignores_metadata() {
        let a = sample_record(35.0);
        let mut b = sample_record(35.0);
        b.generated_at = b.generated_at + Duration::hours(5);
        b.metrics.total_return = 0.5;
        b.source = RecordSource::Promotion;
        assert_eq!(a.content_signature, b.content_signature);
        assert_ne!(a.content_signature, sample_record(30.0).content_signature);
    }

    #[test]
    fn staleness_is_strict() {
        let record = sample_record(35.0);
        let window = Duration::hours(48);
        assert!(!record.is_stale(record.generated_at + window, window));
        assert!(record.is_stale(record.generated_at + window + Duration::seconds(1), window));
    }
}
