//! Runtime state check: is the published record what the optimizer would
//! pick right now, and what does it signal on the latest bar?
//!
//! Read-only. Compares the active record against the exported ranked table:
//! the overall top row and the best row that passes the quality gate.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use tunelab_core::data::{fetch_sanitized, MarketDataProvider};
use tunelab_core::domain::{PriceBar, Signal, Timeframe};
use tunelab_core::indicators::IndicatorFrame;
use tunelab_core::record::{ActiveParameterRecord, RecordKey, RecordStore};
use tunelab_core::strategy::{Strategy, StrategyKind};

use crate::config::TunerConfig;
use crate::export::{read_ranked_table, table_path, TableRow};
use crate::gate::QualityGate;

/// How the active record relates to the ranked table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agreement {
    /// Active parameters are the best gate-passing row.
    GateTop,
    /// Active parameters are the overall top row (gate not passed).
    TableTop,
    Mismatch,
    /// Nothing to compare against.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct RuntimeReport {
    pub key: RecordKey,
    pub active: Option<ActiveParameterRecord>,
    pub bars: usize,
    pub first_bar: Option<DateTime<Utc>>,
    pub last_bar: Option<DateTime<Utc>>,
    /// Consecutive bars not exactly one timeframe apart.
    pub irregular_gaps: usize,
    pub last_frame: Option<IndicatorFrame>,
    /// Active strategy on the last bar, evaluated as if flat.
    pub last_signal: Option<Signal>,
    pub table_path: PathBuf,
    pub table_top: Option<TableRow>,
    pub gate_top: Option<TableRow>,
    pub agreement: Agreement,
}

pub fn count_irregular_gaps(bars: &[PriceBar], timeframe: Timeframe) -> usize {
    let step = timeframe.seconds() as i64;
    bars.windows(2)
        .filter(|w| (w[1].timestamp - w[0].timestamp).num_seconds() != step)
        .count()
}

/// Build the report from already loaded inputs.
pub fn inspect(
    key: &RecordKey,
    active: Option<ActiveParameterRecord>,
    bars: &[PriceBar],
    rows: &[TableRow],
    gate: &QualityGate,
) -> RuntimeReport {
    let (last_frame, last_signal) = match &active {
        Some(record) => match StrategyKind::from_params(&record.params) {
            Ok(strategy) if !bars.is_empty() => {
                let frames = strategy.frames(bars);
                let last = frames.len() - 1;
                let signal = strategy.evaluate(&frames, last, false);
                (frames.into_iter().last(), Some(signal))
            }
            Ok(_) => (None, None),
            Err(e) => {
                tracing::warn!(%key, error = %e, "active parameters do not bind to a strategy");
                (None, None)
            }
        },
        None => (None, None),
    };

    let ranked = || rows.iter().filter(|r| r.rank.is_some());
    let table_top = ranked().next().cloned();
    let gate_top = ranked().find(|r| gate.evaluate(&r.metrics).passed()).cloned();

    let agreement = match &active {
        None => Agreement::Unknown,
        Some(record) => {
            let sig = &record.content_signature;
            let matches = |row: &Option<TableRow>| {
                row.as_ref().is_some_and(|r| r.params.signature() == *sig)
            };
            if matches(&gate_top) {
                Agreement::GateTop
            } else if matches(&table_top) {
                Agreement::TableTop
            } else if table_top.is_none() {
                Agreement::Unknown
            } else {
                Agreement::Mismatch
            }
        }
    };

    RuntimeReport {
        key: key.clone(),
        active,
        bars: bars.len(),
        first_bar: bars.first().map(|b| b.timestamp),
        last_bar: bars.last().map(|b| b.timestamp),
        irregular_gaps: count_irregular_gaps(bars, key.timeframe),
        last_frame,
        last_signal,
        table_path: PathBuf::new(),
        table_top,
        gate_top,
        agreement,
    }
}

/// Load the record, recent bars and the ranked table named by `config`.
pub fn verify(
    config: &TunerConfig,
    store: &dyn RecordStore,
    provider: &dyn MarketDataProvider,
) -> Result<RuntimeReport> {
    let key = config.record_key();
    let active = store
        .get(&key)
        .with_context(|| format!("reading active record for {key}"))?
        .map(|v| v.record);

    let bars = config
        .retry_policy()
        .run("fetch_price_history", || {
            fetch_sanitized(provider, &key.symbol, key.timeframe, config.live.boot_bars)
        })
        .context("fetching recent bars")?;

    let path = table_path(&config.publish.dir, &key);
    let rows = if path.exists() {
        read_ranked_table(&path)?
    } else {
        Vec::new()
    };

    let mut report = inspect(&key, active, &bars, &rows, &config.gate);
    report.table_path = path;
    Ok(report)
}

fn row_summary(row: &Option<TableRow>) -> String {
    match row {
        Some(r) => format!(
            "{} | return {:.4} sharpe {:.3} drawdown {:.4} trades {}",
            r.params,
            r.metrics.total_return,
            r.metrics.annualized_sharpe,
            r.metrics.max_drawdown,
            r.metrics.trade_count
        ),
        None => "none".to_string(),
    }
}

impl fmt::Display for RuntimeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runtime state for {}", self.key)?;
        writeln!(f, "{}", "─".repeat(60))?;
        match &self.active {
            Some(record) => {
                writeln!(f, "Active:      {}", record.params)?;
                writeln!(
                    f,
                    "             signature {} source {} generated {}",
                    record.content_signature.short(),
                    record.source,
                    record.generated_at.to_rfc3339()
                )?;
            }
            None => writeln!(f, "Active:      no published record")?,
        }

        match (self.first_bar, self.last_bar) {
            (Some(first), Some(last)) => writeln!(
                f,
                "Bars:        {} ({} → {}), irregular gaps {}",
                self.bars,
                first.to_rfc3339(),
                last.to_rfc3339(),
                self.irregular_gaps
            )?,
            _ => writeln!(f, "Bars:        none")?,
        }

        if let Some(frame) = &self.last_frame {
            writeln!(
                f,
                "Last bar:    close {:.2} average {:.2} oscillator {:.2} uptrend {}",
                frame.close(),
                frame.moving_average,
                frame.oscillator,
                frame.uptrend
            )?;
        }
        if let Some(signal) = &self.last_signal {
            writeln!(f, "Signal:      {signal} (as if flat)")?;
        }

        writeln!(f, "Table:       {}", self.table_path.display())?;
        writeln!(f, "  top:       {}", row_summary(&self.table_top))?;
        writeln!(f, "  gate top:  {}", row_summary(&self.gate_top))?;

        let verdict = match self.agreement {
            Agreement::GateTop => "in sync: active == best gate-passing row",
            Agreement::TableTop => "in sync: active == top row",
            Agreement::Mismatch => "OUT OF SYNC: active matches neither top row",
            Agreement::Unknown => "unknown: nothing to compare",
        };
        write!(f, "Status:      {verdict}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tunelab_core::data::SyntheticProvider;
    use tunelab_core::domain::ParameterSet;
    use tunelab_core::engine::PerformanceMetrics;
    use tunelab_core::record::RecordSource;

    fn key() -> RecordKey {
        RecordKey::new("BTCUSDT", "1h".parse().unwrap())
    }

    fn params(buy: f64) -> ParameterSet {
        ParameterSet::new("rsi_sma")
            .with("rsi_period", 14.0)
            .with("sma_period", 20.0)
            .with("rsi_buy", buy)
            .with("rsi_sell", 65.0)
    }

    fn row(rank: usize, buy: f64, total_return: f64) -> TableRow {
        TableRow {
            rank: Some(rank),
            grid_index: rank,
            eligible: true,
            score: None,
            params: params(buy),
            metrics: PerformanceMetrics {
                total_return,
                annualized_sharpe: 1.0,
                max_drawdown: -0.05,
                ..PerformanceMetrics::zero()
            },
        }
    }

    fn record(buy: f64) -> ActiveParameterRecord {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        ActiveParameterRecord::new(
            "BTCUSDT",
            "1h".parse().unwrap(),
            params(buy),
            PerformanceMetrics::zero(),
            t,
            t,
            None,
            RecordSource::Bootstrap,
        )
    }

    fn bars() -> Vec<PriceBar> {
        SyntheticProvider::new(1)
            .ending_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
            .generate("BTCUSDT", "1h".parse().unwrap(), 300)
    }

    #[test]
    fn gate_top_skips_failing_rows() {
        // Top row has a negative return, so the gate picks the second.
        let rows = vec![row(1, 30.0, -0.02), row(2, 35.0, 0.04)];
        let report = inspect(&key(), Some(record(35.0)), &bars(), &rows, &QualityGate::default());
        assert_eq!(report.table_top.as_ref().unwrap().params, params(30.0));
        assert_eq!(report.gate_top.as_ref().unwrap().params, params(35.0));
        assert_eq!(report.agreement, Agreement::GateTop);
        assert!(report.last_signal.is_some());
        assert_eq!(report.irregular_gaps, 0);
    }

    #[test]
    fn mismatch_and_unknown() {
        let rows = vec![row(1, 30.0, 0.02)];
        let gate = QualityGate::default();
        assert_eq!(
            inspect(&key(), Some(record(40.0)), &bars(), &rows, &gate).agreement,
            Agreement::Mismatch
        );
        assert_eq!(inspect(&key(), None, &bars(), &rows, &gate).agreement, Agreement::Unknown);
        assert_eq!(
            inspect(&key(), Some(record(40.0)), &[], &[], &gate).agreement,
            Agreement::Unknown
        );
    }

    #[test]
    fn gaps_are_counted() {
        let mut series = bars();
        series.remove(100);
        series.remove(200);
        assert_eq!(count_irregular_gaps(&series, "1h".parse().unwrap()), 2);
    }

    #[test]
    fn display_mentions_status() {
        let report = inspect(&key(), Some(record(35.0)), &bars(), &[], &QualityGate::default());
        let text = report.to_string();
        assert!(text.contains("Runtime state for"));
        assert!(text.contains("unknown"));
    }
}
