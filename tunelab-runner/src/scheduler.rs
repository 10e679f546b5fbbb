//! Re-optimization loop.
//!
//! One cycle: fetch history (retry policy) → sanitize → optimize → write the
//! ranked table → publish. Cycles are independent; a failed cycle is logged
//! and the previously published record stays authoritative.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;

use tunelab_core::data::{fetch_sanitized, DataError, MarketDataProvider};
use tunelab_core::record::{FileRecordStore, RecordKey, RecordStore};
use tunelab_core::retry::RetryPolicy;

use crate::config::TunerConfig;
use crate::export::write_ranked_table;
use crate::grid::ParamGrid;
use crate::history::PromotionHistory;
use crate::optimizer::{OptimizeError, Optimizer};
use crate::publisher::{Candidate, PromotionDecision, PublishError, Publisher};
use crate::ranking::TopCandidate;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("market data: {0}")]
    Data(#[from] DataError),

    #[error("optimization: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("ranked table: {0:#}")]
    Export(anyhow::Error),

    #[error("publish: {0}")]
    Publish(#[from] PublishError),
}

/// Outcome of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub bars: usize,
    pub evaluated: usize,
    pub eligible: usize,
    pub table_path: PathBuf,
    /// `None` when no candidate met the trade-count floor.
    pub decision: Option<PromotionDecision>,
    pub elapsed: Duration,
}

pub struct Reoptimizer {
    provider: Box<dyn MarketDataProvider>,
    retry: RetryPolicy,
    key: RecordKey,
    history_bars: usize,
    grid: ParamGrid,
    optimizer: Optimizer,
    publisher: Publisher,
    dir: PathBuf,
    every: Duration,
}

impl Reoptimizer {
    /// Wire a re-optimizer from validated configuration and a data source.
    pub fn new(config: &TunerConfig, provider: Box<dyn MarketDataProvider>) -> Self {
        let dir = config.publish.dir.clone();
        let key = config.record_key();
        let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(dir.clone()));
        let publisher = Publisher::new(
            store,
            PromotionHistory::for_key(&dir, &key),
            config.gate,
            config.staleness(),
        );
        Self {
            provider,
            retry: config.retry_policy(),
            key,
            history_bars: config.market.history_bars,
            grid: config.grid.clone(),
            optimizer: Optimizer::new(config.optimizer.clone(), config.simulation_config()),
            publisher,
            dir,
            every: config.every(),
        }
    }

    /// Uses the data source named in the config.
    pub fn from_config(config: &TunerConfig) -> Result<Self, DataError> {
        let provider = config.market.source.build()?;
        Ok(Self::new(config, provider))
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let bars = self.retry.run("fetch_price_history", || {
            fetch_sanitized(
                self.provider.as_ref(),
                &self.key.symbol,
                self.key.timeframe,
                self.history_bars,
            )
        })?;
        tracing::debug!(key = %self.key, provider = self.provider.name(), bars = bars.len(), "history fetched");

        let table = self.optimizer.optimize(&bars, &self.grid)?;
        let table_path =
            write_ranked_table(&self.dir, &self.key, &table).map_err(CycleError::Export)?;

        let decision = match table.top() {
            TopCandidate::Selected(row) => {
                let data_end = bars.last().map(|b| b.timestamp).unwrap_or(now);
                let candidate = Candidate {
                    params: row.result.params.clone(),
                    metrics: row.result.metrics,
                    data_end,
                };
                Some(self.publisher.publish(&self.key, &candidate, now)?)
            }
            TopCandidate::NoViableCandidate { evaluated, min_trades } => {
                tracing::warn!(
                    key = %self.key,
                    evaluated,
                    min_trades,
                    "no candidate reached the trade floor, nothing published"
                );
                None
            }
        };

        Ok(CycleReport {
            bars: bars.len(),
            evaluated: table.len(),
            eligible: table.eligible_count(),
            table_path,
            decision,
            elapsed: started.elapsed(),
        })
    }

    /// Run cycles every `every_hours` until cancelled or `max_cycles` is
    /// reached. Returns the number of cycles run.
    pub fn run(&self, cancel: &AtomicBool, max_cycles: Option<usize>) -> usize {
        let mut cycles = 0;
        while !cancel.load(Ordering::Relaxed) {
            match self.run_cycle(Utc::now()) {
                Ok(report) => tracing::info!(
                    key = %self.key,
                    bars = report.bars,
                    evaluated = report.evaluated,
                    eligible = report.eligible,
                    published = report.decision.as_ref().is_some_and(PromotionDecision::is_published),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "re-optimization cycle complete"
                ),
                Err(e) => tracing::error!(key = %self.key, error = %e, "re-optimization cycle failed"),
            }
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            if !sleep_interruptible(self.every, cancel) {
                break;
            }
        }
        cycles
    }
}

const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Sleep for `duration`, waking early on cancellation.
/// Returns `false` if cancelled.
pub fn sleep_interruptible(duration: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSource;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use tunelab_core::data::SyntheticProvider;
    use tunelab_core::domain::{PriceBar, Timeframe};

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn config(dir: &std::path::Path) -> TunerConfig {
        let mut config = TunerConfig::for_market("BTCUSDT", "1h".parse().unwrap());
        config.market.history_bars = 600;
        config.market.source = DataSource::Synthetic { seed: 3 };
        config.publish.dir = dir.to_path_buf();
        config.optimizer.min_trades = 1;
        config.retry.initial_backoff_ms = 1;
        config
    }

    fn synthetic() -> Box<dyn MarketDataProvider> {
        Box::new(
            SyntheticProvider::new(3)
                .with_dynamics(0.0, 0.02)
                .ending_at(end()),
        )
    }

    #[test]
    fn first_cycle_bootstraps() {
        let dir = tempfile::tempdir().unwrap();
        let reopt = Reoptimizer::new(&config(dir.path()), synthetic());
        let report = reopt.run_cycle(end()).unwrap();
        assert_eq!(report.bars, 600);
        assert_eq!(report.evaluated, 81);
        assert!(report.table_path.exists());
        if report.eligible > 0 {
            assert!(report.decision.unwrap().is_published());
            let stored = FileRecordStore::new(dir.path()).get(reopt.key()).unwrap().unwrap();
            assert_eq!(stored.record.data_end, end());
        } else {
            assert!(report.decision.is_none());
        }
    }

    struct Flaky {
        calls: AtomicUsize,
    }

    impl MarketDataProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn get_price_history(&self, _: &str, _: Timeframe, _: usize) -> Result<Vec<PriceBar>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DataError::NetworkUnreachable("offline".into()))
        }
    }

    #[test]
    fn data_failure_is_reported_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Box::new(Flaky {
            calls: AtomicUsize::new(0),
        });
        let reopt = Reoptimizer::new(&config(dir.path()), provider);
        let err = reopt.run_cycle(end()).unwrap_err();
        assert!(matches!(err, CycleError::Data(DataError::NetworkUnreachable(_))));
        assert!(FileRecordStore::new(dir.path()).get(reopt.key()).unwrap().is_none());
    }

    #[test]
    fn run_stops_at_cycle_limit_and_survives_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.retry.max_attempts = 1;
        cfg.publish.every_hours = 1e-7;
        let reopt = Reoptimizer::new(
            &cfg,
            Box::new(Flaky {
                calls: AtomicUsize::new(0),
            }),
        );
        assert_eq!(reopt.run(&AtomicBool::new(false), Some(3)), 3);
    }

    #[test]
    fn cancelled_run_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reopt = Reoptimizer::new(&config(dir.path()), synthetic());
        assert_eq!(reopt.run(&AtomicBool::new(true), None), 0);
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let cancel = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_interruptible(Duration::from_secs(60), &cancel));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(sleep_interruptible(Duration::from_millis(5), &AtomicBool::new(false)));
    }
}
