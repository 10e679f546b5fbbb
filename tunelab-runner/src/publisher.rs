//! Publisher: the single writer of the ActiveParameterRecord.
//!
//! Promotion rule, evaluated against the currently published record:
//! 1. No record (or an unparsable one) → publish as `bootstrap`.
//! 2. Record older than the staleness window → publish as `stale_refresh`.
//! 3. Different signature and the candidate passes the gate → `promotion`.
//! 4. Otherwise retain the current record and say why.
//!
//! Every publication appends one entry to the promotion history.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tunelab_core::domain::{ParameterSet, Signature};
use tunelab_core::engine::PerformanceMetrics;
use tunelab_core::record::{
    ActiveParameterRecord, RecordKey, RecordSource, RecordStore, RecordVersion, StoreError,
};

use crate::gate::{GateFailure, GateVerdict, QualityGate};
use crate::history::{HistoryEntry, PromotionHistory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Directory holding the record, history and ranked table.
    pub dir: PathBuf,
    /// A record older than this is replaced regardless of the gate.
    pub staleness_hours: f64,
    /// Re-optimization interval.
    pub every_hours: f64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            staleness_hours: 48.0,
            every_hours: 12.0,
        }
    }
}

impl PublishConfig {
    pub fn staleness(&self) -> Duration {
        Duration::milliseconds((self.staleness_hours * 3_600_000.0) as i64)
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64((self.every_hours * 3_600.0).max(0.0))
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record published but history append to {path} failed: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The top-ranked candidate of one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub params: ParameterSet,
    pub metrics: PerformanceMetrics,
    /// Timestamp of the last bar the candidate was scored on.
    pub data_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetainReason {
    SameSignature,
    GateFailed(Vec<GateFailure>),
}

impl std::fmt::Display for RetainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameSignature => f.write_str("candidate has the published signature"),
            Self::GateFailed(failures) => {
                f.write_str("gate failed: ")?;
                let verdict = GateVerdict {
                    failures: failures.clone(),
                };
                write!(f, "{verdict}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromotionDecision {
    Published {
        source: RecordSource,
        signature: Signature,
        version: RecordVersion,
    },
    Retained {
        reason: RetainReason,
        current: Signature,
    },
}

impl PromotionDecision {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// What to do, before any I/O. Pure.
pub fn decide(
    current: Option<&ActiveParameterRecord>,
    candidate_signature: &Signature,
    verdict: &GateVerdict,
    staleness: Duration,
    now: DateTime<Utc>,
) -> Result<RecordSource, RetainReason> {
    let Some(current) = current else {
        return Ok(RecordSource::Bootstrap);
    };
    if current.is_stale(now, staleness) {
        return Ok(RecordSource::StaleRefresh);
    }
    if current.content_signature == *candidate_signature {
        return Err(RetainReason::SameSignature);
    }
    if !verdict.passed() {
        return Err(RetainReason::GateFailed(verdict.failures.clone()));
    }
    Ok(RecordSource::Promotion)
}

pub struct Publisher {
    store: Arc<dyn RecordStore>,
    history: PromotionHistory,
    gate: QualityGate,
    staleness: Duration,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        history: PromotionHistory,
        gate: QualityGate,
        staleness: Duration,
    ) -> Self {
        Self {
            store,
            history,
            gate,
            staleness,
        }
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub fn history(&self) -> &PromotionHistory {
        &self.history
    }

    /// Current record, treating an unparsable one as absent.
    fn current(&self, key: &RecordKey) -> Result<Option<ActiveParameterRecord>, StoreError> {
        match self.store.get(key) {
            Ok(found) => Ok(found.map(|v| v.record)),
            Err(e) if e.is_parse() => {
                tracing::warn!(%key, error = %e, "published record is unreadable, treating as absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the promotion rule for `candidate` and write if it says so.
    pub fn publish(
        &self,
        key: &RecordKey,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<PromotionDecision, PublishError> {
        let current = self.current(key)?;
        let signature = candidate.params.signature();
        let verdict = self.gate.evaluate(&candidate.metrics);

        let source = match decide(current.as_ref(), &signature, &verdict, self.staleness, now) {
            Ok(source) => source,
            Err(reason) => {
                let current_sig = current
                    .map(|r| r.content_signature)
                    .unwrap_or_else(|| signature.clone());
                tracing::warn!(
                    %key,
                    candidate = %candidate.params,
                    current = current_sig.short(),
                    %reason,
                    "candidate retained, active record unchanged"
                );
                return Ok(PromotionDecision::Retained {
                    reason,
                    current: current_sig,
                });
            }
        };

        let record = ActiveParameterRecord::new(
            key.symbol.clone(),
            key.timeframe,
            candidate.params.clone(),
            candidate.metrics,
            candidate.data_end,
            now,
            Some(self.gate.snapshot(&verdict)),
            source,
        );
        let version = self.store.put(key, &record)?;
        tracing::info!(
            %key,
            %source,
            params = %record.params,
            signature = record.content_signature.short(),
            total_return = record.metrics.total_return,
            sharpe = record.metrics.annualized_sharpe,
            max_drawdown = record.metrics.max_drawdown,
            gate = %verdict,
            "active parameters published"
        );

        let previous = current.map(|r| r.content_signature);
        self.history
            .append(&HistoryEntry::from_record(&record, previous))
            .map_err(|source| PublishError::History {
                path: self.history.path().to_path_buf(),
                source,
            })?;

        Ok(PromotionDecision::Published {
            source,
            signature: record.content_signature,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tunelab_core::record::FileRecordStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn key() -> RecordKey {
        RecordKey::new("BTCUSDT", "15m".parse().unwrap())
    }

    fn candidate(buy: f64, ret: f64) -> Candidate {
        Candidate {
            params: ParameterSet::new("rsi_sma")
                .with("rsi_period", 14.0)
                .with("sma_period", 20.0)
                .with("rsi_buy", buy)
                .with("rsi_sell", 65.0),
            metrics: PerformanceMetrics {
                total_return: ret,
                annualized_sharpe: 1.0,
                max_drawdown: -0.05,
                ..PerformanceMetrics::zero()
            },
            data_end: now() - Duration::minutes(15),
        }
    }

    fn publisher(dir: &std::path::Path) -> Publisher {
        Publisher::new(
            Arc::new(FileRecordStore::new(dir)),
            PromotionHistory::for_key(dir, &key()),
            QualityGate::default(),
            Duration::hours(48),
        )
    }

    #[test]
    fn decide_covers_each_branch() {
        let gate = QualityGate::default();
        let passing = gate.evaluate(&candidate(30.0, 0.1).metrics);
        let failing = gate.evaluate(&candidate(30.0, -0.1).metrics);
        let window = Duration::hours(48);
        let published = ActiveParameterRecord::new(
            "BTCUSDT",
            "15m".parse().unwrap(),
            candidate(35.0, 0.1).params,
            PerformanceMetrics::zero(),
            now(),
            now(),
            None,
            RecordSource::Bootstrap,
        );
        let same = published.content_signature.clone();
        let other = candidate(30.0, 0.1).params.signature();

        assert_eq!(decide(None, &other, &failing, window, now()), Ok(RecordSource::Bootstrap));
        assert_eq!(
            decide(Some(&published), &same, &failing, window, now() + Duration::hours(49)),
            Ok(RecordSource::StaleRefresh)
        );
        assert_eq!(
            decide(Some(&published), &same, &passing, window, now()),
            Err(RetainReason::SameSignature)
        );
        assert!(matches!(
            decide(Some(&published), &other, &failing, window, now()),
            Err(RetainReason::GateFailed(_))
        ));
        assert_eq!(
            decide(Some(&published), &other, &passing, window, now()),
            Ok(RecordSource::Promotion)
        );
    }

    #[test]
    fn bootstrap_ignores_gate_and_writes_history() {
        let dir = tempfile::tempdir().unwrap();
        let p = publisher(dir.path());
        let decision = p.publish(&key(), &candidate(30.0, -0.5), now()).unwrap();
        assert!(matches!(
            decision,
            PromotionDecision::Published {
                source: RecordSource::Bootstrap,
                ..
            }
        ));

        let stored = FileRecordStore::new(dir.path()).get(&key()).unwrap().unwrap();
        assert_eq!(stored.record.params, candidate(30.0, -0.5).params);
        assert!(!stored.record.gate.as_ref().unwrap().passed);

        let history = p.history().read_all().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_signature, None);
    }

    #[test]
    fn promotion_links_previous_signature() {
        let dir = tempfile::tempdir().unwrap();
        let p = publisher(dir.path());
        p.publish(&key(), &candidate(30.0, 0.1), now()).unwrap();
        let decision = p
            .publish(&key(), &candidate(35.0, 0.2), now() + Duration::hours(1))
            .unwrap();
        assert!(decision.is_published());

        let history = p.history().read_all().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].source, RecordSource::Promotion);
        assert_eq!(
            history[1].previous_signature,
            Some(candidate(30.0, 0.1).params.signature())
        );
    }

    #[test]
    fn unparsable_record_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::new(dir.path());
        std::fs::write(store.path_for(&key()), b"{ not json").unwrap();

        let decision = publisher(dir.path())
            .publish(&key(), &candidate(30.0, 0.1), now())
            .unwrap();
        assert!(matches!(
            decision,
            PromotionDecision::Published {
                source: RecordSource::Bootstrap,
                ..
            }
        ));
        assert!(store.get(&key()).is_ok());
    }

    #[test]
    fn staleness_window_from_hours() {
        let cfg = PublishConfig {
            staleness_hours: 1.5,
            ..PublishConfig::default()
        };
        assert_eq!(cfg.staleness(), Duration::minutes(90));
        assert_eq!(cfg.interval(), std::time::Duration::from_secs(12 * 3_600));
    }
}
