//! Hot reload of the published parameters.
//!
//! Each cycle asks the store for the record version only. The record is read
//! and parsed when the version advanced, the position is FLAT and the
//! cooldown since the last applied change has elapsed. A read that fails is
//! retried next cycle; a record with the current signature is remembered so
//! the same file is not parsed again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use tunelab_core::domain::Signature;
use tunelab_core::record::{RecordKey, RecordStore, RecordVersion};

use crate::state::StrategyState;

#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// Version unchanged since the last look.
    Unchanged,
    /// New version, but the parameters are the ones already running.
    SameSignature,
    /// New version left for later because a position is open.
    Deferred,
    /// New version left for later because the last change is too recent.
    CoolingDown { remaining: Duration },
    /// The record could not be read or parsed; retried next cycle.
    Unreadable(String),
    /// The record parsed but its parameters do not bind to a strategy.
    Rejected(String),
    Applied { from: Signature, to: Signature },
}

impl ReloadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

pub struct HotReloader {
    store: Arc<dyn RecordStore>,
    key: RecordKey,
    cooldown: Duration,
    last_applied_signature: Option<Signature>,
    last_seen_version: Option<RecordVersion>,
    last_apply_time: Option<DateTime<Utc>>,
}

impl HotReloader {
    /// `cooldown_bars` is converted with the key's bar duration. Counts past
    /// `i32::MAX` saturate.
    pub fn new(store: Arc<dyn RecordStore>, key: RecordKey, cooldown_bars: u32) -> Self {
        let bars = i32::try_from(cooldown_bars).unwrap_or(i32::MAX);
        let cooldown = key.timeframe.chrono_duration() * bars;
        Self {
            store,
            key,
            cooldown,
            last_applied_signature: None,
            last_seen_version: None,
            last_apply_time: None,
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_applied_signature(&self) -> Option<&Signature> {
        self.last_applied_signature.as_ref()
    }

    /// Record the parameters the loop started with. A startup record does not
    /// start the cooldown.
    pub fn mark_started(&mut self, state: &StrategyState, version: Option<RecordVersion>) {
        self.last_applied_signature = Some(state.signature().clone());
        self.last_seen_version = version;
    }

    pub fn check(&mut self, state: &mut StrategyState, now: DateTime<Utc>) -> ReloadOutcome {
        let version = match self.store.version(&self.key) {
            Ok(Some(version)) => version,
            Ok(None) => return ReloadOutcome::Unchanged,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "record version unavailable");
                return ReloadOutcome::Unreadable(e.to_string());
            }
        };
        if self.last_seen_version.is_some_and(|seen| version <= seen) {
            return ReloadOutcome::Unchanged;
        }

        if state.in_position() {
            tracing::debug!(key = %self.key, "record changed while in position, deferring");
            return ReloadOutcome::Deferred;
        }
        if let Some(applied_at) = self.last_apply_time {
            let elapsed = now - applied_at;
            if elapsed < self.cooldown {
                return ReloadOutcome::CoolingDown {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        let found = match self.store.get(&self.key) {
            Ok(Some(found)) => found,
            Ok(None) => return ReloadOutcome::Unchanged,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "record unreadable, keeping current parameters");
                return ReloadOutcome::Unreadable(e.to_string());
            }
        };

        let incoming = found.record.computed_signature();
        if state.signature() == &incoming {
            self.last_seen_version = Some(found.version);
            self.last_applied_signature = Some(incoming);
            return ReloadOutcome::SameSignature;
        }

        let from = state.signature().clone();
        if let Err(e) = state.swap_params(found.record.params.clone()) {
            tracing::warn!(
                key = %self.key,
                params = %found.record.params,
                error = %e,
                "published parameters rejected, keeping current"
            );
            self.last_seen_version = Some(found.version);
            return ReloadOutcome::Rejected(e.to_string());
        }

        self.last_seen_version = Some(found.version);
        self.last_applied_signature = Some(incoming.clone());
        self.last_apply_time = Some(now);
        tracing::info!(
            key = %self.key,
            from = from.short(),
            to = incoming.short(),
            params = %state.params(),
            source = %found.record.source,
            "parameters reloaded"
        );
        ReloadOutcome::Applied { from, to: incoming }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tunelab_core::domain::ParameterSet;
    use tunelab_core::engine::PerformanceMetrics;
    use tunelab_core::record::{ActiveParameterRecord, FileRecordStore, RecordSource};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn key() -> RecordKey {
        RecordKey::new("BTCUSDT", "15m".parse().unwrap())
    }

    fn params(buy: f64) -> ParameterSet {
        ParameterSet::new("rsi_sma")
            .with("rsi_period", 14.0)
            .with("sma_period", 20.0)
            .with("rsi_buy", buy)
            .with("rsi_sell", 65.0)
    }

    fn publish(store: &FileRecordStore, buy: f64) -> RecordVersion {
        let record = ActiveParameterRecord::new(
            "BTCUSDT",
            "15m".parse().unwrap(),
            params(buy),
            PerformanceMetrics::zero(),
            t0(),
            t0(),
            None,
            RecordSource::Promotion,
        );
        // Distinct mtimes on coarse filesystems.
        std::thread::sleep(std::time::Duration::from_millis(15));
        store.put(&key(), &record).unwrap()
    }

    fn setup(cooldown_bars: u32) -> (tempfile::TempDir, FileRecordStore, HotReloader, StrategyState) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::new(dir.path());
        let version = publish(&store, 35.0);
        let state = StrategyState::new(params(35.0)).unwrap();
        let mut reloader = HotReloader::new(Arc::new(store.clone()), key(), cooldown_bars);
        reloader.mark_started(&state, Some(version));
        (dir, store, reloader, state)
    }

    #[test]
    fn applies_changed_signature_once() {
        let (_dir, store, mut reloader, mut state) = setup(0);
        assert_eq!(reloader.check(&mut state, t0()), ReloadOutcome::Unchanged);

        publish(&store, 30.0);
        let outcome = reloader.check(&mut state, t0());
        assert!(outcome.is_applied());
        assert_eq!(state.params().get("rsi_buy"), Some(30.0));
        assert_eq!(reloader.check(&mut state, t0()), ReloadOutcome::Unchanged);
    }

    #[test]
    fn same_signature_rewrite_is_a_no_op() {
        let (_dir, store, mut reloader, mut state) = setup(0);
        publish(&store, 35.0);
        assert_eq!(reloader.check(&mut state, t0()), ReloadOutcome::SameSignature);
        assert_eq!(reloader.check(&mut state, t0()), ReloadOutcome::Unchanged);
    }

    #[test]
    fn defers_while_long_then_applies_when_flat() {
        let (_dir, store, mut reloader, mut state) = setup(0);
        state.enter(100.0, 1.0, t0());
        publish(&store, 30.0);
        assert_eq!(reloader.check(&mut state, t0()), ReloadOutcome::Deferred);
        assert_eq!(state.params().get("rsi_buy"), Some(35.0));

        state.exit();
        assert!(reloader.check(&mut state, t0()).is_applied());
        assert_eq!(state.params().get("rsi_buy"), Some(30.0));
    }

    #[test]
    fn cooldown_spaces_out_changes() {
        let (_dir, store, mut reloader, mut state) = setup(3);
        assert_eq!(reloader.cooldown(), Duration::minutes(45));

        publish(&store, 30.0);
        assert!(reloader.check(&mut state, t0()).is_applied());

        publish(&store, 40.0);
        let later = t0() + Duration::minutes(15);
        assert_eq!(
            reloader.check(&mut state, later),
            ReloadOutcome::CoolingDown {
                remaining: Duration::minutes(30)
            }
        );
        assert!(reloader.check(&mut state, t0() + Duration::minutes(45)).is_applied());
        assert_eq!(state.params().get("rsi_buy"), Some(40.0));
    }

    #[test]
    fn unreadable_record_is_retried() {
        let (_dir, store, mut reloader, mut state) = setup(0);
        std::thread::sleep(std::time::Duration::from_millis(15));
        std::fs::write(store.path_for(&key()), b"{\"symbol\": \"BTC").unwrap();
        assert!(matches!(
            reloader.check(&mut state, t0()),
            ReloadOutcome::Unreadable(_)
        ));
        assert_eq!(state.params().get("rsi_buy"), Some(35.0));

        publish(&store, 30.0);
        assert!(reloader.check(&mut state, t0()).is_applied());
    }

    #[test]
    fn oversized_cooldown_saturates_instead_of_wrapping() {
        let (_dir, _store, reloader, _state) = setup(u32::MAX);
        assert_eq!(reloader.cooldown(), Duration::minutes(15) * i32::MAX);
        assert!(reloader.cooldown() > Duration::zero());
    }

    #[test]
    fn oversized_published_period_is_rejected() {
        let (_dir, store, mut reloader, mut state) = setup(0);
        let record = ActiveParameterRecord::new(
            "BTCUSDT",
            "15m".parse().unwrap(),
            params(30.0).with("rsi_period", 1e30),
            PerformanceMetrics::zero(),
            t0(),
            t0(),
            None,
            RecordSource::Promotion,
        );
        std::thread::sleep(std::time::Duration::from_millis(15));
        store.put(&key(), &record).unwrap();

        assert!(matches!(reloader.check(&mut state, t0()), ReloadOutcome::Rejected(_)));
        assert_eq!(state.params().get("rsi_period"), Some(14.0));
    }

    #[test]
    fn invalid_published_params_are_rejected_once() {
        let (_dir, store, mut reloader, mut state) = setup(0);
        publish(&store, 80.0);
        assert!(matches!(reloader.check(&mut state, t0()), ReloadOutcome::Rejected(_)));
        assert_eq!(reloader.check(&mut state, t0()), ReloadOutcome::Unchanged);
        assert_eq!(state.params().get("rsi_buy"), Some(35.0));
    }
}
