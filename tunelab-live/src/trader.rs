//! Live trading loop.
//!
//! One cycle, strictly sequential:
//! 1. Fetch recent bars through the retry policy
//! 2. Compute frames and the signal for the last bar with the position flag
//! 3. Act on the signal through the execution venue
//! 4. Check for published parameter changes
//!
//! Data failures and short history degrade to HOLD. Venue failures leave the
//! position unchanged and are retried on the next bar's signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use tunelab_core::data::{fetch_sanitized, DataError, MarketDataProvider};
use tunelab_core::domain::{ParamError, ParameterSet, Signal};
use tunelab_core::record::{FileRecordStore, RecordKey, RecordStore, StoreError};
use tunelab_core::retry::RetryPolicy;
use tunelab_core::strategy::Strategy;
use tunelab_runner::{sleep_interruptible, TunerConfig};

use crate::clock::after_cycle;
use crate::reload::{HotReloader, ReloadOutcome};
use crate::state::{PositionState, StrategyState};
use crate::venue::{ExecutionVenue, Fill, Side, VenueError};

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("no published record for {key} and no fallback parameters configured")]
    NoParameters { key: RecordKey },

    #[error("startup parameters: {0}")]
    Params(#[from] ParamError),

    #[error("record store: {0}")]
    Store(#[from] StoreError),

    #[error("market data: {0}")]
    Data(#[from] DataError),

    #[error("venue: {0}")]
    Venue(#[from] VenueError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    None,
    Entered(Fill),
    Exited(Fill),
    /// The venue refused or failed; position unchanged.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveCycle {
    pub bar_time: Option<DateTime<Utc>>,
    pub signal: Signal,
    pub action: TradeAction,
    pub reload: ReloadOutcome,
}

#[derive(Debug, Clone)]
pub struct TraderSettings {
    pub boot_bars: usize,
    pub order_quantity: f64,
    pub sleep_buffer: Duration,
    pub retry: RetryPolicy,
}

impl TraderSettings {
    pub fn from_config(config: &TunerConfig) -> Self {
        Self {
            boot_bars: config.live.boot_bars,
            order_quantity: config.live.order_quantity,
            sleep_buffer: config.live.sleep_buffer(),
            retry: config.retry_policy(),
        }
    }
}

pub struct LiveTrader {
    key: RecordKey,
    provider: Box<dyn MarketDataProvider>,
    venue: Box<dyn ExecutionVenue>,
    reloader: HotReloader,
    state: StrategyState,
    settings: TraderSettings,
}

impl LiveTrader {
    /// Start from the published record if there is one, else from `fallback`.
    pub fn start(
        key: RecordKey,
        store: Arc<dyn RecordStore>,
        provider: Box<dyn MarketDataProvider>,
        venue: Box<dyn ExecutionVenue>,
        fallback: Option<ParameterSet>,
        cooldown_bars: u32,
        settings: TraderSettings,
    ) -> Result<Self, LiveError> {
        let published = match store.get(&key) {
            Ok(found) => found,
            Err(e) if e.is_parse() => {
                tracing::warn!(%key, error = %e, "published record unreadable at startup");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut reloader = HotReloader::new(store, key.clone(), cooldown_bars);
        let state = match published {
            Some(found) => {
                let state = StrategyState::new(found.record.params.clone())?;
                reloader.mark_started(&state, Some(found.version));
                tracing::info!(%key, params = %state.params(), "starting with published parameters");
                state
            }
            None => {
                let params = fallback.ok_or_else(|| LiveError::NoParameters { key: key.clone() })?;
                let state = StrategyState::new(params)?;
                reloader.mark_started(&state, None);
                tracing::info!(%key, params = %state.params(), "no published record, starting with fallback parameters");
                state
            }
        };

        Ok(Self {
            key,
            provider,
            venue,
            reloader,
            state,
            settings,
        })
    }

    /// Wire a trader from configuration with the given venue.
    pub fn from_config(config: &TunerConfig, venue: Box<dyn ExecutionVenue>) -> Result<Self, LiveError> {
        let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(config.publish.dir.clone()));
        Self::start(
            config.record_key(),
            store,
            config.market.source.build()?,
            venue,
            config.live.fallback.clone(),
            config.live.cooldown_bars,
            TraderSettings::from_config(config),
        )
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> LiveCycle {
        let (bar_time, signal, action) = self.decide_and_act();
        let reload = self.reloader.check(&mut self.state, now);
        LiveCycle {
            bar_time,
            signal,
            action,
            reload,
        }
    }

    fn decide_and_act(&mut self) -> (Option<DateTime<Utc>>, Signal, TradeAction) {
        let fetched = self.settings.retry.run("fetch_price_history", || {
            fetch_sanitized(
                self.provider.as_ref(),
                &self.key.symbol,
                self.key.timeframe,
                self.settings.boot_bars,
            )
        });
        let bars = match fetched {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "market data unavailable, holding");
                return (None, Signal::hold("data_unavailable"), TradeAction::None);
            }
        };
        let Some(last) = bars.last() else {
            return (None, Signal::hold("no_data"), TradeAction::None);
        };
        let bar_time = Some(last.timestamp);

        let strategy = self.state.strategy();
        if bars.len() <= strategy.warmup_bars() {
            tracing::debug!(key = %self.key, bars = bars.len(), warmup = strategy.warmup_bars(), "history too short");
            return (bar_time, Signal::hold("insufficient_history"), TradeAction::None);
        }
        if !self.state.begin_bar(last.timestamp) {
            return (bar_time, Signal::hold("bar_already_processed"), TradeAction::None);
        }

        let strategy = self.state.strategy();
        let frames = strategy.frames(&bars);
        let signal = strategy.evaluate(&frames, frames.len() - 1, self.state.in_position());
        self.venue.observe(last);

        let action = match (&self.state.position(), signal.is_entry(), signal.is_exit()) {
            (PositionState::Flat, true, _) => self.enter(last.timestamp),
            (PositionState::Long { quantity, .. }, _, true) => self.exit(*quantity),
            _ => TradeAction::None,
        };
        tracing::debug!(key = %self.key, %signal, close = last.close, "bar evaluated");
        (bar_time, signal, action)
    }

    fn enter(&mut self, at: DateTime<Utc>) -> TradeAction {
        match self.venue.place_order(Side::Buy, self.settings.order_quantity) {
            Ok(fill) => {
                self.state.enter(fill.avg_price, fill.filled_quantity, at);
                tracing::info!(
                    key = %self.key,
                    venue = self.venue.name(),
                    price = fill.avg_price,
                    quantity = fill.filled_quantity,
                    fee = fill.fee,
                    "entered long"
                );
                TradeAction::Entered(fill)
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "entry order failed");
                TradeAction::Failed(e.to_string())
            }
        }
    }

    fn exit(&mut self, quantity: f64) -> TradeAction {
        match self.venue.place_order(Side::Sell, quantity) {
            Ok(fill) => {
                let closed = self.state.exit();
                let pnl = match closed {
                    Some(PositionState::Long { entry_price, .. }) if entry_price > 0.0 => {
                        (fill.avg_price - entry_price) / entry_price
                    }
                    _ => 0.0,
                };
                tracing::info!(
                    key = %self.key,
                    venue = self.venue.name(),
                    price = fill.avg_price,
                    quantity = fill.filled_quantity,
                    fee = fill.fee,
                    pnl,
                    "exited long"
                );
                TradeAction::Exited(fill)
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "exit order failed");
                TradeAction::Failed(e.to_string())
            }
        }
    }

    /// Run until cancelled or `max_cycles` is reached, sleeping to the next
    /// bar boundary between cycles. Returns the number of cycles run.
    pub fn run(&mut self, cancel: &AtomicBool, max_cycles: Option<usize>) -> usize {
        let mut cycles = 0;
        while !cancel.load(Ordering::Relaxed) {
            let started = Utc::now();
            let cycle = self.run_cycle(started);
            if cycle.reload.is_applied() {
                tracing::info!(key = %self.key, params = %self.state.params(), "now trading with reloaded parameters");
            }
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            let wait = after_cycle(started, Utc::now(), self.key.timeframe, self.settings.sleep_buffer);
            if !sleep_interruptible(wait, cancel) {
                break;
            }
        }
        cycles
    }
}
