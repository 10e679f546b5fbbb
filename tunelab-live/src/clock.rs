//! Wall-clock bar boundaries.
//!
//! Bars close on multiples of the timeframe since the Unix epoch (UTC). The
//! loop wakes a small buffer after the boundary so the exchange has closed
//! the bar. A cycle that runs past its wake-up time starts the next cycle
//! immediately; bars missed in between are not replayed.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tunelab_core::domain::Timeframe;

/// First bar boundary strictly after `now`.
pub fn next_boundary(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let step = timeframe.seconds().max(1) as i64;
    let ts = now.timestamp();
    let next = ts - ts.rem_euclid(step) + step;
    Utc.timestamp_opt(next, 0).single().unwrap_or(now)
}

/// Time to sleep from `now` until the next boundary plus `buffer`.
pub fn until_next_bar(now: DateTime<Utc>, timeframe: Timeframe, buffer: Duration) -> Duration {
    let buffer = chrono::Duration::from_std(buffer).unwrap_or_else(|_| chrono::Duration::zero());
    let wake = next_boundary(now, timeframe) + buffer;
    (wake - now).to_std().unwrap_or(Duration::ZERO)
}

/// Sleep after a cycle that started at `cycle_start` and ended at `now`.
/// Zero when the cycle overran the next wake-up time.
pub fn after_cycle(
    cycle_start: DateTime<Utc>,
    now: DateTime<Utc>,
    timeframe: Timeframe,
    buffer: Duration,
) -> Duration {
    let wake = cycle_start + until_chrono(cycle_start, timeframe, buffer);
    (wake - now).to_std().unwrap_or(Duration::ZERO)
}

fn until_chrono(now: DateTime<Utc>, timeframe: Timeframe, buffer: Duration) -> chrono::Duration {
    chrono::Duration::from_std(until_next_bar(now, timeframe, buffer))
        .unwrap_or_else(|_| chrono::Duration::zero())
}
