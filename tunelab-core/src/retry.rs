//! Bounded exponential backoff around collaborator calls.
//!
//! Only errors that classify themselves as transient are retried.

use std::fmt::Display;
use std::time::Duration;

/// Errors that know whether retrying could help.
pub trait Transient {
    fn is_transient(&self) -> bool;

    /// Provider-requested wait before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. 0 is treated as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1` (attempt counts from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let secs = self.initial_backoff.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }

    pub fn run<T, E, F>(&self, operation: &str, f: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run_with_sleep(operation, f, std::thread::sleep)
    }

    /// `run` with an injectable sleep.
    pub fn run_with_sleep<T, E, F, S>(&self, operation: &str, mut f: F, mut sleep: S) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Result<T, E>,
        S: FnMut(Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_transient() => {
                    let delay = e
                        .retry_after()
                        .map(|d| d.min(self.max_backoff))
                        .unwrap_or_else(|| self.backoff(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataError;
    use std::cell::Cell;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(300),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(300));
        assert_eq!(p.backoff(10), Duration::from_millis(300));
    }

    #[test]
    fn retries_transient_until_success() {
        let calls = Cell::new(0);
        let mut slept = Vec::new();
        let result = policy().run_with_sleep(
            "fetch",
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(DataError::NetworkUnreachable("down".into()))
                } else {
                    Ok(7)
                }
            },
            |d| slept.push(d),
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
        assert_eq!(slept, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), DataError> = policy().run_with_sleep(
            "fetch",
            || {
                calls.set(calls.get() + 1);
                Err(DataError::SymbolNotFound { symbol: "X".into() })
            },
            |_| panic!("must not sleep"),
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), DataError> = policy().run_with_sleep(
            "fetch",
            || {
                calls.set(calls.get() + 1);
                Err(DataError::RateLimited { retry_after_secs: 5 })
            },
            |d| assert_eq!(d, Duration::from_millis(300)),
        );
        assert!(matches!(result, Err(DataError::RateLimited { .. })));
        assert_eq!(calls.get(), 4);
    }
}
