//! Per-bar discrete intent emitted by a strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    EnterLong,
    ExitLong,
    Hold,
}

/// One signal per bar, with a short machine-readable reason for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub reason: String,
}

impl Signal {
    pub fn enter(reason: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::EnterLong,
            reason: reason.into(),
        }
    }

    pub fn exit(reason: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::ExitLong,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Hold,
            reason: reason.into(),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.kind == SignalKind::EnterLong
    }

    pub fn is_exit(&self) -> bool {
        self.kind == SignalKind::ExitLong
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            SignalKind::EnterLong => "ENTER_LONG",
            SignalKind::ExitLong => "EXIT_LONG",
            SignalKind::Hold => "HOLD",
        };
        write!(f, "{label}:{}", self.reason)
    }
}
