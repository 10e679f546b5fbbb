//! ParameterSet and its content signature.
//!
//! - `ParameterSet`: strategy family name + numeric parameters.
//! - `Signature`: blake3 over the strategy name and the sorted parameter map.
//!   Metrics and timestamps never enter the signature, so two records that
//!   differ only in metadata compare equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors from reading typed values out of a `ParameterSet`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("strategy '{strategy}' requires parameter '{key}'")]
    Missing { strategy: String, key: String },

    #[error("parameter '{key}' = {value} is invalid: {reason}")]
    Invalid {
        key: String,
        value: f64,
        reason: String,
    },

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
}

/// Strategy family name + parameters.
///
/// Uses `BTreeMap` so iteration (and therefore hashing and CSV columns) is
/// always in key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub strategy_name: String,
    pub parameters: BTreeMap<String, f64>,
}

impl ParameterSet {
    pub fn new(strategy_name: impl Into<String>) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).copied()
    }

    /// Required finite value.
    pub fn require(&self, key: &str) -> Result<f64, ParamError> {
        let value = self.get(key).ok_or_else(|| ParamError::Missing {
            strategy: self.strategy_name.clone(),
            key: key.to_string(),
        })?;
        if !value.is_finite() {
            return Err(ParamError::Invalid {
                key: key.to_string(),
                value,
                reason: "must be finite".into(),
            });
        }
        Ok(value)
    }

    /// Optional finite value with a default.
    pub fn get_or(&self, key: &str, default: f64) -> Result<f64, ParamError> {
        if self.parameters.contains_key(key) {
            self.require(key)
        } else {
            Ok(default)
        }
    }

    /// Required whole number >= 1 (periods, lookbacks).
    pub fn period(&self, key: &str) -> Result<usize, ParamError> {
        let value = self.require(key)?;
        to_period(key, value)
    }

    /// Optional whole number >= 1 with a default.
    pub fn period_or(&self, key: &str, default: usize) -> Result<usize, ParamError> {
        if self.parameters.contains_key(key) {
            self.period(key)
        } else {
            Ok(default)
        }
    }

    /// Content signature over (strategy_name, sorted parameters).
    pub fn signature(&self) -> Signature {
        let mut canonical = String::with_capacity(64);
        canonical.push_str(&self.strategy_name);
        for (key, value) in &self.parameters {
            canonical.push('|');
            canonical.push_str(key);
            canonical.push('=');
            // Normalize -0.0 so it hashes like 0.0.
            let value = if *value == 0.0 { 0.0 } else { *value };
            canonical.push_str(&value.to_string());
        }
        Signature::from_bytes(canonical.as_bytes())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.strategy_name)?;
        for (i, (key, value)) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, ")")
    }
}

/// Largest accepted period or lookback, in bars.
pub const MAX_PERIOD: usize = 100_000;

fn to_period(key: &str, value: f64) -> Result<usize, ParamError> {
    if value < 1.0 || value.fract() != 0.0 {
        return Err(ParamError::Invalid {
            key: key.to_string(),
            value,
            reason: "must be a whole number >= 1".into(),
        });
    }
    if value > MAX_PERIOD as f64 {
        return Err(ParamError::Invalid {
            key: key.to_string(),
            value,
            reason: format!("must be at most {MAX_PERIOD}"),
        });
    }
    Ok(value as usize)
}

/// Hex-encoded blake3 content signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
