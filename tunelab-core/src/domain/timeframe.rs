//! Bar interval ("15m", "1h", "1d") with its duration and canonical label.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timeframe '{0}': expected <n>m, <n>h or <n>d with n >= 1")]
pub struct TimeframeError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
        }
    }
}

/// A fixed bar interval. Serialized as its label (e.g. `"15m"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    amount: u32,
    unit: TimeUnit,
}

impl Timeframe {
    pub fn new(amount: u32, unit: TimeUnit) -> Result<Self, TimeframeError> {
        if amount == 0 {
            return Err(TimeframeError(format!("0{}", unit.suffix())));
        }
        Ok(Self { amount, unit })
    }

    /// Canonical label, the key of the annualization table.
    pub fn label(&self) -> String {
        format!("{}{}", self.amount, self.unit.suffix())
    }

    pub fn seconds(&self) -> u64 {
        u64::from(self.amount) * self.unit.seconds()
    }

    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seconds())
    }

    pub fn chrono_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds() as i64)
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || TimeframeError(s.to_string());
        let suffix = trimmed.chars().last().ok_or_else(err)?;
        let unit = match suffix.to_ascii_lowercase() {
            'm' => TimeUnit::Minute,
            'h' => TimeUnit::Hour,
            'd' => TimeUnit::Day,
            _ => return Err(err()),
        };
        let amount: u32 = trimmed[..trimmed.len() - 1].parse().map_err(|_| err())?;
        Self::new(amount, unit).map_err(|_| err())
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
