//! Tuner configuration: one TOML file, one `TunerConfig`.
//!
//! Every section has defaults, so a minimal file only names the market:
//!
//! ```toml
//! [market]
//! symbol = "BTCUSDT"
//! timeframe = "15m"
//! ```
//!
//! `validate()` runs once at startup; a config error is the only fatal error
//! of the long-running loops.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use tunelab_core::data::{BinanceProvider, CsvProvider, DataError, MarketDataProvider, SyntheticProvider};
use tunelab_core::domain::{ParameterSet, Timeframe, MAX_PERIOD};
use tunelab_core::engine::{AnnualizationTable, CostModel, RiskConfig, SimulationConfig};
use tunelab_core::record::RecordKey;
use tunelab_core::retry::RetryPolicy;
use tunelab_core::strategy::StrategyKind;

use crate::gate::QualityGate;
use crate::grid::ParamGrid;
use crate::optimizer::OptimizerConfig;
use crate::publisher::PublishConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config does not parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config [{field}]: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ─── Sections ───────────────────────────────────────────────────────

/// Where bars come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    Binance {
        #[serde(default)]
        base_url: Option<String>,
    },
    Csv {
        path: PathBuf,
    },
    Synthetic {
        #[serde(default)]
        seed: u64,
    },
}

impl Default for DataSource {
    fn default() -> Self {
        Self::Binance { base_url: None }
    }
}

impl DataSource {
    pub fn build(&self) -> Result<Box<dyn MarketDataProvider>, DataError> {
        Ok(match self {
            Self::Binance { base_url } => {
                let provider = BinanceProvider::new()?;
                match base_url {
                    Some(url) => Box::new(provider.with_base_url(url.clone())),
                    None => Box::new(provider),
                }
            }
            Self::Csv { path } => Box::new(CsvProvider::new(path.clone())),
            Self::Synthetic { seed } => Box::new(SyntheticProvider::new(*seed)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Bars fetched for each optimization run.
    #[serde(default = "default_history_bars")]
    pub history_bars: usize,
    #[serde(default)]
    pub source: DataSource,
}

fn default_history_bars() -> usize {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSettings {
    pub initial_capital: f64,
    pub fee_rate: f64,
    pub slippage_rate: f64,
}

impl Default for CostSettings {
    fn default() -> Self {
        let costs = CostModel::default();
        Self {
            initial_capital: 10_000.0,
            fee_rate: costs.fee_rate,
            slippage_rate: costs.slippage_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Minimum bars between two applied parameter changes.
    pub cooldown_bars: u32,
    /// Base-asset quantity per entry.
    pub order_quantity: f64,
    /// Bars fetched every live cycle.
    pub boot_bars: usize,
    /// Added after the bar boundary before waking up.
    pub sleep_buffer_secs: u64,
    /// Used when no record is published yet.
    pub fallback: Option<ParameterSet>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            cooldown_bars: 3,
            order_quantity: 0.001,
            boot_bars: 300,
            sleep_buffer_secs: 5,
            fallback: None,
        }
    }
}

impl LiveSettings {
    pub fn sleep_buffer(&self) -> Duration {
        Duration::from_secs(self.sleep_buffer_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: s.max_attempts,
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            multiplier: s.multiplier,
            max_backoff: Duration::from_millis(s.max_backoff_ms),
        }
    }
}

/// User entries override the built-in table; unlisted labels keep defaults.
fn merge_annualization<'de, D>(deserializer: D) -> Result<AnnualizationTable, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, f64>::deserialize(deserializer)?;
    let mut table = AnnualizationTable::default();
    table.0.extend(overrides);
    Ok(table)
}

// ─── TunerConfig ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    pub market: MarketSettings,
    #[serde(default)]
    pub costs: CostSettings,
    #[serde(default, deserialize_with = "merge_annualization")]
    pub annualization: AnnualizationTable,
    #[serde(default)]
    pub risk: Option<RiskConfig>,
    #[serde(default)]
    pub grid: ParamGrid,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub gate: QualityGate,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl TunerConfig {
    /// Defaults for everything but the market.
    pub fn for_market(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            market: MarketSettings {
                symbol: symbol.into(),
                timeframe,
                history_bars: default_history_bars(),
                source: DataSource::default(),
            },
            costs: CostSettings::default(),
            annualization: AnnualizationTable::default(),
            risk: None,
            grid: ParamGrid::default(),
            optimizer: OptimizerConfig::default(),
            gate: QualityGate::default(),
            publish: PublishConfig::default(),
            live: LiveSettings::default(),
            retry: RetrySettings::default(),
        }
    }

    /// Parse and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let market = &self.market;
        if market.symbol.trim().is_empty() {
            return Err(invalid("market", "symbol is empty"));
        }
        if market.history_bars == 0 {
            return Err(invalid("market", "history_bars must be positive"));
        }

        let c = &self.costs;
        if !(c.initial_capital.is_finite() && c.initial_capital > 0.0) {
            return Err(invalid(
                "costs",
                format!("initial_capital {} must be positive", c.initial_capital),
            ));
        }
        if !CostModel::new(c.fee_rate, c.slippage_rate).is_valid() {
            return Err(invalid(
                "costs",
                format!(
                    "fee_rate {} and slippage_rate {} must be in [0, 1)",
                    c.fee_rate, c.slippage_rate
                ),
            ));
        }

        if let Some((label, periods)) = self
            .annualization
            .0
            .iter()
            .find(|(_, p)| !(p.is_finite() && **p > 0.0))
        {
            return Err(invalid(
                "annualization",
                format!("{label} = {periods} must be positive"),
            ));
        }

        if let Some(risk) = &self.risk {
            let fractions = [risk.max_risk_per_trade, risk.max_capital_fraction];
            if fractions.iter().any(|f| !(*f > 0.0 && *f <= 1.0)) {
                return Err(invalid("risk", "risk fractions must be in (0, 1]"));
            }
            if !(risk.stop_multiple > 0.0 && risk.trail_multiple > 0.0) {
                return Err(invalid("risk", "stop and trail multiples must be positive"));
            }
        }

        self.validate_grid()?;
        self.gate.validate().map_err(|reason| invalid("gate", reason))?;

        let p = &self.publish;
        if !(p.staleness_hours.is_finite() && p.staleness_hours > 0.0) {
            return Err(invalid("publish", "staleness_hours must be positive"));
        }
        if !(p.every_hours.is_finite() && p.every_hours > 0.0) {
            return Err(invalid("publish", "every_hours must be positive"));
        }

        let live = &self.live;
        if !(live.order_quantity.is_finite() && live.order_quantity > 0.0) {
            return Err(invalid("live", "order_quantity must be positive"));
        }
        if live.boot_bars == 0 {
            return Err(invalid("live", "boot_bars must be positive"));
        }
        if live.cooldown_bars as usize > MAX_PERIOD {
            return Err(invalid("live", format!("cooldown_bars must be at most {MAX_PERIOD}")));
        }
        if let Some(fallback) = &live.fallback {
            StrategyKind::validate(fallback)
                .map_err(|e| invalid("live", format!("fallback parameters: {e}")))?;
        }

        let r = &self.retry;
        if !(r.multiplier.is_finite() && r.multiplier >= 1.0) {
            return Err(invalid("retry", "multiplier must be >= 1"));
        }
        Ok(())
    }

    fn validate_grid(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if !StrategyKind::is_known(&grid.strategy) {
            return Err(invalid(
                "grid",
                format!(
                    "unknown strategy '{}' (known: {})",
                    grid.strategy,
                    StrategyKind::NAMES.join(", ")
                ),
            ));
        }
        if grid.axes.is_empty() {
            return Err(invalid("grid", "no axes"));
        }
        if let Some((name, _)) = grid.axes.iter().find(|(_, values)| values.is_empty()) {
            return Err(invalid("grid", format!("axis '{name}' is empty")));
        }
        if let Some((name, _)) = grid
            .axes
            .iter()
            .find(|(_, values)| values.iter().any(|v| !v.is_finite()))
        {
            return Err(invalid("grid", format!("axis '{name}' has a non-finite value")));
        }
        if grid.combinations().is_empty() {
            let reason = grid
                .first_rejection()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no combination passes validation".into());
            return Err(invalid("grid", format!("zero valid combinations: {reason}")));
        }
        Ok(())
    }

    pub fn record_key(&self) -> RecordKey {
        RecordKey::new(self.market.symbol.clone(), self.market.timeframe)
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            initial_capital: self.costs.initial_capital,
            costs: CostModel::new(self.costs.fee_rate, self.costs.slippage_rate),
            risk: self.risk,
            periods_per_year: self.annualization.periods_per_year(&self.market.timeframe),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    pub fn staleness(&self) -> chrono::Duration {
        self.publish.staleness()
    }

    pub fn every(&self) -> Duration {
        self.publish.interval()
    }
}
