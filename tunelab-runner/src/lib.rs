//! TuneLab Runner: optimization, gating and publication.
//!
//! This crate builds on `tunelab-core` to provide:
//! - `TunerConfig`, loaded from a single TOML file
//! - Grid sweeps over a strategy's parameters, serial or on the rayon pool
//! - Deterministic ranking and the exported ranked table
//! - The quality gate and the publisher (single writer of the active record)
//! - Append-only promotion history
//! - The re-optimization loop and the runtime state check

pub mod config;
pub mod export;
pub mod gate;
pub mod grid;
pub mod history;
pub mod optimizer;
pub mod publisher;
pub mod ranking;
pub mod scheduler;
pub mod verify;

pub use config::{ConfigError, DataSource, LiveSettings, TunerConfig};
pub use export::{read_ranked_table, write_ranked_table, TableRow};
pub use gate::{GateCriterion, GateFailure, GateVerdict, QualityGate};
pub use grid::ParamGrid;
pub use history::{HistoryEntry, PromotionHistory};
pub use optimizer::{OptimizeError, Optimizer, OptimizerConfig};
pub use publisher::{Candidate, PromotionDecision, PublishConfig, PublishError, Publisher, RetainReason};
pub use ranking::{rank, RankedRow, RankedTable, RankingMode, TopCandidate};
pub use scheduler::{sleep_interruptible, CycleError, CycleReport, Reoptimizer};
pub use verify::{verify, Agreement, RuntimeReport};
