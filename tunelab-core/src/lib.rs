//! TuneLab Core: domain types, indicators, strategies, simulation engine, record store.
//!
//! This crate contains everything that is a pure function of market data plus
//! the boundaries to the outside world:
//! - Domain types (bars, timeframes, parameter sets, signals)
//! - Indicator series and per-bar `IndicatorFrame`s
//! - Strategy families behind the `Strategy` trait and `StrategyKind` dispatch
//! - FLAT/LONG simulation with costs, risk sizing and a trailing stop
//! - The published `ActiveParameterRecord` and its versioned store
//! - Market data providers and the retry policy that wraps them

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod record;
pub mod retry;
pub mod strategy;
