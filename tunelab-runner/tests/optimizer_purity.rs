//! Grid optimizer purity: identical inputs give byte-identical ranked tables.

use chrono::{TimeZone, Utc};
use tunelab_core::data::SyntheticProvider;
use tunelab_core::domain::PriceBar;
use tunelab_core::engine::{RiskConfig, SimulationConfig};
use tunelab_runner::export::ranked_table_csv;
use tunelab_runner::{Optimizer, OptimizerConfig, ParamGrid, RankingMode};

fn bars(seed: u64) -> Vec<PriceBar> {
    SyntheticProvider::new(seed)
        .with_dynamics(0.0001, 0.015)
        .ending_at(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        .generate("BTCUSDT", "15m".parse().unwrap(), 1500)
}

fn table_text(bars: &[PriceBar], config: OptimizerConfig, sim: SimulationConfig) -> String {
    let optimizer = Optimizer::new(config, sim);
    let table = optimizer.optimize(bars, &ParamGrid::default()).unwrap();
    ranked_table_csv(&table).unwrap()
}

#[test]
fn repeated_runs_are_byte_identical() {
    let series = bars(11);
    let config = OptimizerConfig {
        min_trades: 1,
        ..OptimizerConfig::default()
    };
    let a = table_text(&series, config.clone(), SimulationConfig::default());
    let b = table_text(&series, config, SimulationConfig::default());
    assert_eq!(a, b);
    assert_eq!(a.lines().count(), 82);
}

#[test]
fn parallel_and_serial_agree_in_both_modes() {
    let series = bars(12);
    let sim = SimulationConfig {
        risk: Some(RiskConfig::default()),
        ..SimulationConfig::default()
    };
    for ranking in [RankingMode::Lexicographic, RankingMode::Robust] {
        let parallel = OptimizerConfig {
            ranking,
            parallel: true,
            min_trades: 2,
            deadline_secs: None,
        };
        let serial = OptimizerConfig {
            parallel: false,
            ..parallel.clone()
        };
        assert_eq!(
            table_text(&series, parallel, sim.clone()),
            table_text(&series, serial, sim.clone()),
            "mode {ranking}"
        );
    }
}

#[test]
fn input_order_of_axes_does_not_matter() {
    let series = bars(13);
    let forward = ParamGrid::new("rsi_sma")
        .axis("rsi_period", vec![10.0, 14.0])
        .axis("sma_period", vec![20.0])
        .axis("rsi_buy", vec![30.0, 35.0])
        .axis("rsi_sell", vec![65.0]);
    let backward = ParamGrid::new("rsi_sma")
        .axis("rsi_sell", vec![65.0])
        .axis("rsi_buy", vec![30.0, 35.0])
        .axis("sma_period", vec![20.0])
        .axis("rsi_period", vec![10.0, 14.0]);
    let optimizer = Optimizer::new(OptimizerConfig::default(), SimulationConfig::default());
    let a = optimizer.optimize(&series, &forward).unwrap();
    let b = optimizer.optimize(&series, &backward).unwrap();
    assert_eq!(ranked_table_csv(&a).unwrap(), ranked_table_csv(&b).unwrap());
}
