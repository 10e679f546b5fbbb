//! Criterion benchmarks for the grid sweep.
//!
//! Run with: `cargo bench -p tunelab-runner`
//!
//! - Full default grid (81 combinations), serial vs rayon
//! - Ranking alone, both modes

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tunelab_core::data::SyntheticProvider;
use tunelab_core::domain::PriceBar;
use tunelab_core::engine::SimulationConfig;
use tunelab_runner::{rank, Optimizer, OptimizerConfig, ParamGrid, RankingMode};

fn bars(count: usize) -> Vec<PriceBar> {
    SyntheticProvider::new(5)
        .with_dynamics(0.0, 0.012)
        .ending_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .generate("BTCUSDT", "15m".parse().unwrap(), count)
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("default_grid_sweep");
    group.sample_size(10);
    let grid = ParamGrid::default();

    for size in [1000usize, 4000] {
        let series = bars(size);
        for parallel in [false, true] {
            let optimizer = Optimizer::new(
                OptimizerConfig {
                    parallel,
                    ..OptimizerConfig::default()
                },
                SimulationConfig::default(),
            );
            let label = if parallel { "rayon" } else { "serial" };
            group.bench_with_input(BenchmarkId::new(label, size), &series, |b, series| {
                b.iter(|| optimizer.sweep(black_box(series), &grid).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_ranking(c: &mut Criterion) {
    let optimizer = Optimizer::new(OptimizerConfig::default(), SimulationConfig::default());
    let results = optimizer.sweep(&bars(2000), &ParamGrid::default()).unwrap();

    let mut group = c.benchmark_group("ranking");
    for mode in [RankingMode::Lexicographic, RankingMode::Robust] {
        group.bench_function(mode.to_string(), |b| {
            b.iter(|| rank(black_box(results.clone()), mode, 5));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sweep, bench_ranking);
criterion_main!(benches);
