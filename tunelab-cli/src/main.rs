//! TuneLab CLI: run the tuner's long-lived processes and one-off checks.
//!
//! Commands:
//! - `backtest`: simulate one parameter set and print its metrics
//! - `optimize`: one grid sweep; writes the ranked table, publishes nothing
//! - `reoptimize`: the re-optimization loop (sweep → gate → publish)
//! - `live`: the paper-trading loop with hot-reloaded parameters
//! - `verify`: compare the published record with the ranked table

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking;
use tracing_subscriber::{prelude::*, EnvFilter};

use tunelab_core::data::fetch_sanitized;
use tunelab_core::domain::ParameterSet;
use tunelab_core::engine::{backtest_params, BacktestResult, CostModel};
use tunelab_core::record::{FileRecordStore, RecordStore};
use tunelab_live::{LiveTrader, PaperVenue};
use tunelab_runner::{verify, write_ranked_table, Optimizer, Reoptimizer, TunerConfig};

#[derive(Parser)]
#[command(
    name = "tunelab",
    about = "TuneLab, adaptive parameter tuning for a long-only trading agent"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config/tunelab.toml")]
    config: PathBuf,

    /// Also append logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one parameter set on recent history.
    Backtest {
        /// Strategy family. Defaults to the grid's strategy.
        #[arg(long)]
        strategy: Option<String>,

        /// Parameter as name=value; repeat for each. Without any, the
        /// configured fallback parameters are used.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,

        /// Print every closed trade.
        #[arg(long, default_value_t = false)]
        trades: bool,
    },
    /// Run one grid sweep and write the ranked table.
    Optimize {
        /// Rows to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Re-optimize and publish on a schedule.
    Reoptimize {
        /// Run a single cycle and exit.
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<usize>,
    },
    /// Trade on a paper venue with hot-reloaded parameters.
    Live {
        /// Starting quote balance of the paper venue.
        #[arg(long, default_value_t = 10_000.0)]
        paper_balance: f64,

        /// Stop after this many bar cycles.
        #[arg(long)]
        max_cycles: Option<usize>,
    },
    /// Check the published record against the latest ranked table.
    Verify,
}

fn parse_param(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{value}' is not a number: {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (writer, guard) = non_blocking(file);
        // The writer flushes on drop of the guard; keep it for the process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.clone())?;

    let config = TunerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!(
        config = %cli.config.display(),
        key = %config.record_key(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Backtest {
            strategy,
            params,
            trades,
        } => run_backtest(&config, strategy, params, trades),
        Commands::Optimize { top } => run_optimize(&config, top),
        Commands::Reoptimize { once, max_cycles } => {
            run_reoptimize(&config, if once { Some(1) } else { max_cycles })
        }
        Commands::Live {
            paper_balance,
            max_cycles,
        } => run_live(&config, paper_balance, max_cycles),
        Commands::Verify => run_verify(&config),
    }
}

fn fetch_history(config: &TunerConfig) -> Result<Vec<tunelab_core::domain::PriceBar>> {
    let provider = config.market.source.build()?;
    let key = config.record_key();
    let bars = config
        .retry_policy()
        .run("fetch_price_history", || {
            fetch_sanitized(
                provider.as_ref(),
                &key.symbol,
                key.timeframe,
                config.market.history_bars,
            )
        })
        .with_context(|| format!("fetching history for {key} from {}", provider.name()))?;
    Ok(bars)
}

fn run_backtest(
    config: &TunerConfig,
    strategy: Option<String>,
    overrides: Vec<(String, f64)>,
    show_trades: bool,
) -> Result<()> {
    let params = if overrides.is_empty() {
        match &config.live.fallback {
            Some(fallback) => fallback.clone(),
            None => bail!("no --param given and no [live.fallback] parameters configured"),
        }
    } else {
        let name = strategy.unwrap_or_else(|| config.grid.strategy.clone());
        overrides
            .into_iter()
            .fold(ParameterSet::new(name), |p, (k, v)| p.with(k, v))
    };

    let bars = fetch_history(config)?;
    let result = backtest_params(&bars, &params, &config.simulation_config())?;
    print_summary(config, bars.len(), &result);
    if show_trades {
        println!("{:<25} {:<25} {:>12} {:>12} {:>8}  {}", "Entry", "Exit", "Entry Px", "Exit Px", "PnL %", "Exit");
        println!("{}", "-".repeat(100));
        for t in &result.trades {
            println!(
                "{:<25} {:<25} {:>12.4} {:>12.4} {:>8.2}  {}",
                t.entry_time.to_rfc3339(),
                t.exit_time.to_rfc3339(),
                t.entry_price,
                t.exit_price,
                t.pnl * 100.0,
                t.exit_note
            );
        }
    }
    Ok(())
}

fn run_optimize(config: &TunerConfig, top: usize) -> Result<()> {
    let bars = fetch_history(config)?;
    let optimizer = Optimizer::new(config.optimizer.clone(), config.simulation_config());
    let table = optimizer.optimize(&bars, &config.grid)?;
    let path = write_ranked_table(&config.publish.dir, &config.record_key(), &table)?;

    println!();
    println!(
        "=== Grid sweep: {} combinations, {} eligible ({} ranking) ===",
        table.len(),
        table.eligible_count(),
        table.mode
    );
    println!(
        "{:>4} {:>9} {:>8} {:>9} {:>7}  {}",
        "Rank", "Return %", "Sharpe", "MaxDD %", "Trades", "Parameters"
    );
    println!("{}", "-".repeat(90));
    for row in table.eligible().take(top) {
        let m = row.metrics();
        println!(
            "{:>4} {:>9.2} {:>8.3} {:>9.2} {:>7}  {}",
            row.rank.unwrap_or(0),
            m.total_return * 100.0,
            m.annualized_sharpe,
            m.max_drawdown * 100.0,
            m.trade_count,
            row.result.params
        );
    }
    let gate_verdict = match table.top() {
        tunelab_runner::TopCandidate::Selected(row) => config.gate.evaluate(row.metrics()).to_string(),
        tunelab_runner::TopCandidate::NoViableCandidate { .. } => "no viable candidate".to_string(),
    };
    println!();
    println!("Gate on top row: {gate_verdict}");
    println!("Ranked table written to: {}", path.display());
    Ok(())
}

fn run_reoptimize(config: &TunerConfig, max_cycles: Option<usize>) -> Result<()> {
    let reoptimizer = Reoptimizer::from_config(config)?;
    let cancel = AtomicBool::new(false);
    let cycles = reoptimizer.run(&cancel, max_cycles);
    tracing::info!(cycles, "re-optimizer stopped");
    Ok(())
}

fn run_live(config: &TunerConfig, paper_balance: f64, max_cycles: Option<usize>) -> Result<()> {
    let costs = CostModel::new(config.costs.fee_rate, config.costs.slippage_rate);
    let venue = Box::new(PaperVenue::new(costs, paper_balance));
    let mut trader = LiveTrader::from_config(config, venue)?;
    let cancel = AtomicBool::new(false);
    let cycles = trader.run(&cancel, max_cycles);
    tracing::info!(cycles, position = ?trader.state().position(), "live loop stopped");
    Ok(())
}

fn run_verify(config: &TunerConfig) -> Result<()> {
    let store = FileRecordStore::new(config.publish.dir.clone());
    let provider = config.market.source.build()?;
    let report = verify(config, &store as &dyn RecordStore, provider.as_ref())?;
    println!();
    println!("{report}");
    println!();
    Ok(())
}

fn print_summary(config: &TunerConfig, bars: usize, result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Market:         {}", config.record_key());
    println!("Parameters:     {}", result.params);
    println!("Bars:           {bars}");
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Sharpe:         {:.3}", m.annualized_sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Gate:           {}", config.gate.evaluate(m));
    println!();
}
