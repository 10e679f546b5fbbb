//! Ranked-table export: `optimization_{SYMBOL}_{TIMEFRAME}.csv`.
//!
//! One row per evaluated parameter set, in table order. Columns:
//! rank, grid_index, eligible, score, strategy, every parameter (sorted by
//! name), then the six metrics. Floats use shortest round-trip formatting so
//! the same table always produces the same bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tunelab_core::domain::ParameterSet;
use tunelab_core::engine::PerformanceMetrics;
use tunelab_core::record::{store::write_atomic, RecordKey};

use crate::ranking::RankedTable;

const LEADING_COLUMNS: [&str; 5] = ["rank", "grid_index", "eligible", "score", "strategy"];
const METRIC_COLUMNS: [&str; 6] = [
    "total_return",
    "annualized_sharpe",
    "max_drawdown",
    "win_rate",
    "profit_factor",
    "trade_count",
];

/// `{dir}/optimization_{SYMBOL}_{TIMEFRAME}.csv`.
pub fn table_path(dir: &Path, key: &RecordKey) -> PathBuf {
    dir.join(format!("optimization_{}.csv", key.suffix()))
}

/// Render the table as CSV.
pub fn ranked_table_csv(table: &RankedTable) -> Result<String> {
    let param_names: BTreeSet<&str> = table
        .rows
        .iter()
        .flat_map(|r| r.result.params.parameters.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);

    let header: Vec<&str> = LEADING_COLUMNS
        .iter()
        .copied()
        .chain(param_names.iter().copied())
        .chain(METRIC_COLUMNS.iter().copied())
        .collect();
    wtr.write_record(&header)?;

    for row in &table.rows {
        let m = &row.result.metrics;
        let mut record: Vec<String> = vec![
            row.rank.map(|r| r.to_string()).unwrap_or_default(),
            row.grid_index.to_string(),
            row.eligible.to_string(),
            row.score.map(|s| s.to_string()).unwrap_or_default(),
            row.result.params.strategy_name.clone(),
        ];
        for name in &param_names {
            record.push(
                row.result
                    .params
                    .get(name)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        record.extend([
            m.total_return.to_string(),
            m.annualized_sharpe.to_string(),
            m.max_drawdown.to_string(),
            m.win_rate.to_string(),
            m.profit_factor.to_string(),
            m.trade_count.to_string(),
        ]);
        wtr.write_record(&record)?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write the table atomically and return its path.
pub fn write_ranked_table(dir: &Path, key: &RecordKey, table: &RankedTable) -> Result<PathBuf> {
    let path = table_path(dir, key);
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let csv = ranked_table_csv(table)?;
    write_atomic(&path, csv.as_bytes())
        .with_context(|| format!("writing ranked table {}", path.display()))?;
    Ok(path)
}

/// A row read back from an exported table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub rank: Option<usize>,
    pub grid_index: usize,
    pub eligible: bool,
    pub score: Option<f64>,
    pub params: ParameterSet,
    pub metrics: PerformanceMetrics,
}

struct RowFields<'a> {
    line: usize,
    fields: BTreeMap<&'a str, &'a str>,
}

impl<'a> RowFields<'a> {
    fn text(&self, name: &str) -> Result<&'a str> {
        match self.fields.get(name) {
            Some(value) => Ok(*value),
            None => bail!("ranked table is missing column '{name}'"),
        }
    }

    fn number(&self, name: &str) -> Result<f64> {
        let raw = self.text(name)?;
        raw.parse()
            .with_context(|| format!("row {}: column '{name}' = '{raw}'", self.line))
    }

    fn optional(&self, name: &str) -> Result<Option<f64>> {
        if self.text(name)?.is_empty() {
            Ok(None)
        } else {
            self.number(name).map(Some)
        }
    }
}

/// Parse an exported table. Rows come back in file order.
pub fn read_ranked_table(path: &Path) -> Result<Vec<TableRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening ranked table {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 1;
        let record = record.with_context(|| format!("row {line}"))?;
        let row = RowFields {
            line,
            fields: headers.iter().zip(record.iter()).collect(),
        };

        let mut params = ParameterSet::new(row.text("strategy")?);
        for (name, value) in &row.fields {
            if LEADING_COLUMNS.contains(name) || METRIC_COLUMNS.contains(name) || value.is_empty() {
                continue;
            }
            params.parameters.insert((*name).to_string(), row.number(name)?);
        }

        rows.push(TableRow {
            rank: row.optional("rank")?.map(|r| r as usize),
            grid_index: row.number("grid_index")? as usize,
            eligible: row.text("eligible")? == "true",
            score: row.optional("score")?,
            params,
            metrics: PerformanceMetrics {
                total_return: row.number("total_return")?,
                annualized_sharpe: row.number("annualized_sharpe")?,
                max_drawdown: row.number("max_drawdown")?,
                win_rate: row.number("win_rate")?,
                profit_factor: row.number("profit_factor")?,
                trade_count: row.number("trade_count")? as usize,
            },
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{rank, RankingMode};
    use tunelab_core::engine::BacktestResult;

    fn result(buy: f64, ret: f64, trades: usize) -> BacktestResult {
        BacktestResult {
            params: ParameterSet::new("rsi_sma")
                .with("rsi_period", 14.0)
                .with("rsi_buy", buy),
            metrics: PerformanceMetrics {
                total_return: ret,
                annualized_sharpe: 1.25,
                max_drawdown: -0.1,
                win_rate: 0.5,
                profit_factor: 2.0,
                trade_count: trades,
            },
            equity: Vec::new(),
            trades: Vec::new(),
        }
    }

    fn table() -> RankedTable {
        rank(
            vec![result(30.0, 0.05, 6), result(35.0, 0.10, 7), result(40.0, 0.50, 1)],
            RankingMode::Robust,
            5,
        )
    }

    #[test]
    fn header_and_row_order() {
        let csv = ranked_table_csv(&table()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "rank,grid_index,eligible,score,strategy,rsi_buy,rsi_period,\
             total_return,annualized_sharpe,max_drawdown,win_rate,profit_factor,trade_count"
        );
        assert!(lines.next().unwrap().starts_with("1,1,true,"));
        assert!(lines.next().unwrap().starts_with("2,0,true,"));
        assert!(lines.next().unwrap().starts_with(",2,false,,rsi_sma,40,14,0.5,"));
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(ranked_table_csv(&table()).unwrap(), ranked_table_csv(&table()).unwrap());
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let key = RecordKey::new("BTCUSDT", "1h".parse().unwrap());
        let path = write_ranked_table(dir.path(), &key, &table()).unwrap();
        assert_eq!(path, dir.path().join("optimization_BTCUSDT_1h.csv"));

        let rows = read_ranked_table(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[0].params, result(35.0, 0.1, 7).params);
        assert_eq!(rows[0].metrics.trade_count, 7);
        assert!(rows[0].score.is_some());
        assert_eq!(rows[2].rank, None);
        assert!(!rows[2].eligible);
    }
}
