//! Promotion history: JSON Lines, append-only.
//!
//! One immutable entry per successful promotion. Each line is an independent
//! JSON object, so a torn final line never hides earlier entries.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tunelab_core::domain::{ParameterSet, Signature, Timeframe};
use tunelab_core::engine::PerformanceMetrics;
use tunelab_core::record::{ActiveParameterRecord, GateSnapshot, RecordKey, RecordSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub source: RecordSource,
    /// Signature of the record this promotion replaced.
    #[serde(default)]
    pub previous_signature: Option<Signature>,
    pub content_signature: Signature,
    pub params: ParameterSet,
    pub metrics: PerformanceMetrics,
    pub data_end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateSnapshot>,
}

impl HistoryEntry {
    pub fn from_record(record: &ActiveParameterRecord, previous_signature: Option<Signature>) -> Self {
        Self {
            recorded_at: record.generated_at,
            symbol: record.symbol.clone(),
            timeframe: record.timeframe,
            source: record.source,
            previous_signature,
            content_signature: record.content_signature.clone(),
            params: record.params.clone(),
            metrics: record.metrics,
            data_end: record.data_end,
            gate: record.gate.clone(),
        }
    }
}

/// Append-only JSONL file for one (symbol, timeframe).
#[derive(Debug, Clone)]
pub struct PromotionHistory {
    path: PathBuf,
}

impl PromotionHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{dir}/promotion_history_{SYMBOL}_{TIMEFRAME}.jsonl`.
    pub fn for_key(dir: &Path, key: &RecordKey) -> Self {
        Self::new(dir.join(format!("promotion_history_{}.jsonl", key.suffix())))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &HistoryEntry) -> io::Result<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.sync_data()
    }

    /// All entries in file order. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> io::Result<Vec<HistoryEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for (line_no, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping malformed history line"
                ),
            }
        }
        Ok(entries)
    }

    /// Most recent entry, if any.
    pub fn last(&self) -> io::Result<Option<HistoryEntry>> {
        Ok(self.read_all()?.pop())
    }
}
