//! Versioned record store.
//!
//! `FileRecordStore` keeps one pretty-printed JSON file per key:
//! - Writes are atomic: write to a temp file in the same directory, fsync,
//!   rename over the target. Readers see the old or the new file, never a mix.
//! - The version is the file's modification time.

use super::ActiveParameterRecord;
use crate::domain::Timeframe;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparsable record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The stored bytes exist but are not a valid record.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Identifies one record: a symbol on a timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl RecordKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }

    /// Symbol with separators removed and upper-cased ("btc/usdt" → "BTCUSDT").
    pub fn normalized_symbol(&self) -> String {
        self.symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// File name fragment `{SYMBOL}_{TIMEFRAME}` shared by every artifact.
    pub fn suffix(&self) -> String {
        format!("{}_{}", self.normalized_symbol(), self.timeframe.label())
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Opaque, totally ordered version of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordVersion(pub SystemTime);

#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    pub record: ActiveParameterRecord,
    pub version: RecordVersion,
}

/// Key-value store with versions. Single writer, many readers.
pub trait RecordStore: Send + Sync {
    /// Current version, `None` if no record exists. Cheap; no parsing.
    fn version(&self, key: &RecordKey) -> Result<Option<RecordVersion>, StoreError>;

    /// Current record, `None` if absent. A corrupt record is `StoreError::Parse`.
    fn get(&self, key: &RecordKey) -> Result<Option<VersionedRecord>, StoreError>;

    /// Replace the record atomically and return the new version.
    fn put(&self, key: &RecordKey, record: &ActiveParameterRecord)
        -> Result<RecordVersion, StoreError>;
}

/// Directory-backed store: `{dir}/active_params_{SYMBOL}_{TIMEFRAME}.json`.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        self.dir.join(format!("active_params_{}.json", key.suffix()))
    }
}

impl RecordStore for FileRecordStore {
    fn version(&self, key: &RecordKey) -> Result<Option<RecordVersion>, StoreError> {
        let path = self.path_for(key);
        match fs::metadata(&path) {
            Ok(meta) => {
                let mtime = meta.modified().map_err(|e| StoreError::io(&path, e))?;
                Ok(Some(RecordVersion(mtime)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn get(&self, key: &RecordKey) -> Result<Option<VersionedRecord>, StoreError> {
        let Some(version) = self.version(key)? else {
            return Ok(None);
        };
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let record = serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Some(VersionedRecord { record, version }))
    }

    fn put(
        &self,
        key: &RecordKey,
        record: &ActiveParameterRecord,
    ) -> Result<RecordVersion, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &json)?;
        self.version(key)?
            .ok_or_else(|| StoreError::io(&path, std::io::ErrorKind::NotFound.into()))
    }
}

/// Write `bytes` to `path` through a same-directory temp file + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".into());
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(&tmp_path, e));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        // Clean up temp file on rename failure
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, e)
    })
}
