// =============================================================================
// Scan Results File — CSV persistence
// =============================================================================
//
// One row per watch item, header first, fixed column order:
//
//   run_time,ticker,symbol,last_close,ema34,ema200,bias,momentum,
//   ema_cross_recent,score,notes
//
// Numeric columns are empty on error rows. The file is replaced atomically
// (write `.tmp`, then rename) so readers never observe a half-written scan.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::types::Trend;

/// Column order of the results file.
pub const FIELDNAMES: [&str; 11] = [
    "run_time",
    "ticker",
    "symbol",
    "last_close",
    "ema34",
    "ema200",
    "bias",
    "momentum",
    "ema_cross_recent",
    "score",
    "notes",
];

/// A single line of the results file.
///
/// `ema34` / `ema200` hold the fast and slow EMA whatever periods are
/// configured; the column names are part of the file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    pub run_time: String,
    pub ticker: String,
    pub symbol: String,
    pub last_close: Option<f64>,
    pub ema34: Option<f64>,
    pub ema200: Option<f64>,
    pub bias: Trend,
    pub momentum: Trend,
    pub ema_cross_recent: Option<bool>,
    pub score: Option<u8>,
    #[serde(default)]
    pub notes: String,
}

impl ScanRow {
    /// Row recorded for a symbol that could not be scanned.
    pub fn error(
        run_time: impl Into<String>,
        ticker: impl Into<String>,
        symbol: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            run_time: run_time.into(),
            ticker: ticker.into(),
            symbol: symbol.into(),
            last_close: None,
            ema34: None,
            ema200: None,
            bias: Trend::Error,
            momentum: Trend::Error,
            ema_cross_recent: None,
            score: None,
            notes: notes.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.bias == Trend::Error
    }
}

/// Contents of the results file as served by the API.
#[derive(Debug, Clone)]
pub struct ResultsFile {
    pub raw: String,
    pub rows: Vec<ScanRow>,
    /// Hex SHA-256 of `raw`, used as the HTTP entity tag.
    pub etag: String,
}

impl ResultsFile {
    /// Run time shared by the rows, if the file has any.
    pub fn run_time(&self) -> Option<&str> {
        self.rows.first().map(|r| r.run_time.as_str())
    }
}

/// Serialise `rows` to CSV text, header included.
pub fn to_csv(rows: &[ScanRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    if rows.is_empty() {
        writer.write_record(FIELDNAMES)?;
    }
    for row in rows {
        writer.serialize(row).context("failed to serialise scan row")?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {e}"))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Parse CSV text produced by [`to_csv`].
pub fn parse_csv(raw: &str) -> Result<Vec<ScanRow>> {
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<ScanRow>().enumerate() {
        let row = record.with_context(|| format!("failed to parse results row {}", i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Overwrite `path` with `rows`.
pub fn write_results(path: impl AsRef<Path>, rows: &[ScanRow]) -> Result<()> {
    let path = path.as_ref();
    let content = to_csv(rows)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} to {}", tmp_path.display(), path.display()))?;

    info!(path = %path.display(), rows = rows.len(), "scan results written");
    Ok(())
}

/// Read the results file. `Ok(None)` when no scan has written it yet.
pub fn read_results(path: impl AsRef<Path>) -> Result<Option<ResultsFile>> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let rows = parse_csv(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    let etag = hex::encode(Sha256::digest(raw.as_bytes()));

    Ok(Some(ResultsFile { raw, rows, etag }))
}
