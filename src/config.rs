// =============================================================================
// Scanner Configuration — JSON file + environment overrides, atomic save
// =============================================================================
//
// Every tunable parameter of the scanner lives here. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file. Persistence uses an atomic tmp + rename pattern.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::EmaSeed;
use crate::market_data::Timeframe;

// =============================================================================
// Watchlist
// =============================================================================

/// A symbol to scan, with an optional friendly name for the CSV `ticker`
/// column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchItem {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl WatchItem {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
        }
    }

    pub fn named(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: Some(name.into()),
        }
    }

    /// Name shown in reports: the friendly name if set, else the symbol.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.symbol)
    }

    /// Parse `SYMBOL` or `SYMBOL:NAME`.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        match entry.split_once(':') {
            Some((sym, name)) if !sym.trim().is_empty() && !name.trim().is_empty() => {
                Some(Self::named(sym.trim(), name.trim()))
            }
            Some((sym, _)) if !sym.trim().is_empty() => Some(Self::new(sym.trim())),
            Some(_) => None,
            None => Some(Self::new(entry)),
        }
    }
}

/// Parse a comma-separated `SYMBOL[:NAME]` list, skipping blanks.
pub fn parse_watchlist(list: &str) -> Vec<WatchItem> {
    list.split(',').filter_map(WatchItem::parse).collect()
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_watchlist() -> Vec<WatchItem> {
    let mut items: Vec<WatchItem> = [
        "GBPUSD=X", "EURUSD=X", "EURGBP=X", "GBPJPY=X", "EURJPY=X", "XAUUSD=X", "^GDAXI",
        "^FTSE", "USDCAD=X", "USDJPY=X", "AUDUSD=X", "NZDUSD=X", "AUDJPY=X", "NZDJPY=X",
        "AUDCAD=X", "EURCAD=X", "GBPCAD=X", "XAGUSD=X", "USDCHF=X", "BZ=F",
    ]
    .into_iter()
    .map(WatchItem::new)
    .collect();

    for item in &mut items {
        item.name = match item.symbol.as_str() {
            "^GDAXI" => Some("DAX40".to_string()),
            "^FTSE" => Some("FTSE100".to_string()),
            "BZ=F" => Some("UKOIL".to_string()),
            _ => None,
        };
    }
    items
}

fn default_output_csv() -> String {
    "scan_results.csv".to_string()
}

fn default_timeframe() -> Timeframe {
    Timeframe::Hour4
}

fn default_history_days() -> u32 {
    90
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_fast_period() -> usize {
    34
}

fn default_slow_period() -> usize {
    200
}

fn default_cross_lookback() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_shortlist_min_score() -> u8 {
    1
}

fn default_schedule() -> String {
    // Five minutes after every 4H candle close (UTC).
    "0 5 0/4 * * *".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

// =============================================================================
// ScannerConfig
// =============================================================================

/// Top-level configuration for the scanner and its API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    // --- Universe -----------------------------------------------------------

    /// Symbols scanned on every run, in output order.
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<WatchItem>,

    /// CSV file overwritten by every scan.
    #[serde(default = "default_output_csv")]
    pub output_csv: String,

    // --- Data ---------------------------------------------------------------

    /// Timeframe the EMAs are computed on.
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,

    /// Days of history requested per symbol.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Keep the still-forming last candle when resampling.
    #[serde(default = "default_true")]
    pub include_partial_candle: bool,

    /// Download attempts per symbol.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Backoff base in seconds; attempt `n` waits `base^(n-1)` before retrying.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    // --- Indicators ---------------------------------------------------------

    #[serde(default = "default_fast_period")]
    pub fast_period: usize,

    #[serde(default = "default_slow_period")]
    pub slow_period: usize,

    /// Number of most recent EMA points inspected for a cross.
    #[serde(default = "default_cross_lookback")]
    pub cross_lookback: usize,

    #[serde(default)]
    pub ema_seed: EmaSeed,

    // --- Shortlist ----------------------------------------------------------

    /// Minimum score for a row to be shortlisted when the request does not
    /// say otherwise.
    #[serde(default = "default_shortlist_min_score")]
    pub shortlist_min_score: u8,

    // --- Scheduling & server ------------------------------------------------

    /// Cron expression (seconds first, UTC) for scheduled scans in `serve`.
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Run a scan as soon as the server starts.
    #[serde(default = "default_true")]
    pub scan_on_startup: bool,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            watchlist: default_watchlist(),
            output_csv: default_output_csv(),
            timeframe: default_timeframe(),
            history_days: default_history_days(),
            include_partial_candle: true,
            retries: default_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            cross_lookback: default_cross_lookback(),
            ema_seed: EmaSeed::default(),
            shortlist_min_score: default_shortlist_min_score(),
            schedule: default_schedule(),
            scan_on_startup: true,
            bind_addr: default_bind_addr(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scanner config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scanner config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = config.watchlist.len(),
            timeframe = %config.timeframe,
            "scanner config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise scanner config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "scanner config saved (atomic)");
        Ok(())
    }

    /// Apply `HTF_SYMBOLS`, `HTF_OUTPUT_CSV` and `HTF_BIND_ADDR` overrides
    /// from the given lookup (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup("HTF_SYMBOLS") {
            let items = parse_watchlist(&list);
            if !items.is_empty() {
                self.watchlist = items;
            }
        }
        if let Some(path) = lookup("HTF_OUTPUT_CSV").filter(|s| !s.trim().is_empty()) {
            self.output_csv = path.trim().to_string();
        }
        if let Some(addr) = lookup("HTF_BIND_ADDR").filter(|s| !s.trim().is_empty()) {
            self.bind_addr = addr.trim().to_string();
        }
    }

    /// Reject configurations the scanner cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.watchlist.is_empty() {
            anyhow::bail!("watchlist is empty");
        }
        if let Some(item) = self.watchlist.iter().find(|w| w.symbol.trim().is_empty()) {
            anyhow::bail!("watchlist contains an empty symbol (name: {:?})", item.name);
        }
        if self.fast_period == 0 || self.slow_period == 0 {
            anyhow::bail!("EMA periods must be positive");
        }
        if self.fast_period >= self.slow_period {
            anyhow::bail!(
                "fast_period ({}) must be shorter than slow_period ({})",
                self.fast_period,
                self.slow_period
            );
        }
        if self.cross_lookback < 2 {
            anyhow::bail!("cross_lookback must be at least 2");
        }
        if self.retries == 0 {
            anyhow::bail!("retries must be at least 1");
        }
        if self.history_days == 0 {
            anyhow::bail!("history_days must be at least 1");
        }
        crate::scheduler::ScanSchedule::parse(&self.schedule)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ScannerConfig::default();
        assert_eq!(cfg.watchlist.len(), 20);
        assert_eq!(cfg.watchlist[0].symbol, "GBPUSD=X");
        assert_eq!(cfg.watchlist[19].display_name(), "UKOIL");
        assert_eq!(cfg.output_csv, "scan_results.csv");
        assert_eq!(cfg.timeframe, Timeframe::Hour4);
        assert_eq!(cfg.history_days, 90);
        assert_eq!(cfg.retries, 3);
        assert_eq!((cfg.fast_period, cfg.slow_period), (34, 200));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn friendly_names_for_indices_and_oil() {
        let cfg = ScannerConfig::default();
        let names: HashMap<_, _> = cfg
            .watchlist
            .iter()
            .map(|w| (w.symbol.as_str(), w.display_name()))
            .collect();
        assert_eq!(names["^GDAXI"], "DAX40");
        assert_eq!(names["^FTSE"], "FTSE100");
        assert_eq!(names["EURUSD=X"], "EURUSD=X");
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: ScannerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.watchlist.len(), 20);
        assert_eq!(cfg.ema_seed, EmaSeed::First);
        assert!(cfg.scan_on_startup);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "watchlist": [{"symbol": "^GDAXI", "name": "DAX40"}], "timeframe": "1h" }"#;
        let cfg: ScannerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.watchlist, vec![WatchItem::named("^GDAXI", "DAX40")]);
        assert_eq!(cfg.timeframe, Timeframe::Hour1);
        assert_eq!(cfg.slow_period, 200);
    }

    #[test]
    fn watch_item_parsing() {
        assert_eq!(WatchItem::parse("BZ=F:UKOIL"), Some(WatchItem::named("BZ=F", "UKOIL")));
        assert_eq!(WatchItem::parse(" EURUSD=X "), Some(WatchItem::new("EURUSD=X")));
        assert_eq!(WatchItem::parse("GBPUSD=X:"), Some(WatchItem::new("GBPUSD=X")));
        assert_eq!(WatchItem::parse(":NAME"), None);
        assert_eq!(WatchItem::parse("  "), None);
        assert_eq!(parse_watchlist("A, ,B:Bee").len(), 2);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("HTF_SYMBOLS", "^FTSE:FTSE100,USDJPY=X"),
            ("HTF_OUTPUT_CSV", "out/results.csv"),
            ("HTF_BIND_ADDR", " "),
        ]
        .into_iter()
        .collect();

        let mut cfg = ScannerConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.watchlist.len(), 2);
        assert_eq!(cfg.watchlist[0].display_name(), "FTSE100");
        assert_eq!(cfg.output_csv, "out/results.csv");
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ScannerConfig::default();
        cfg.fast_period = 200;
        assert!(cfg.validate().is_err());

        let mut cfg = ScannerConfig::default();
        cfg.watchlist.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = ScannerConfig::default();
        cfg.retries = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScannerConfig::default();
        cfg.schedule = "every four hours".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner_config.json");

        let mut cfg = ScannerConfig::default();
        cfg.history_days = 30;
        cfg.save(&path).unwrap();

        let loaded = ScannerConfig::load(&path).unwrap();
        assert_eq!(loaded.history_days, 30);
        assert_eq!(loaded.watchlist, cfg.watchlist);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
