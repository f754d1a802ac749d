// =============================================================================
// HTF Scanner — one pass over the watchlist
// =============================================================================
//
// For each watch item, in configured order:
//   1. download candles (with retries),
//   2. run the HTF analysis,
//   3. record one row; failures become error rows instead of aborting.
//
// Every row of a run shares the same run time. The caller decides what an
// all-failed run means (the `scan` command exits with status 2).
// =============================================================================

use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{ScannerConfig, WatchItem};
use crate::htf_analysis::{analyze, HtfParams};
use crate::results::{write_results, ScanRow};
use crate::shortlist::{build_shortlist, ShortlistFilter};
use crate::yahoo::{fetch_with_retries, CandleSource, RetryPolicy};

/// A symbol that could not be scanned.
#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub error: String,
}

/// Everything produced by one scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub run_id: String,
    pub run_time: DateTime<Utc>,
    pub rows: Vec<ScanRow>,
    pub failures: Vec<ScanFailure>,
    pub duration_ms: u64,
}

impl ScanReport {
    /// True when every scanned symbol failed.
    pub fn all_failed(&self) -> bool {
        !self.rows.is_empty() && self.failures.len() == self.rows.len()
    }

    /// Process exit status for a one-shot scan: 2 when every symbol failed.
    pub fn exit_code(&self) -> u8 {
        if self.all_failed() {
            2
        } else {
            0
        }
    }

    pub fn summary(&self, output: &str, shortlist_min_score: u8) -> ScanSummary {
        let shortlisted =
            build_shortlist(&self.rows, &ShortlistFilter::with_min_score(shortlist_min_score))
                .len();
        ScanSummary {
            run_id: self.run_id.clone(),
            run_time: rfc3339(self.run_time),
            rows_written: self.rows.len(),
            shortlisted,
            failures: self.failures.clone(),
            duration_ms: self.duration_ms,
            output: output.to_string(),
        }
    }
}

/// Serialisable digest of a finished scan for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub run_id: String,
    pub run_time: String,
    pub rows_written: usize,
    pub shortlisted: usize,
    pub failures: Vec<ScanFailure>,
    pub duration_ms: u64,
    pub output: String,
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Scan every watch item and build the report. Never fails as a whole;
/// per-symbol problems become error rows.
pub async fn run_scan(source: &dyn CandleSource, config: &ScannerConfig) -> ScanReport {
    let started = Instant::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    let run_time = Utc::now();
    let run_time_str = rfc3339(run_time);

    let params = HtfParams::from(config);
    let policy = RetryPolicy::new(config.retries, config.backoff_base_secs);

    info!(
        run_id = %run_id,
        symbols = config.watchlist.len(),
        timeframe = %config.timeframe,
        "starting HTF scan"
    );

    let mut rows = Vec::with_capacity(config.watchlist.len());
    let mut failures = Vec::new();

    for item in &config.watchlist {
        match scan_symbol(source, config, item, &params, &policy, &run_time_str).await {
            Ok(row) => rows.push(row),
            Err((stage, e)) => {
                error!(symbol = %item.symbol, stage, error = %e, "failed to process symbol");
                failures.push(ScanFailure {
                    symbol: item.symbol.clone(),
                    error: format!("{e:#}"),
                });
                rows.push(ScanRow::error(
                    run_time_str.clone(),
                    item.display_name(),
                    item.symbol.clone(),
                    format!("{stage} error: {e:#}"),
                ));
            }
        }
    }

    let report = ScanReport {
        run_id,
        run_time,
        rows,
        failures,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };

    info!(
        run_id = %report.run_id,
        rows = report.rows.len(),
        failed = report.failures.len(),
        duration_ms = report.duration_ms,
        "HTF scan finished"
    );

    report
}

/// Scan one symbol. The error carries the failing stage for the notes column.
async fn scan_symbol(
    source: &dyn CandleSource,
    config: &ScannerConfig,
    item: &WatchItem,
    params: &HtfParams,
    policy: &RetryPolicy,
    run_time: &str,
) -> std::result::Result<ScanRow, (&'static str, anyhow::Error)> {
    let candles = fetch_with_retries(
        source,
        &item.symbol,
        config.timeframe,
        config.history_days,
        policy,
    )
    .await
    .map_err(|e| ("download", e))?;

    let analysis = analyze(&candles, params).ok_or_else(|| {
        (
            "analysis",
            anyhow::anyhow!("no close price available for symbol"),
        )
    })?;

    if analysis.insufficient_history {
        warn!(
            symbol = %item.symbol,
            candles = analysis.candles,
            slow_period = params.slow_period,
            "history shorter than slow EMA period"
        );
    }

    info!(
        symbol = %item.symbol,
        close = analysis.last_close,
        ema_fast = ?analysis.ema_fast,
        ema_slow = ?analysis.ema_slow,
        bias = %analysis.bias,
        momentum = %analysis.momentum,
        cross = analysis.ema_cross_recent,
        "symbol scanned"
    );

    Ok(ScanRow {
        run_time: run_time.to_string(),
        ticker: item.display_name().to_string(),
        symbol: item.symbol.clone(),
        last_close: Some(analysis.last_close),
        ema34: analysis.ema_fast,
        ema200: analysis.ema_slow,
        bias: analysis.bias,
        momentum: analysis.momentum,
        ema_cross_recent: Some(analysis.ema_cross_recent),
        score: Some(analysis.score),
        notes: analysis.notes(params.slow_period),
    })
}

/// Run a scan and overwrite the configured results file.
pub async fn execute(source: &dyn CandleSource, config: &ScannerConfig) -> Result<ScanReport> {
    let report = run_scan(source, config).await;
    write_results(&config.output_csv, &report.rows)?;

    if report.all_failed() {
        error!(
            symbols = report.rows.len(),
            "all downloads failed; results file contains only error rows"
        );
    } else {
        info!(
            path = %config.output_csv,
            rows = report.rows.len(),
            "scan complete"
        );
    }

    Ok(report)
}
