// =============================================================================
// Central Application State — HTF Scanner server
// =============================================================================
//
// Shared by the API handlers and the scheduler via `Arc<AppState>`.
//
// Thread safety:
//   - Atomics for the version counter and the single-scan flag.
//   - parking_lot::RwLock for the mutable status fields.
//   - The results file itself is the source of truth for `/shortlist`; it is
//     read from disk on every request, never cached here.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ScannerConfig;
use crate::scanner::{self, ScanSummary};
use crate::yahoo::CandleSource;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Symbol the error relates to, if any.
    pub symbol: Option<String>,
    /// RFC 3339 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    /// Incremented after every finished scan or recorded error.
    pub state_version: AtomicU64,

    pub config: ScannerConfig,
    pub source: Arc<dyn CandleSource>,
    /// Bearer token for `POST /api/v1/scan` (`PUSH_TOKEN`).
    pub push_token: Option<String>,

    pub last_scan: RwLock<Option<ScanSummary>>,
    pub next_scheduled: RwLock<Option<DateTime<Utc>>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    scan_in_progress: AtomicBool,

    pub start_time: std::time::Instant,
}

/// Held while a scan runs; clears the in-progress flag on drop.
pub struct ScanGuard {
    state: Arc<AppState>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.state.scan_in_progress.store(false, Ordering::SeqCst);
    }
}

impl AppState {
    pub fn new(config: ScannerConfig, source: Arc<dyn CandleSource>) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            config,
            source,
            push_token: None,
            last_scan: RwLock::new(None),
            next_scheduled: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            scan_in_progress: AtomicBool::new(false),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_push_token(mut self, token: Option<String>) -> Self {
        self.push_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error; the log keeps the newest [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, message: String, symbol: Option<String>) {
        let record = ErrorRecord {
            message,
            symbol,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        let excess = errors.len().saturating_sub(MAX_RECENT_ERRORS);
        if excess > 0 {
            errors.drain(..excess);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Scheduling ──────────────────────────────────────────────────────

    pub fn set_next_scheduled(&self, next: Option<DateTime<Utc>>) {
        *self.next_scheduled.write() = next;
    }

    pub fn scan_in_progress(&self) -> bool {
        self.scan_in_progress.load(Ordering::SeqCst)
    }

    // ── Scans ───────────────────────────────────────────────────────────

    /// Claim the single scan slot. `None` when a scan is already running.
    pub fn try_begin_scan(self: &Arc<Self>) -> Option<ScanGuard> {
        self.scan_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ScanGuard {
                state: Arc::clone(self),
            })
    }

    /// Run a scan under an already claimed slot and record its outcome.
    pub async fn run_claimed_scan(&self, guard: ScanGuard) -> Result<ScanSummary> {
        let _guard = guard;
        let outcome = scanner::execute(self.source.as_ref(), &self.config).await;

        match outcome {
            Ok(report) => {
                for failure in &report.failures {
                    self.push_error(failure.error.clone(), Some(failure.symbol.clone()));
                }
                if report.all_failed() {
                    warn!(run_id = %report.run_id, "every symbol failed in this scan");
                }

                let summary = report.summary(&self.config.output_csv, self.config.shortlist_min_score);
                *self.last_scan.write() = Some(summary.clone());
                self.increment_version();

                info!(run_id = %summary.run_id, duration_ms = summary.duration_ms, "scan recorded");
                Ok(summary)
            }
            Err(e) => {
                self.push_error(format!("scan failed: {e:#}"), None);
                Err(e)
            }
        }
    }

    /// Claim the slot and scan. `None` when a scan is already running.
    pub async fn run_scan_cycle(self: &Arc<Self>) -> Option<Result<ScanSummary>> {
        let guard = self.try_begin_scan()?;
        Some(self.run_claimed_scan(guard).await)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
