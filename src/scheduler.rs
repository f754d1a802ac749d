// =============================================================================
// Scan Scheduler — cron-driven scans for `serve`
// =============================================================================
//
// Expressions use the six/seven-field `cron` syntax (seconds first) and are
// evaluated in UTC. The default `0 5 0/4 * * *` fires five minutes after each
// 4H candle closes.
// =============================================================================

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{error, info, warn};

use crate::app_state::AppState;

/// A parsed scan schedule.
#[derive(Debug, Clone)]
pub struct ScanSchedule {
    expr: String,
    schedule: Schedule,
}

impl ScanSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expr.trim())
            .with_context(|| format!("invalid cron expression: {expr:?}"))?;
        Ok(Self {
            expr: expr.trim().to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }
}

/// Run scans on `schedule` until the task is dropped.
pub async fn run_scheduled_scans(state: Arc<AppState>, schedule: ScanSchedule) {
    info!(schedule = %schedule.expr(), "scan scheduler started");

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(schedule = %schedule.expr(), "schedule has no upcoming fire time, stopping");
            state.set_next_scheduled(None);
            return;
        };
        state.set_next_scheduled(Some(next));

        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), wait_secs = wait.as_secs(), "next scheduled scan");
        tokio::time::sleep(wait).await;

        match state.run_scan_cycle().await {
            Some(Ok(summary)) => info!(
                run_id = %summary.run_id,
                rows = summary.rows_written,
                shortlisted = summary.shortlisted,
                "scheduled scan complete"
            ),
            Some(Err(e)) => error!(error = %e, "scheduled scan failed"),
            None => warn!("previous scan still running, skipping this slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScannerConfig, WatchItem};
    use crate::market_data::{Candle, Timeframe};
    use crate::yahoo::CandleSource;
    use async_trait::async_trait;
    use chrono::{TimeZone, Timelike};
    use std::time::Duration;

    struct Flat;

    #[async_trait]
    impl CandleSource for Flat {
        async fn fetch_candles(&self, _: &str, _: Timeframe, _: u32) -> Result<Vec<Candle>> {
            Ok(vec![Candle::new(Utc::now(), 1.0, 1.0, 1.0, 1.0, 0.0); 10])
        }
    }

    #[test]
    fn default_schedule_fires_after_4h_closes() {
        let s = ScanSchedule::parse("0 5 0/4 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
        let next = s.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 12, 5, 0).unwrap());

        let after = s.next_after(next).unwrap();
        assert_eq!(after.hour(), 16);
        assert_eq!(after.minute(), 5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(ScanSchedule::parse("every four hours").is_err());
        assert!(ScanSchedule::parse("").is_err());
    }

    #[test]
    fn trims_expression() {
        let s = ScanSchedule::parse("  0 0 * * * *  ").unwrap();
        assert_eq!(s.expr(), "0 0 * * * *");
    }

    #[tokio::test]
    async fn loop_skips_busy_slots_then_scans() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig {
            watchlist: vec![WatchItem::new("GBPUSD=X")],
            output_csv: dir.path().join("out.csv").display().to_string(),
            retries: 1,
            ..ScannerConfig::default()
        };
        let st = Arc::new(AppState::new(config, Arc::new(Flat)));

        let busy = st.try_begin_scan().unwrap();
        let every_second = ScanSchedule::parse("* * * * * *").unwrap();
        let handle = tokio::spawn(run_scheduled_scans(st.clone(), every_second));

        // At least one slot fires while the manual scan holds the guard.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(st.next_scheduled.read().is_some());
        assert!(st.last_scan.read().is_none());

        drop(busy);
        for _ in 0..50 {
            if st.last_scan.read().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        handle.abort();

        let last = st.last_scan.read().clone().expect("scheduled scan recorded");
        assert_eq!(last.rows_written, 1);
        assert!(std::path::Path::new(&st.config.output_csv).exists());
    }
}
