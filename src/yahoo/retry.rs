// =============================================================================
// Download Retries — exponential backoff around a CandleSource
// =============================================================================
//
// An attempt fails on an error or on an empty candle list. Between attempts
// the task sleeps `backoff_base ^ (attempt - 1)` seconds: 1s, 2s, 4s, ...
// with the default base of 2. No sleep follows the final attempt.
// =============================================================================

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use super::CandleSource;
use crate::market_data::{Candle, Timeframe};

/// Retry settings for a single symbol download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_base_secs: u64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff_base_secs: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_base_secs,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        Duration::from_secs(self.backoff_base_secs.saturating_pow(exp))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Fetch candles for `symbol`, retrying per `policy`.
///
/// Returns the last download error when every attempt failed, or a
/// "no data" error when the final failures were empty responses.
pub async fn fetch_with_retries(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: Timeframe,
    lookback_days: u32,
    policy: &RetryPolicy,
) -> Result<Vec<Candle>> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 1..=policy.attempts {
        info!(symbol, attempt, attempts = policy.attempts, "downloading candles");

        match source.fetch_candles(symbol, timeframe, lookback_days).await {
            Ok(candles) if !candles.is_empty() => {
                info!(symbol, rows = candles.len(), "downloaded candles");
                return Ok(candles);
            }
            Ok(_) => {
                warn!(symbol, attempt, "no data returned");
            }
            Err(e) => {
                warn!(symbol, attempt, error = %e, "download failed");
                last_err = Some(e);
            }
        }

        if attempt < policy.attempts {
            let delay = policy.delay_after(attempt);
            info!(symbol, delay_secs = delay.as_secs(), "sleeping before retry");
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_err.unwrap_or_else(|| {
        anyhow::anyhow!(
            "failed to download {symbol}: no data after {} attempts",
            policy.attempts
        )
    }))
}
