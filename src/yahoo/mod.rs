pub mod client;
pub mod retry;

use anyhow::Result;
use async_trait::async_trait;

use crate::market_data::{Candle, Timeframe};

pub use client::YahooClient;
pub use retry::{fetch_with_retries, RetryPolicy};

/// Anything that can supply historical candles for a symbol.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch `lookback_days` of `timeframe` candles for `symbol`, oldest
    /// first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Vec<Candle>>;
}
