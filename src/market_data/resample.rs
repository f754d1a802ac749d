// =============================================================================
// Candle Resampling — build higher timeframes from lower ones
// =============================================================================
//
// Buckets are aligned to the UNIX epoch in UTC, so 4H buckets open at 00:00,
// 04:00, 08:00, ... Input must be oldest-first; gaps simply produce fewer
// source candles per bucket.
//
// A trailing bucket is closed only once its end time has passed; the last
// source bar may itself still be forming.

use chrono::{DateTime, Utc};

use super::candle::{Candle, Timeframe};

/// Aggregate `candles` into `timeframe` buckets.
///
/// open = first open, high = max high, low = min low, close = last close,
/// volume = sum. With `closed_as_of = Some(t)` a trailing bucket whose end is
/// after `t` is still forming and is dropped; `None` keeps it.
pub fn resample(
    candles: &[Candle],
    timeframe: Timeframe,
    closed_as_of: Option<DateTime<Utc>>,
) -> Vec<Candle> {
    let bucket_secs = timeframe.seconds();
    let mut out: Vec<Candle> = Vec::new();
    let mut last_bucket: Option<i64> = None;

    for c in candles {
        let bucket = c.open_time.timestamp().div_euclid(bucket_secs);
        if last_bucket == Some(bucket) {
            if let Some(agg) = out.last_mut() {
                agg.high = agg.high.max(c.high);
                agg.low = agg.low.min(c.low);
                agg.close = c.close;
                agg.volume += c.volume;
            }
        } else {
            let Some(open_time) = DateTime::from_timestamp(bucket * bucket_secs, 0) else {
                continue;
            };
            out.push(Candle::new(open_time, c.open, c.high, c.low, c.close, c.volume));
            last_bucket = Some(bucket);
        }
    }

    if let (Some(as_of), Some(agg)) = (closed_as_of, out.last()) {
        let bucket_end = agg.open_time.timestamp() + bucket_secs;
        if bucket_end > as_of.timestamp() {
            out.pop();
        }
    }

    out
}
