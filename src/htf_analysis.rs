// =============================================================================
// Higher Time Frame (HTF) Trend Analysis
// =============================================================================
//
// Reads a single HTF candle series (4H by default) against a fast and a slow
// EMA (34 / 200):
//
//   bias      = last close vs slow EMA   (bull / bear / neutral)
//   momentum  = last close vs fast EMA   (bull / bear / neutral)
//   score     = 1 when bias and momentum agree on a direction, else 0
//   cross     = fast - slow changed sign within the last `cross_lookback` bars

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScannerConfig;
use crate::indicators::{bars_since_cross, detect_recent_cross, ema, last_finite, EmaSeed};
use crate::market_data::{closes, Candle};
use crate::types::Trend;

/// Indicator settings for [`analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtfParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub cross_lookback: usize,
    pub seed: EmaSeed,
}

impl Default for HtfParams {
    fn default() -> Self {
        Self {
            fast_period: 34,
            slow_period: 200,
            cross_lookback: 3,
            seed: EmaSeed::First,
        }
    }
}

impl From<&ScannerConfig> for HtfParams {
    fn from(cfg: &ScannerConfig) -> Self {
        Self {
            fast_period: cfg.fast_period,
            slow_period: cfg.slow_period,
            cross_lookback: cfg.cross_lookback,
            seed: cfg.ema_seed,
        }
    }
}

/// Snapshot of the HTF analysis for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtfAnalysis {
    pub last_close: f64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub bias: Trend,
    pub momentum: Trend,
    pub ema_cross_recent: bool,
    pub bars_since_cross: Option<usize>,
    pub score: u8,
    pub candles: usize,
    /// Set when the series is shorter than the slow EMA period.
    pub insufficient_history: bool,
}

impl HtfAnalysis {
    /// Free-text remarks for the report's `notes` column.
    pub fn notes(&self, slow_period: usize) -> String {
        if self.insufficient_history {
            format!(
                "insufficient history: {} candles < EMA{} period",
                self.candles, slow_period
            )
        } else {
            String::new()
        }
    }
}

/// Analyze `candles` (oldest first).
///
/// Returns `None` when there is no usable close price.
pub fn analyze(candles: &[Candle], params: &HtfParams) -> Option<HtfAnalysis> {
    let closes = closes(candles);
    let last_close = *closes.last()?;

    let fast = ema(&closes, params.fast_period, params.seed);
    let slow = ema(&closes, params.slow_period, params.seed);

    let ema_fast = last_finite(&fast);
    let ema_slow = last_finite(&slow);

    let bias = Trend::from_price(last_close, ema_slow);
    let momentum = Trend::from_price(last_close, ema_fast);

    let score = u8::from(bias == momentum && bias.is_directional());
    let ema_cross_recent = detect_recent_cross(&fast, &slow, params.cross_lookback);

    let analysis = HtfAnalysis {
        last_close,
        ema_fast,
        ema_slow,
        bias,
        momentum,
        ema_cross_recent,
        bars_since_cross: bars_since_cross(&fast, &slow),
        score,
        candles: closes.len(),
        insufficient_history: closes.len() < params.slow_period,
    };

    debug!(
        close = last_close,
        ema_fast = ?ema_fast,
        ema_slow = ?ema_slow,
        bias = %bias,
        momentum = %momentum,
        cross = ema_cross_recent,
        "HTF analysis complete"
    );

    Some(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(t0 + chrono::Duration::hours(4 * i as i64), c, c, c, c, 0.0))
            .collect()
    }

    fn rising(n: usize) -> Vec<f64> {
        (1..=n).map(|i| 100.0 + i as f64 * 0.1).collect()
    }

    #[test]
    fn empty_series_yields_none() {
        assert!(analyze(&[], &HtfParams::default()).is_none());
    }

    #[test]
    fn rising_series_is_bullish_and_scores() {
        let a = analyze(&series(&rising(300)), &HtfParams::default()).unwrap();
        assert_eq!(a.bias, Trend::Bull);
        assert_eq!(a.momentum, Trend::Bull);
        assert_eq!(a.score, 1);
        assert!(!a.ema_cross_recent);
        assert!(!a.insufficient_history);
        assert!(a.ema_fast.unwrap() > a.ema_slow.unwrap());
    }

    #[test]
    fn falling_series_is_bearish() {
        let mut closes = rising(300);
        closes.reverse();
        let a = analyze(&series(&closes), &HtfParams::default()).unwrap();
        assert_eq!(a.bias, Trend::Bear);
        assert_eq!(a.momentum, Trend::Bear);
        assert_eq!(a.score, 1);
    }

    #[test]
    fn flat_series_is_neutral_without_score() {
        let a = analyze(&series(&[1.25; 250]), &HtfParams::default()).unwrap();
        assert_eq!(a.bias, Trend::Neutral);
        assert_eq!(a.momentum, Trend::Neutral);
        assert_eq!(a.score, 0);
    }

    #[test]
    fn pullback_against_trend_disagrees() {
        // Long uptrend, then a sharp drop below the fast EMA but still above
        // the slow one.
        let mut closes = rising(300);
        let last = *closes.last().unwrap();
        closes.extend([last - 3.0, last - 3.5]);
        let a = analyze(&series(&closes), &HtfParams::default()).unwrap();
        assert_eq!(a.bias, Trend::Bull);
        assert_eq!(a.momentum, Trend::Bear);
        assert_eq!(a.score, 0);
    }

    #[test]
    fn short_history_is_flagged_but_analyzed() {
        let a = analyze(&series(&rising(50)), &HtfParams::default()).unwrap();
        assert!(a.insufficient_history);
        assert!(a.ema_slow.is_some());
        assert!(a.notes(200).contains("50 candles"));
    }

    #[test]
    fn sma_seed_without_enough_history_is_neutral_bias() {
        let params = HtfParams {
            seed: EmaSeed::Sma,
            ..HtfParams::default()
        };
        let a = analyze(&series(&rising(50)), &params).unwrap();
        assert!(a.ema_slow.is_none());
        assert_eq!(a.bias, Trend::Neutral);
        assert_eq!(a.momentum, Trend::Bull);
        assert_eq!(a.score, 0);
    }

    #[test]
    fn fresh_cross_is_detected() {
        // Flat, then a strong rally pulls EMA34 through EMA200 at the end.
        let params = HtfParams {
            fast_period: 3,
            slow_period: 10,
            cross_lookback: 3,
            seed: EmaSeed::First,
        };
        let mut closes = vec![10.0; 20];
        closes.extend([9.0, 9.0, 9.0, 13.0, 14.0]);
        let a = analyze(&series(&closes), &params).unwrap();
        assert!(a.ema_cross_recent);
        assert_eq!(a.bias, Trend::Bull);
    }
}
