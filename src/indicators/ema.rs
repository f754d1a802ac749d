// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha = 2 / (span + 1)
//   EMA_t = close_t * alpha + EMA_{t-1} * (1 - alpha)
//
// Two seeding conventions are supported:
//   - First: EMA_0 = close_0, one output per input (the scanner default).
//   - Sma:   EMA_{period-1} = SMA of the first `period` closes.
// =============================================================================

use serde::{Deserialize, Serialize};

/// How the first EMA value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmaSeed {
    /// Seed on the first observation; the output has the input's length.
    #[default]
    First,
    /// Seed with the SMA of the first `period` values; warm-up bars are dropped.
    Sma,
}

impl std::fmt::Display for EmaSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Sma => write!(f, "sma"),
        }
    }
}

/// Compute an EMA series with the given seeding convention.
pub fn ema(values: &[f64], period: usize, seed: EmaSeed) -> Vec<f64> {
    match seed {
        EmaSeed::First => ewm_span(values, period),
        EmaSeed::Sma => calculate_ema(values, period),
    }
}

/// Exponentially weighted mean over `span`, seeded on the first value.
///
/// Output element `i` is the EMA as of input `i`. Returns an empty `Vec` when
/// the input is empty or `span == 0`. A non-finite value ends the series.
pub fn ewm_span(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 || values.is_empty() {
        return Vec::new();
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());

    let mut prev = values[0];
    if !prev.is_finite() {
        return Vec::new();
    }
    result.push(prev);

    for &v in &values[1..] {
        // prev + alpha * (v - prev) keeps a constant series exactly constant.
        let next = prev + alpha * (v - prev);
        if !next.is_finite() {
            break;
        }
        result.push(next);
        prev = next;
    }

    result
}

/// Compute the SMA-seeded EMA series for `closes` and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            // Downstream consumers should not trust a broken series.
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Last finite element of `series`, if any.
pub fn last_finite(series: &[f64]) -> Option<f64> {
    series.iter().rev().copied().find(|v| v.is_finite())
}
