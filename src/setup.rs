// =============================================================================
// London-Session Setup Check
// =============================================================================
//
// Evaluates a single annotated bar against the entry checklist, in order,
// and reports the first failing step:
//
//   1. Session        — bar time within the London window (07:00-11:00 UTC)
//   2. EMA cross      — after the last cross, skipping the first session
//   3. Bias           — close and fast EMA on the trade side of the slow EMA
//   4. Liquidity sweep
//   5. Confirmation   — body >= average body, small entry-direction wick
//   6. Retest
//   7. SL/TP          — stop distance within bounds, target reachable
//   8. Lot size
//
// Sweep, retest, stop zone and reachability are annotations supplied by the
// caller; this module only sequences the checks.
// =============================================================================

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::types::Side;

/// Candles required for the average-body reference.
const BODY_LOOKBACK: usize = 14;

fn london_open() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn london_close() -> NaiveTime {
    NaiveTime::from_hms_opt(11, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// `true` when `t` falls within 07:00-11:00 UTC, both ends inclusive.
pub fn is_london_session(t: DateTime<Utc>) -> bool {
    let time = t.time();
    time >= london_open() && time <= london_close()
}

/// Mean absolute body of the last `n` candles; `0.0` when there are none.
pub fn average_body(candles: &[Candle], n: usize) -> f64 {
    let start = candles.len().saturating_sub(n);
    let window = &candles[start..];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(Candle::body).sum::<f64>() / window.len() as f64
}

/// The bar under evaluation plus the caller's annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub liquidity_sweep: bool,
    #[serde(default)]
    pub retest_confirmed: bool,
    #[serde(default)]
    pub sl_zone: Option<f64>,
    #[serde(default = "default_true")]
    pub can_reach_tp: bool,
    #[serde(default)]
    pub setup_score: f64,
}

fn default_true() -> bool {
    true
}

/// Thresholds for [`check_setup`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupParams {
    pub side: Side,
    pub min_sl_distance: f64,
    pub max_sl_distance: f64,
    pub rr_target: f64,
    /// Largest wick allowed in the entry direction; defaults to 10% of the
    /// average body.
    #[serde(default)]
    pub max_entry_wick: Option<f64>,
    #[serde(default = "default_lot")]
    pub fixed_lot: f64,
}

fn default_lot() -> f64 {
    1.0
}

/// Why a bar is not a setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    OutsideLondonSession,
    BeforeEmaCross,
    FirstSessionAfterCross,
    BiasNotAligned(Side),
    NoLiquiditySweep,
    NotEnoughHistory,
    BodyTooSmall,
    WickTooLarge,
    NoRetest,
    NoStopZone,
    StopTooTight,
    StopTooWide,
    TargetNotFeasible,
    InvalidLotSize,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideLondonSession => write!(f, "Not London session"),
            Self::BeforeEmaCross => write!(f, "Before EMA cross"),
            Self::FirstSessionAfterCross => write!(f, "First session after EMA cross"),
            Self::BiasNotAligned(side) => write!(f, "Bias not aligned for {side}"),
            Self::NoLiquiditySweep => write!(f, "No liquidity sweep"),
            Self::NotEnoughHistory => write!(f, "Not enough candles for average body"),
            Self::BodyTooSmall => write!(f, "Body not big enough"),
            Self::WickTooLarge => write!(f, "Wick too large in entry direction"),
            Self::NoRetest => write!(f, "No retest"),
            Self::NoStopZone => write!(f, "No SL zone info"),
            Self::StopTooTight => write!(f, "SL too tight"),
            Self::StopTooWide => write!(f, "SL too wide"),
            Self::TargetNotFeasible => write!(f, "RR target not feasible"),
            Self::InvalidLotSize => write!(f, "Invalid lot size"),
        }
    }
}

/// Order levels for an accepted setup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupDetails {
    pub side: Side,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub score: f64,
    pub lot_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupVerdict {
    Candidate(SetupDetails),
    Rejected(RejectReason),
}

impl SetupVerdict {
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::Candidate(_))
    }
}

/// Run the checklist for `bar` at index `current_idx`.
///
/// `history` holds the candles before the bar (oldest first);
/// `last_cross_idx` is the bar index of the most recent EMA cross.
pub fn check_setup(
    bar: &SetupBar,
    last_cross_idx: usize,
    current_idx: usize,
    history: &[Candle],
    params: &SetupParams,
) -> SetupVerdict {
    use RejectReason::*;
    use SetupVerdict::Rejected;

    if !is_london_session(bar.time) {
        return Rejected(OutsideLondonSession);
    }

    if current_idx <= last_cross_idx {
        return Rejected(BeforeEmaCross);
    }
    if current_idx - last_cross_idx == 1 {
        return Rejected(FirstSessionAfterCross);
    }

    let aligned = match params.side {
        Side::Long => bar.close > bar.ema_slow && bar.ema_fast > bar.ema_slow,
        Side::Short => bar.close < bar.ema_slow && bar.ema_fast < bar.ema_slow,
    };
    if !aligned {
        return Rejected(BiasNotAligned(params.side));
    }

    if !bar.liquidity_sweep {
        return Rejected(NoLiquiditySweep);
    }

    if history.len() < BODY_LOOKBACK {
        return Rejected(NotEnoughHistory);
    }
    let avg_body = average_body(history, BODY_LOOKBACK);
    let body = (bar.close - bar.open).abs();
    if body < avg_body {
        return Rejected(BodyTooSmall);
    }
    let wick = match params.side {
        Side::Long => bar.high - bar.close,
        Side::Short => bar.close - bar.low,
    };
    let max_wick = params.max_entry_wick.unwrap_or(0.1 * avg_body);
    if wick > max_wick {
        return Rejected(WickTooLarge);
    }

    if !bar.retest_confirmed {
        return Rejected(NoRetest);
    }

    let Some(sl) = bar.sl_zone.filter(|z| *z != 0.0) else {
        return Rejected(NoStopZone);
    };
    let sl_distance = (bar.entry_price - sl).abs();
    if sl_distance < params.min_sl_distance {
        return Rejected(StopTooTight);
    }
    if sl_distance > params.max_sl_distance {
        return Rejected(StopTooWide);
    }
    if !bar.can_reach_tp {
        return Rejected(TargetNotFeasible);
    }

    if params.fixed_lot <= 0.0 {
        return Rejected(InvalidLotSize);
    }

    let tp_distance = params.rr_target * sl_distance;
    let tp = match params.side {
        Side::Long => bar.entry_price + tp_distance,
        Side::Short => bar.entry_price - tp_distance,
    };

    SetupVerdict::Candidate(SetupDetails {
        side: params.side,
        entry: bar.entry_price,
        sl,
        tp,
        score: bar.setup_score,
        lot_size: params.fixed_lot,
    })
}
