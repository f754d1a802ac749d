// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free EMA and cross helpers. Insufficient data yields an
// empty series, `None` or `false`, never a panic.

pub mod cross;
pub mod ema;

pub use cross::{bars_since_cross, detect_recent_cross};
pub use ema::{ema, last_finite, EmaSeed};
