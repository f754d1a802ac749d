// =============================================================================
// EMA Cross Detection
// =============================================================================
//
// Both helpers align the fast and slow series on their most recent values, so
// SMA-seeded series of different lengths compare bar-for-bar.

/// Differences `fast - slow` over the overlapping tail of both series,
/// oldest first.
fn aligned_diff(fast: &[f64], slow: &[f64]) -> Vec<f64> {
    let n = fast.len().min(slow.len());
    let fast = &fast[fast.len() - n..];
    let slow = &slow[slow.len() - n..];
    fast.iter()
        .zip(slow)
        .map(|(f, s)| f - s)
        .filter(|d| d.is_finite())
        .collect()
}

/// Return `true` when `fast - slow` changed sign between the first and last
/// of the most recent `lookback` aligned points.
///
/// Returns `false` when fewer than `lookback` points are available or
/// `lookback < 2`. Touching zero on either end is not a cross.
pub fn detect_recent_cross(fast: &[f64], slow: &[f64], lookback: usize) -> bool {
    if lookback < 2 {
        return false;
    }
    let diff = aligned_diff(fast, slow);
    if diff.len() < lookback {
        return false;
    }
    let window = &diff[diff.len() - lookback..];
    window[0] * window[lookback - 1] < 0.0
}

/// Number of bars since the most recent sign change of `fast - slow`.
///
/// `Some(0)` means the cross happened on the latest bar. `None` when the
/// series never crossed.
pub fn bars_since_cross(fast: &[f64], slow: &[f64]) -> Option<usize> {
    let diff = aligned_diff(fast, slow);
    let last = diff.len().checked_sub(1)?;
    (1..diff.len())
        .rev()
        .find(|&i| diff[i - 1] * diff[i] < 0.0)
        .map(|i| last - i)
}
