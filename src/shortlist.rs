// =============================================================================
// Shortlist — EMA-based filter over a scan's rows
// =============================================================================
//
// A row is shortlisted when it is not an error row, its score reaches
// `min_score` (bias and momentum agree), and it matches the optional bias and
// recent-cross filters. Ordering: recent cross first, then score descending,
// then ticker.

use std::cmp::Ordering;

use crate::results::ScanRow;
use crate::types::Trend;

/// Filter applied to the results file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortlistFilter {
    pub min_score: u8,
    pub bias: Option<Trend>,
    pub cross_only: bool,
}

impl ShortlistFilter {
    pub fn with_min_score(min_score: u8) -> Self {
        Self {
            min_score,
            bias: None,
            cross_only: false,
        }
    }

    pub fn matches(&self, row: &ScanRow) -> bool {
        if row.is_error() {
            return false;
        }
        if row.score.unwrap_or(0) < self.min_score {
            return false;
        }
        if let Some(bias) = self.bias {
            if row.bias != bias {
                return false;
            }
        }
        if self.cross_only && row.ema_cross_recent != Some(true) {
            return false;
        }
        true
    }
}

impl Default for ShortlistFilter {
    fn default() -> Self {
        Self::with_min_score(1)
    }
}

/// Select and order the rows that pass `filter`.
pub fn build_shortlist(rows: &[ScanRow], filter: &ShortlistFilter) -> Vec<ScanRow> {
    let mut picked: Vec<ScanRow> = rows.iter().filter(|r| filter.matches(r)).cloned().collect();
    picked.sort_by(compare);
    picked
}

fn compare(a: &ScanRow, b: &ScanRow) -> Ordering {
    let cross = |r: &ScanRow| r.ema_cross_recent.unwrap_or(false);
    cross(b)
        .cmp(&cross(a))
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.ticker.cmp(&b.ticker))
}
