// =============================================================================
// HTF Scanner — library root
// =============================================================================
//
// Scans a watchlist of FX pairs, indices and commodities on the 4H timeframe,
// classifies each against EMA34 / EMA200, writes `scan_results.csv` and serves
// the shortlist over HTTP. The `htf-scanner` binary wires these together.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod config;
pub mod htf_analysis;
pub mod indicators;
pub mod market_data;
pub mod results;
pub mod scanner;
pub mod scheduler;
pub mod setup;
pub mod shortlist;
pub mod types;
pub mod yahoo;
