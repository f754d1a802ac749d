pub mod candle;
pub mod resample;

// Re-export for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::{closes, Candle, Timeframe};
pub use resample::resample;
