use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle. Series are kept oldest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Absolute size of the candle body.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// Close prices of `candles`, skipping non-finite values.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| c.close)
        .filter(|c| c.is_finite())
        .collect()
}

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// Candle timeframes understood by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    Minute15,
    Hour1,
    Hour4,
    Day1,
}

impl Timeframe {
    /// Bucket length in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Self::Minute15 => 15 * 60,
            Self::Hour1 => 60 * 60,
            Self::Hour4 => 4 * 60 * 60,
            Self::Day1 => 24 * 60 * 60,
        }
    }

    /// Interval string Yahoo accepts directly, or `None` when the timeframe
    /// has to be built by resampling [`Timeframe::source`].
    pub fn yahoo_interval(self) -> Option<&'static str> {
        match self {
            Self::Minute15 => Some("15m"),
            Self::Hour1 => Some("60m"),
            Self::Hour4 => None,
            Self::Day1 => Some("1d"),
        }
    }

    /// Timeframe to download when this one is not native.
    pub fn source(self) -> Self {
        match self {
            Self::Hour4 => Self::Hour1,
            other => other,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute15 => write!(f, "15m"),
            Self::Hour1 => write!(f, "1h"),
            Self::Hour4 => write!(f, "4h"),
            Self::Day1 => write!(f, "1d"),
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "15m" => Ok(Self::Minute15),
            "1h" | "60m" => Ok(Self::Hour1),
            "4h" | "240m" => Ok(Self::Hour4),
            "1d" => Ok(Self::Day1),
            other => anyhow::bail!("unsupported timeframe '{other}' (expected 15m, 1h, 4h or 1d)"),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timeframe_parse_and_display() {
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::Hour4);
        assert_eq!("60m".parse::<Timeframe>().unwrap(), Timeframe::Hour1);
        assert_eq!(Timeframe::Hour4.to_string(), "4h");
        assert!("3h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn four_hour_is_resampled_from_hourly() {
        assert_eq!(Timeframe::Hour4.yahoo_interval(), None);
        assert_eq!(Timeframe::Hour4.source(), Timeframe::Hour1);
        assert_eq!(Timeframe::Hour1.yahoo_interval(), Some("60m"));
        assert_eq!(Timeframe::Day1.source(), Timeframe::Day1);
    }

    #[test]
    fn timeframe_serde_uses_strings() {
        let tf: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(tf, Timeframe::Day1);
        assert_eq!(serde_json::to_string(&Timeframe::Hour4).unwrap(), "\"4h\"");
        assert!(serde_json::from_str::<Timeframe>("\"2w\"").is_err());
    }

    #[test]
    fn closes_skips_non_finite() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = vec![
            Candle::new(t, 1.0, 1.0, 1.0, 1.0, 0.0),
            Candle::new(t, 1.0, 1.0, 1.0, f64::NAN, 0.0),
            Candle::new(t, 1.0, 2.0, 1.0, 2.0, 0.0),
        ];
        assert_eq!(closes(&candles), vec![1.0, 2.0]);
        assert!((candles[2].body() - 1.0).abs() < f64::EPSILON);
    }
}
