// =============================================================================
// Shared types used across the HTF scanner
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional read of price against an EMA.
///
/// `Error` only appears on rows for symbols that could not be scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bull,
    Bear,
    #[default]
    Neutral,
    Error,
}

impl Trend {
    /// Classify `price` against `reference`. A missing reference is neutral.
    pub fn from_price(price: f64, reference: Option<f64>) -> Self {
        match reference {
            Some(r) if price > r => Self::Bull,
            Some(r) if price < r => Self::Bear,
            _ => Self::Neutral,
        }
    }

    pub fn is_directional(self) -> bool {
        matches!(self, Self::Bull | Self::Bear)
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bull => write!(f, "bull"),
            Self::Bear => write!(f, "bear"),
            Self::Neutral => write!(f, "neutral"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Trend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bull" => Ok(Self::Bull),
            "bear" => Ok(Self::Bear),
            "neutral" => Ok(Self::Neutral),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("unknown trend '{other}' (expected bull, bear, neutral or error)"),
        }
    }
}

/// Trade direction used by the setup checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_from_price() {
        assert_eq!(Trend::from_price(1.2, Some(1.1)), Trend::Bull);
        assert_eq!(Trend::from_price(1.0, Some(1.1)), Trend::Bear);
        assert_eq!(Trend::from_price(1.1, Some(1.1)), Trend::Neutral);
        assert_eq!(Trend::from_price(1.1, None), Trend::Neutral);
    }

    #[test]
    fn trend_parses_case_insensitively() {
        assert_eq!("BULL".parse::<Trend>().unwrap(), Trend::Bull);
        assert_eq!(" bear ".parse::<Trend>().unwrap(), Trend::Bear);
        assert!("sideways".parse::<Trend>().is_err());
    }

    #[test]
    fn trend_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Trend::Neutral).unwrap(), "\"neutral\"");
    }

    #[test]
    fn trend_defaults_to_neutral() {
        assert_eq!(Trend::default(), Trend::Neutral);
    }
}
