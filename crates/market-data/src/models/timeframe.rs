use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Canonical bar interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

/// Ranking class of a timeframe; each class has its own base provider order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeframeClass {
    /// Intraday timeframes of 30 minutes or less.
    Fast,
    /// Multi-hour timeframes (4 hours and up, below daily).
    Slow,
    /// Daily and weekly bars.
    Daily,
    /// Anything else; ranked with the fast table.
    Unclassified,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Seconds covered by one bar.
    pub fn seconds(&self) -> u64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1_800,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
            Self::W1 => 604_800,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    pub fn millis(&self) -> i64 {
        self.seconds() as i64 * 1_000
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::W1 => "W1",
        }
    }

    pub fn class(&self) -> TimeframeClass {
        match self {
            Self::M1 | Self::M5 | Self::M15 | Self::M30 => TimeframeClass::Fast,
            Self::H4 => TimeframeClass::Slow,
            Self::D1 | Self::W1 => TimeframeClass::Daily,
            Self::H1 => TimeframeClass::Unclassified,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    /// Accepts the canonical code and the common spellings used by
    /// upstream APIs and callers ("1h", "H1", "60m", "60min", "hourly", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let alias = s.trim().to_ascii_lowercase();
        let timeframe = match alias.as_str() {
            "m1" | "1m" | "1min" | "1minute" => Self::M1,
            "m5" | "5m" | "5min" | "5minute" => Self::M5,
            "m15" | "15m" | "15min" | "15minute" => Self::M15,
            "m30" | "30m" | "30min" | "30minute" => Self::M30,
            "h1" | "1h" | "60m" | "60min" | "1hour" | "hourly" => Self::H1,
            "h4" | "4h" | "240m" | "240min" | "4hour" => Self::H4,
            "d1" | "1d" | "d" | "day" | "1day" | "daily" => Self::D1,
            "w1" | "1w" | "w" | "week" | "1week" | "weekly" => Self::W1,
            _ => return Err(MarketDataError::UnsupportedTimeframe(s.to_string())),
        };
        Ok(timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_one_code() {
        for alias in ["1h", "H1", "60m", "60min", "hourly", " h1 "] {
            assert_eq!(alias.parse::<Timeframe>().unwrap(), Timeframe::H1, "{}", alias);
        }
        assert_eq!("15min".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("daily".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert_eq!("240m".parse::<Timeframe>().unwrap(), Timeframe::H4);
    }

    #[test]
    fn test_unknown_alias_is_rejected() {
        let err = "7m".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, MarketDataError::UnsupportedTimeframe(_)));
    }

    #[test]
    fn test_seconds_per_bar() {
        assert_eq!(Timeframe::M15.seconds(), 900);
        assert_eq!(Timeframe::M15.millis(), 900_000);
        assert_eq!(Timeframe::W1.duration(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_classes() {
        assert_eq!(Timeframe::M30.class(), TimeframeClass::Fast);
        assert_eq!(Timeframe::H1.class(), TimeframeClass::Unclassified);
        assert_eq!(Timeframe::H4.class(), TimeframeClass::Slow);
        assert_eq!(Timeframe::W1.class(), TimeframeClass::Daily);
    }
}
