use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Upstream market data sources known to the system.
///
/// The set is fixed: priority tables, rate-limit defaults and the health
/// snapshot are all keyed by these variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderId {
    TwelveData,
    Finnhub,
    AlphaVantage,
    Polygon,
}

impl ProviderId {
    /// All providers, in declaration order.
    pub const ALL: [ProviderId; 4] = [
        ProviderId::TwelveData,
        ProviderId::Finnhub,
        ProviderId::AlphaVantage,
        ProviderId::Polygon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwelveData => "TWELVE_DATA",
            Self::Finnhub => "FINNHUB",
            Self::AlphaVantage => "ALPHA_VANTAGE",
            Self::Polygon => "POLYGON",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "TWELVE_DATA" | "TWELVEDATA" => Ok(Self::TwelveData),
            "FINNHUB" => Ok(Self::Finnhub),
            "ALPHA_VANTAGE" | "ALPHAVANTAGE" => Ok(Self::AlphaVantage),
            "POLYGON" => Ok(Self::Polygon),
            _ => Err(MarketDataError::Configuration(format!(
                "Unknown provider: {}",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_parse() {
        assert_eq!("finnhub".parse::<ProviderId>().unwrap(), ProviderId::Finnhub);
        assert_eq!(
            "alpha-vantage".parse::<ProviderId>().unwrap(),
            ProviderId::AlphaVantage
        );
        assert_eq!("TwelveData".parse::<ProviderId>().unwrap(), ProviderId::TwelveData);
        assert!("YAHOO".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_provider_id_serde() {
        let json = serde_json::to_string(&ProviderId::AlphaVantage).unwrap();
        assert_eq!(json, "\"ALPHA_VANTAGE\"");
        let back: ProviderId = serde_json::from_str("\"TWELVE_DATA\"").unwrap();
        assert_eq!(back, ProviderId::TwelveData);
    }
}
