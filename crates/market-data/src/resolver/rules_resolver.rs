//! Rules resolver - deterministic pair and interval formatting.

use crate::models::{Pair, ProviderId, Timeframe};

use super::traits::{ProviderInstrument, SymbolResolver};

/// Resolves provider parameters from fixed per-provider format rules.
///
/// # Symbol formats
///
/// - `FINNHUB`: `OANDA:EUR_USD`
/// - `TWELVE_DATA`: `EUR/USD`
/// - `POLYGON`: `C:EURUSD`
/// - `ALPHA_VANTAGE`: separate `from_symbol`/`to_symbol`
#[derive(Clone, Debug, Default)]
pub struct RulesResolver;

impl RulesResolver {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolResolver for RulesResolver {
    fn resolve_instrument(&self, provider: ProviderId, pair: &Pair) -> Option<ProviderInstrument> {
        let (base, quote) = pair.legs()?;
        let instrument = match provider {
            ProviderId::Finnhub => ProviderInstrument::FxSymbol {
                symbol: format!("OANDA:{}_{}", base, quote),
            },
            ProviderId::TwelveData => ProviderInstrument::FxSymbol {
                symbol: format!("{}/{}", base, quote),
            },
            ProviderId::Polygon => ProviderInstrument::FxSymbol {
                symbol: format!("C:{}{}", base, quote),
            },
            ProviderId::AlphaVantage => ProviderInstrument::FxPair {
                from: base.to_string(),
                to: quote.to_string(),
            },
        };
        Some(instrument)
    }

    fn resolve_interval(&self, provider: ProviderId, timeframe: Timeframe) -> Option<&'static str> {
        use Timeframe::*;

        let code = match (provider, timeframe) {
            (ProviderId::Finnhub, M1) => "1",
            (ProviderId::Finnhub, M5) => "5",
            (ProviderId::Finnhub, M15) => "15",
            (ProviderId::Finnhub, M30) => "30",
            (ProviderId::Finnhub, H1) => "60",
            (ProviderId::Finnhub, H4) => return None,
            (ProviderId::Finnhub, D1) => "D",
            (ProviderId::Finnhub, W1) => "W",

            (ProviderId::AlphaVantage, M1) => "1min",
            (ProviderId::AlphaVantage, M5) => "5min",
            (ProviderId::AlphaVantage, M15) => "15min",
            (ProviderId::AlphaVantage, M30) => "30min",
            (ProviderId::AlphaVantage, H1) => "60min",
            (ProviderId::AlphaVantage, H4) => return None,
            (ProviderId::AlphaVantage, D1) => "daily",
            (ProviderId::AlphaVantage, W1) => "weekly",

            (ProviderId::TwelveData, M1) => "1min",
            (ProviderId::TwelveData, M5) => "5min",
            (ProviderId::TwelveData, M15) => "15min",
            (ProviderId::TwelveData, M30) => "30min",
            (ProviderId::TwelveData, H1) => "1h",
            (ProviderId::TwelveData, H4) => "4h",
            (ProviderId::TwelveData, D1) => "1day",
            (ProviderId::TwelveData, W1) => "1week",

            (ProviderId::Polygon, M1) => "1/minute",
            (ProviderId::Polygon, M5) => "5/minute",
            (ProviderId::Polygon, M15) => "15/minute",
            (ProviderId::Polygon, M30) => "30/minute",
            (ProviderId::Polygon, H1) => "1/hour",
            (ProviderId::Polygon, H4) => "4/hour",
            (ProviderId::Polygon, D1) => "1/day",
            (ProviderId::Polygon, W1) => "1/week",
        };
        Some(code)
    }
}
