use serde::{Deserialize, Serialize};

use super::pair::Pair;

/// Live bid/ask quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Bid/ask midpoint when both sides are present, otherwise the raw price.
    pub mid: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_pips: Option<f64>,
    /// Quote time, epoch milliseconds.
    pub timestamp: i64,
    pub provider: String,
}

impl Quote {
    /// Build a quote from whatever sides a provider returned.
    ///
    /// Non-finite inputs are treated as missing. Returns `None` when no
    /// usable price remains.
    pub fn from_prices(
        pair: &Pair,
        bid: Option<f64>,
        ask: Option<f64>,
        price: Option<f64>,
        timestamp: i64,
        provider: impl Into<String>,
    ) -> Option<Self> {
        let bid = bid.filter(|v| v.is_finite());
        let ask = ask.filter(|v| v.is_finite());
        let price = price.filter(|v| v.is_finite());

        let (mid, spread_pips) = match (bid, ask) {
            (Some(b), Some(a)) => ((b + a) / 2.0, Some((a - b) / pair.pip_size())),
            (b, a) => (price.or(b).or(a)?, None),
        };

        Some(Self {
            bid,
            ask,
            mid,
            spread_pips,
            timestamp,
            provider: provider.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_from_both_sides() {
        let pair = Pair::parse("EURUSD").unwrap();
        let quote = Quote::from_prices(&pair, Some(1.1000), Some(1.1002), Some(9.0), 0, "X").unwrap();
        assert!((quote.mid - 1.1001).abs() < 1e-12);
        assert!((quote.spread_pips.unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mid_falls_back_to_price() {
        let pair = Pair::parse("USDJPY").unwrap();
        let quote = Quote::from_prices(&pair, Some(150.0), None, Some(150.2), 0, "X").unwrap();
        assert_eq!(quote.mid, 150.2);
        assert!(quote.spread_pips.is_none());
    }

    #[test]
    fn test_no_price_yields_none() {
        let pair = Pair::parse("EURUSD").unwrap();
        assert!(Quote::from_prices(&pair, Some(f64::NAN), None, None, 0, "X").is_none());
    }
}
