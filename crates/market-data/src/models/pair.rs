use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Currencies conventionally quoted against USD as `XXXUSD`.
const USD_QUOTED: &[&str] = &["EUR", "GBP", "AUD", "NZD", "XAU", "XAG"];

/// Canonical instrument code, e.g. `EURUSD` or `XAUUSD`.
///
/// Parsing strips separators (`EUR/USD`, `eur_usd`, `EUR-USD`) and
/// upper-cases the result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pair(String);

impl Pair {
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        let code: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if code.is_empty() {
            return Err(MarketDataError::Configuration(format!(
                "Invalid instrument pair: '{}'",
                raw
            )));
        }

        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base and quote currency for six-letter FX/metal codes.
    pub fn legs(&self) -> Option<(&str, &str)> {
        if self.0.len() == 6 && self.0.chars().all(|c| c.is_ascii_alphabetic()) {
            Some((&self.0[..3], &self.0[3..]))
        } else {
            None
        }
    }

    /// Pip size used for spread reporting.
    pub fn pip_size(&self) -> f64 {
        match self.legs() {
            Some((_, "JPY")) => 0.01,
            Some(("XAU", _)) => 0.1,
            _ => 0.0001,
        }
    }

    /// True for FX crosses with no USD leg, which can be derived from two
    /// USD pairs.
    pub fn is_cross(&self) -> bool {
        matches!(self.legs(), Some((base, quote)) if base != "USD" && quote != "USD")
    }

    /// The USD pair for `currency` in market convention, and whether its
    /// price is USD per unit of `currency` (`true` for `EURUSD`, `false`
    /// for `USDJPY`).
    pub fn usd_leg(currency: &str) -> (Pair, bool) {
        if USD_QUOTED.contains(&currency) {
            (Pair(format!("{}USD", currency)), true)
        } else {
            (Pair(format!("USD{}", currency)), false)
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
