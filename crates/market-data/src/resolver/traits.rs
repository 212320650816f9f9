//! Resolution traits for the market data crate.
//!
//! Adapters hold no instrument catalog. The coordinator resolves a canonical
//! pair and timeframe to provider-specific parameters before calling an
//! adapter.

use std::fmt;

use crate::models::{Pair, ProviderId, Timeframe};

/// Provider-specific instrument parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderInstrument {
    /// A single symbol string ("OANDA:EUR_USD", "EUR/USD", "C:EURUSD").
    FxSymbol { symbol: String },
    /// Separate from/to currency parameters.
    FxPair { from: String, to: String },
}

impl fmt::Display for ProviderInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FxSymbol { symbol } => f.write_str(symbol),
            Self::FxPair { from, to } => write!(f, "{}/{}", from, to),
        }
    }
}

/// Maps canonical identifiers to provider-specific ones.
///
/// `None` means the provider cannot serve that pair or timeframe; the
/// coordinator skips it without a penalty.
pub trait SymbolResolver: Send + Sync {
    fn resolve_instrument(&self, provider: ProviderId, pair: &Pair) -> Option<ProviderInstrument>;

    /// Provider interval code for `timeframe`.
    fn resolve_interval(&self, provider: ProviderId, timeframe: Timeframe) -> Option<&'static str>;
}
