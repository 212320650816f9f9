//! Symbol resolution for market data providers.
//!
//! Converts canonical identifiers into provider-specific parameters:
//!
//! ```text
//! (EURUSD, M15) ──> FINNHUB       OANDA:EUR_USD   "15"
//!               ──> TWELVE_DATA   EUR/USD         "15min"
//!               ──> POLYGON       C:EURUSD        "15/minute"
//!               ──> ALPHA_VANTAGE from=EUR to=USD "15min"
//! ```
//!
//! A provider that has no mapping for a pair or timeframe resolves to
//! `None` and is skipped for that request.

mod rules_resolver;
mod traits;

pub use rules_resolver::RulesResolver;
pub use traits::{ProviderInstrument, SymbolResolver};
