//! Pre-resolved requests handed to adapters.

use std::time::Duration;

use crate::models::{Pair, Timeframe};
use crate::resolver::ProviderInstrument;

/// A bar request with provider-specific parameters already resolved.
#[derive(Clone, Debug)]
pub struct BarRequest {
    pub pair: Pair,
    pub instrument: ProviderInstrument,
    pub timeframe: Timeframe,
    /// Provider interval code ("15", "15min", ...).
    pub interval: &'static str,
    pub bar_count: usize,
    /// Upper bound for the whole call.
    pub timeout: Duration,
}

/// A quote request with the provider symbol already resolved.
#[derive(Clone, Debug)]
pub struct QuoteRequest {
    pub pair: Pair,
    pub instrument: ProviderInstrument,
    pub timeout: Duration,
}
