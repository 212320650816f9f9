//! Provider capabilities.

/// Describes what a market data provider can do.
///
/// Used by the coordinator to pick the provider subset for each operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Whether the provider serves historical bars.
    pub supports_bars: bool,

    /// Whether the provider serves live bid/ask quotes.
    pub supports_quotes: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_bars: true,
            supports_quotes: true,
        }
    }
}
