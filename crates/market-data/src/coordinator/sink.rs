//! Optional hand-off of provider availability to an external store.

use crate::errors::MarketDataError;
use crate::registry::ProviderAvailability;

/// Receives a provider availability record after every recorded outcome.
///
/// Delivery is best-effort: errors are logged and never affect a fetch.
/// Implementations are called inline and should not block.
pub trait AvailabilitySink: Send + Sync {
    fn record(&self, availability: &ProviderAvailability) -> Result<(), MarketDataError>;
}
