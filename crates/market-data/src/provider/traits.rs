//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Bar, ProviderId, Quote};

use super::capabilities::ProviderCapabilities;
use super::request::{BarRequest, QuoteRequest};

/// Trait for market data providers.
///
/// An adapter translates one resolved request into a provider call and
/// parses the response. It holds no resilience state: rate limiting,
/// circuit breaking, caching and post-processing all happen in the
/// coordinator.
///
/// Adapters signal an upstream rate-limit condition with
/// [`MarketDataError::RateLimited`], carrying any provider-declared
/// retry-after.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use tradefeed_market_data::provider::{BarRequest, MarketDataProvider, ProviderCapabilities};
///
/// struct MyProvider {
///     api_key: Option<String>,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> ProviderId {
///         ProviderId::Polygon
///     }
///
///     fn is_configured(&self) -> bool {
///         self.api_key.is_some()
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities::default()
///     }
///
///     async fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Which upstream source this adapter talks to.
    fn id(&self) -> ProviderId;

    /// Whether the adapter has real credentials.
    fn is_configured(&self) -> bool {
        true
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Fetch bars for a resolved request.
    ///
    /// Bars may come back in any order and may contain duplicates; the
    /// coordinator normalizes them.
    async fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, MarketDataError>;

    /// Fetch a live quote.
    ///
    /// Default implementation reports the operation as unsupported.
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError> {
        let _ = request;
        Err(MarketDataError::ProviderError {
            provider: self.id(),
            message: "live quotes not supported".to_string(),
        })
    }
}
