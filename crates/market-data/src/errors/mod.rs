//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining failover behavior
//!
//! Only [`MarketDataError::Configuration`],
//! [`MarketDataError::RealtimeDataUnavailable`] and, if a fetch task dies,
//! [`MarketDataError::Internal`] ever reach a caller of the coordinator.
//! Every other variant describes one provider's failure and is absorbed into
//! that provider's metrics.

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

use crate::models::ProviderId;

/// Errors that can occur during market data operations.
///
/// The enum is `Clone` so that one coalesced upstream result can be handed
/// to every waiter; transport errors are therefore captured as strings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// Invalid call options or configuration. Fails fast at the call site.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The timeframe alias is not recognized, or a provider cannot serve it.
    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    /// The provider signalled a rate-limit condition (HTTP 429 or a
    /// provider-specific body).
    #[error("Rate limited: {provider}")]
    RateLimited {
        provider: ProviderId,
        /// Provider-declared retry-after, when present.
        retry_after: Option<Duration>,
    },

    /// The provider call exceeded its timeout.
    #[error("Timeout: {provider}")]
    Timeout { provider: ProviderId },

    /// Transport or parse failure for one provider.
    #[error("Provider error: {provider} - {message}")]
    ProviderError { provider: ProviderId, message: String },

    /// The provider answered but returned no usable data.
    #[error("No data from provider: {provider}")]
    NoData { provider: ProviderId },

    /// The provider returned data that failed validation checks.
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(String),

    /// Every provider was exhausted and synthetic data was not permitted.
    #[error("Realtime data unavailable for {request}: {attempts}")]
    RealtimeDataUnavailable {
        /// Request description (pair/timeframe).
        request: String,
        /// Summary of every provider attempt.
        attempts: String,
    },

    /// A shared fetch task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use tradefeed_market_data::errors::{MarketDataError, RetryClass};
    /// use tradefeed_market_data::ProviderId;
    ///
    /// let error = MarketDataError::RateLimited { provider: ProviderId::Finnhub, retry_after: None };
    /// assert_eq!(error.retry_class(), RetryClass::RateLimitBackoff);
    ///
    /// let error = MarketDataError::Configuration("bad".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Configuration(_) | Self::RealtimeDataUnavailable { .. } | Self::Internal(_) => {
                RetryClass::Never
            }

            Self::RateLimited { .. } => RetryClass::RateLimitBackoff,

            Self::Timeout { .. }
            | Self::ProviderError { .. }
            | Self::NoData { .. }
            | Self::ValidationFailed { .. }
            | Self::Network(_) => RetryClass::FailoverWithPenalty,

            Self::UnsupportedTimeframe(_) => RetryClass::NextProvider,
        }
    }

    /// Provider-declared retry-after for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_never_retries() {
        let error = MarketDataError::Configuration("barCount must be > 0".to_string());
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_rate_limited_backs_off() {
        let error = MarketDataError::RateLimited {
            provider: ProviderId::Finnhub,
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(error.retry_class(), RetryClass::RateLimitBackoff);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_timeout_fails_over_with_penalty() {
        let error = MarketDataError::Timeout {
            provider: ProviderId::AlphaVantage,
        };
        assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
        assert_eq!(error.retry_after(), None);
    }

    #[test]
    fn test_provider_error_fails_over_with_penalty() {
        let error = MarketDataError::ProviderError {
            provider: ProviderId::Finnhub,
            message: "Internal server error".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    }

    #[test]
    fn test_unsupported_timeframe_skips_without_penalty() {
        let error = MarketDataError::UnsupportedTimeframe("H4".to_string());
        assert_eq!(error.retry_class(), RetryClass::NextProvider);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::RateLimited {
            provider: ProviderId::TwelveData,
            retry_after: None,
        };
        assert_eq!(format!("{}", error), "Rate limited: TWELVE_DATA");

        let error = MarketDataError::ProviderError {
            provider: ProviderId::AlphaVantage,
            message: "API key invalid".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Provider error: ALPHA_VANTAGE - API key invalid"
        );
    }
}
