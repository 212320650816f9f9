use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pair::Pair;
use super::timeframe::Timeframe;
use super::types::ProviderId;
use crate::errors::MarketDataError;

/// Per-call options accepted by `fetch_series` and `fetch_quote`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchOptions {
    /// Skip the cache lookup (the result is still cached).
    pub bypass_cache: bool,
    /// TTL to use instead of the timeframe default.
    pub cache_ttl_ms_override: Option<u64>,
    /// Free-form caller purpose ("signal", "prefetch", "backtest", ...).
    pub purpose: Option<String>,
    /// Provider to try first.
    pub provider_preference: Option<ProviderId>,
    pub disable_cross_derivation: bool,
    /// Skip upstream providers and generate synthetic data.
    pub force_synthetic: bool,
    /// Never return synthetic data, regardless of policy.
    pub disallow_synthetic: bool,
    /// Per-provider call timeout override.
    pub timeout_ms: Option<u64>,
}

impl FetchOptions {
    /// Reject contradictory or meaningless options at the call site.
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.force_synthetic && self.disallow_synthetic {
            return Err(MarketDataError::Configuration(
                "forceSynthetic and disallowSynthetic are mutually exclusive".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(MarketDataError::Configuration(
                "timeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.cache_ttl_ms_override == Some(0) {
            return Err(MarketDataError::Configuration(
                "cacheTtlMsOverride must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_ttl_override(&self) -> Option<Duration> {
        self.cache_ttl_ms_override.map(Duration::from_millis)
    }
}

/// Deterministic request key shared by the cache and in-flight coalescing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn series(
        pair: &Pair,
        timeframe: Timeframe,
        bar_count: usize,
        purpose: Option<&str>,
        preference: Option<ProviderId>,
    ) -> Self {
        Self(format!(
            "series|{}|{}|{}|{}|{}",
            pair,
            timeframe,
            bar_count,
            purpose.unwrap_or("-"),
            preference.map(|p| p.as_str()).unwrap_or("-")
        ))
    }

    pub fn quote(pair: &Pair) -> Self {
        Self(format!("quote|{}", pair))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_camel_case() {
        let json = r#"{"bypassCache": true, "providerPreference": "FINNHUB", "timeoutMs": 5000}"#;
        let options: FetchOptions = serde_json::from_str(json).unwrap();
        assert!(options.bypass_cache);
        assert_eq!(options.provider_preference, Some(ProviderId::Finnhub));
        assert_eq!(options.timeout(), Some(Duration::from_millis(5000)));
        assert!(!options.force_synthetic);
    }

    #[test]
    fn test_conflicting_synthetic_flags_rejected() {
        let options = FetchOptions {
            force_synthetic: true,
            disallow_synthetic: true,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(MarketDataError::Configuration(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let pair = Pair::parse("EURUSD").unwrap();
        let a = Fingerprint::series(&pair, Timeframe::M15, 100, Some("signal"), None);
        let b = Fingerprint::series(&pair, Timeframe::M15, 100, Some("signal"), None);
        let c = Fingerprint::series(&pair, Timeframe::M15, 100, None, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Fingerprint::quote(&pair).as_str(), "quote|EURUSD");
    }
}
