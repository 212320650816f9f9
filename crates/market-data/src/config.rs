//! Explicit, immutable configuration for one coordinator instance.
//!
//! Nothing in the crate reads process-wide defaults at runtime: every table
//! (rate limits, latency targets, TTLs, ranking weights, synthetic policy)
//! comes from a [`MarketDataConfig`] handed to the constructor, so several
//! independently configured instances can coexist.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::CacheTtlPolicy;
use crate::models::ProviderId;
use crate::registry::{CircuitBreakerConfig, ScoringPolicy, ValidatorConfig};
use crate::synthetic::SyntheticPolicy;

/// Minimum backoff after a rate-limit hit.
const DEFAULT_RATE_LIMIT_FLOOR_MS: u64 = 2_000;

/// Largest series a single request may ask for.
const DEFAULT_MAX_BAR_COUNT: usize = 5_000;

/// Limits and targets for one provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Requests allowed per window; `None` means uncapped.
    pub max_requests: Option<u32>,
    pub window_ms: u64,
    /// Backoff applied after a rate-limit hit without a retry-after.
    pub cooldown_ms: u64,
    /// Expected average latency; the latency breaker scales this.
    pub latency_target_ms: u64,
    /// Per-call timeout.
    pub timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: Some(60),
            window_ms: 60_000,
            cooldown_ms: 60_000,
            latency_target_ms: 1_000,
            timeout_ms: 10_000,
        }
    }
}

impl ProviderSettings {
    /// Free-tier defaults for each provider.
    pub fn default_for(provider: ProviderId) -> Self {
        let base = Self::default();
        match provider {
            ProviderId::TwelveData => Self {
                max_requests: Some(8),
                latency_target_ms: 900,
                ..base
            },
            ProviderId::Finnhub => Self {
                max_requests: Some(60),
                cooldown_ms: 30_000,
                latency_target_ms: 700,
                timeout_ms: 8_000,
                ..base
            },
            ProviderId::AlphaVantage => Self {
                max_requests: Some(5),
                latency_target_ms: 1_200,
                timeout_ms: 12_000,
                ..base
            },
            ProviderId::Polygon => Self {
                max_requests: Some(5),
                ..base
            },
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn latency_target(&self) -> Duration {
        Duration::from_millis(self.latency_target_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn merge(mut self, patch: ProviderSettingsPatch) -> Self {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(max_requests) = patch.max_requests {
            self.max_requests = max_requests;
        }
        if let Some(window_ms) = patch.window_ms {
            self.window_ms = window_ms;
        }
        if let Some(cooldown_ms) = patch.cooldown_ms {
            self.cooldown_ms = cooldown_ms;
        }
        if let Some(latency_target_ms) = patch.latency_target_ms {
            self.latency_target_ms = latency_target_ms;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        self
    }
}

/// Partial provider settings as written in a config file. Absent fields keep
/// the provider's own defaults; `"max_requests": null` removes the cap.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProviderSettingsPatch {
    enabled: Option<bool>,
    #[serde(deserialize_with = "present")]
    max_requests: Option<Option<u32>>,
    window_ms: Option<u64>,
    cooldown_ms: Option<u64>,
    latency_target_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn merge_provider_settings<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<ProviderId, ProviderSettings>, D::Error>
where
    D: Deserializer<'de>,
{
    let patches = BTreeMap::<ProviderId, ProviderSettingsPatch>::deserialize(deserializer)?;
    let mut providers: BTreeMap<_, _> = ProviderId::ALL
        .iter()
        .map(|id| (*id, ProviderSettings::default_for(*id)))
        .collect();
    for (id, patch) in patches {
        let merged = ProviderSettings::default_for(id).merge(patch);
        providers.insert(id, merged);
    }
    Ok(providers)
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Per-provider overrides; missing providers and missing fields use the
    /// provider's defaults.
    #[serde(deserialize_with = "merge_provider_settings")]
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
    pub circuit_breaker: CircuitBreakerConfig,
    pub scoring: ScoringPolicy,
    pub cache: CacheTtlPolicy,
    pub synthetic: SyntheticPolicy,
    pub validation: ValidatorConfig,
    /// Report providers without credentials as available.
    pub allow_unconfigured: bool,
    pub rate_limit_floor_ms: u64,
    /// Upper bound on `bar_count` for one series request.
    pub max_bar_count: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            providers: ProviderId::ALL
                .iter()
                .map(|id| (*id, ProviderSettings::default_for(*id)))
                .collect(),
            circuit_breaker: CircuitBreakerConfig::default(),
            scoring: ScoringPolicy::default(),
            cache: CacheTtlPolicy::default(),
            synthetic: SyntheticPolicy::default(),
            validation: ValidatorConfig::default(),
            allow_unconfigured: false,
            rate_limit_floor_ms: DEFAULT_RATE_LIMIT_FLOOR_MS,
            max_bar_count: DEFAULT_MAX_BAR_COUNT,
        }
    }
}

impl MarketDataConfig {
    pub fn provider(&self, provider: ProviderId) -> ProviderSettings {
        self.providers
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::default_for(provider))
    }

    pub fn rate_limit_floor(&self) -> Duration {
        Duration::from_millis(self.rate_limit_floor_ms)
    }

    /// Builder-style override for one provider.
    pub fn with_provider(mut self, provider: ProviderId, settings: ProviderSettings) -> Self {
        self.providers.insert(provider, settings);
        self
    }
}
