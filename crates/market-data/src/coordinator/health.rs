//! Health snapshot and viability checks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::MarketDataCoordinator;
use crate::models::{FetchOptions, ProviderId, Timeframe};
use crate::registry::{ProviderAvailability, ProviderSnapshot, RankedProvider};

/// Timeframes whose ranking is included in the health snapshot, one per
/// ranking class.
const SNAPSHOT_RANKINGS: [Timeframe; 3] = [Timeframe::M15, Timeframe::H4, Timeframe::D1];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: ProviderId,
    pub registered: bool,
    pub snapshot: Option<ProviderSnapshot>,
    pub availability: ProviderAvailability,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub series_entries: usize,
    pub quote_entries: usize,
    pub in_flight: usize,
}

/// Point-in-time view of every provider plus cache and ranking state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub generated_at: DateTime<Utc>,
    pub providers: Vec<ProviderHealth>,
    pub cache: CacheStats,
    /// Probability that at least one available provider serves a request,
    /// in [0, 1].
    pub data_confidence: f64,
    pub ranking: BTreeMap<Timeframe, Vec<RankedProvider>>,
}

/// Whether a fetch for a timeframe can currently reach any provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViabilityReport {
    pub timeframe: Timeframe,
    pub viable: bool,
    pub reasons: Vec<String>,
    pub available_providers: Vec<ProviderId>,
    pub synthetic_allowed: bool,
}

/// Counts from a periodic sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub series_entries: usize,
    pub quote_entries: usize,
    pub circuit_breakers: usize,
}

impl MarketDataCoordinator {
    pub fn health_status(&self) -> HealthSnapshot {
        self.health_status_at(Utc::now())
    }

    pub fn health_status_at(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let inner = &self.inner;
        let allow_unconfigured = inner.config.allow_unconfigured;

        let providers: Vec<ProviderHealth> = ProviderId::ALL
            .iter()
            .map(|id| {
                let registered = inner.providers.contains_key(id);
                let mut availability = inner.monitor.availability(*id, now, allow_unconfigured);
                if !registered {
                    availability.available = false;
                    availability.reasons.insert(0, "not_registered".to_string());
                }
                ProviderHealth {
                    provider: *id,
                    registered,
                    snapshot: inner.monitor.snapshot(*id, now),
                    availability,
                }
            })
            .collect();

        let data_confidence = self.data_confidence(&providers, now);

        let ranking = SNAPSHOT_RANKINGS
            .iter()
            .map(|tf| (*tf, inner.rank(*tf, now)))
            .collect();

        HealthSnapshot {
            generated_at: now,
            providers,
            cache: CacheStats {
                series_entries: inner.series_cache.len(),
                quote_entries: inner.quote_cache.len(),
                in_flight: inner.series_inflight.len() + inner.quote_inflight.len(),
            },
            data_confidence,
            ranking,
        }
    }

    /// `1 - Π(1 - s)` over available providers, where `s` averages the
    /// provider's quality and success ratio (neutral values when unknown).
    fn data_confidence(&self, providers: &[ProviderHealth], now: DateTime<Utc>) -> f64 {
        let scoring = &self.inner.config.scoring;

        let miss_all = providers
            .iter()
            .filter(|p| p.availability.available)
            .filter_map(|p| self.inner.monitor.signals(p.provider, now))
            .map(|signals| {
                let quality = signals.quality.unwrap_or(scoring.neutral_quality);
                let success = signals
                    .success_ratio
                    .unwrap_or(scoring.neutral_success_ratio);
                1.0 - (0.5 * quality + 0.5 * success).clamp(0.0, 1.0)
            })
            .product::<f64>();

        (1.0 - miss_all).clamp(0.0, 1.0)
    }

    pub fn is_data_fetch_viable(&self, timeframe: Timeframe) -> ViabilityReport {
        self.is_data_fetch_viable_at(timeframe, Utc::now())
    }

    pub fn is_data_fetch_viable_at(&self, timeframe: Timeframe, now: DateTime<Utc>) -> ViabilityReport {
        let inner = &self.inner;

        let considered: Vec<(ProviderId, ProviderAvailability, bool)> = inner
            .providers
            .iter()
            .map(|(id, adapter)| {
                let availability = inner
                    .monitor
                    .availability(*id, now, inner.config.allow_unconfigured);
                let serves_timeframe = adapter.capabilities().supports_bars
                    && inner.resolver.resolve_interval(*id, timeframe).is_some();
                (*id, availability, serves_timeframe)
            })
            .collect();

        let available_providers: Vec<ProviderId> = considered
            .iter()
            .filter(|(_, availability, serves)| availability.available && *serves)
            .map(|(id, _, _)| *id)
            .collect();

        let mut reasons = Vec::new();
        if available_providers.is_empty() {
            reasons.push("no_providers".to_string());

            let all = |predicate: fn(&ProviderAvailability, bool) -> bool| {
                !considered.is_empty() && considered.iter().all(|(_, a, s)| predicate(a, *s))
            };

            if all(|a, _| a.disabled) {
                reasons.push("all_disabled".to_string());
            }
            if all(|a, _| has_reason(a, "unconfigured")) {
                reasons.push("all_unconfigured".to_string());
            }
            if all(|a, _| a.circuit_breaker_active) {
                reasons.push("all_circuit_breakers_open".to_string());
            }
            if all(|a, _| has_reason(a, "backoff")) {
                reasons.push("all_backed_off".to_string());
            }
            if all(|a, _| has_reason(a, "rate_limit")) {
                reasons.push("all_rate_limited".to_string());
            }
            if all(|_, serves| !serves) {
                reasons.push("timeframe_not_supported".to_string());
            }
        }

        ViabilityReport {
            timeframe,
            viable: !available_providers.is_empty(),
            reasons,
            available_providers,
            synthetic_allowed: inner
                .config
                .synthetic
                .permits(&FetchOptions::default())
                .unwrap_or(false),
        }
    }
}

fn has_reason(availability: &ProviderAvailability, prefix: &str) -> bool {
    availability.reasons.iter().any(|r| r.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::MarketDataConfig;
    use crate::registry::RequestOutcome;
    use crate::resolver::RulesResolver;

    fn empty_coordinator() -> MarketDataCoordinator {
        MarketDataCoordinator::new(MarketDataConfig::default(), Vec::new(), Arc::new(RulesResolver::new()))
    }

    #[test]
    fn test_no_registered_providers_is_not_viable() {
        let report = empty_coordinator().is_data_fetch_viable(Timeframe::M15);
        assert!(!report.viable);
        assert_eq!(report.reasons, vec!["no_providers".to_string()]);
        assert!(report.available_providers.is_empty());
    }

    #[test]
    fn test_health_lists_every_provider() {
        let snapshot = empty_coordinator().health_status();
        assert_eq!(snapshot.providers.len(), ProviderId::ALL.len());
        assert!(snapshot.providers.iter().all(|p| !p.registered && !p.availability.available));
        assert_eq!(snapshot.data_confidence, 0.0);
        assert_eq!(snapshot.ranking.len(), SNAPSHOT_RANKINGS.len());
    }

    #[test]
    fn test_confidence_combines_available_providers() {
        let coordinator = empty_coordinator();
        let now = Utc::now();
        coordinator.monitor().set_configured(ProviderId::Finnhub, true);
        coordinator.monitor().set_configured(ProviderId::TwelveData, true);
        // A mixed history keeps the Finnhub score below 1.
        coordinator
            .monitor()
            .record_request(ProviderId::Finnhub, RequestOutcome::failure(None), now);
        for _ in 0..3 {
            coordinator
                .monitor()
                .record_request(ProviderId::Finnhub, RequestOutcome::success(None), now);
        }

        let availability = |id| ProviderHealth {
            provider: id,
            registered: true,
            snapshot: None,
            availability: coordinator.monitor().availability(id, now, false),
        };
        let providers = vec![availability(ProviderId::Finnhub), availability(ProviderId::TwelveData)];

        let confidence = coordinator.data_confidence(&providers, now);
        let finnhub = coordinator.monitor().signals(ProviderId::Finnhub, now).unwrap();
        let s1 = 0.5 * finnhub.quality.unwrap_or(0.6) + 0.5 * finnhub.success_ratio.unwrap_or(0.75);
        let s2 = 0.5 * 0.6 + 0.5 * 0.75;
        let expected = 1.0 - (1.0 - s1) * (1.0 - s2);
        assert!(s1 < 1.0);
        assert!((confidence - expected).abs() < 1e-9);
        assert!(confidence > s1.max(s2));
        assert!(confidence < 1.0);
    }
}
