//! Per-provider resilience state: rate-limit window, circuit breaker and
//! quality metrics, bundled and guarded together.
//!
//! Every update is a read-modify-write over the bundle (trim the window,
//! check the breaker, fold in an outcome, re-evaluate triggers), so each
//! provider's bundle sits behind its own mutex. Different providers never
//! contend with each other.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerState};
use super::quality::{HealthStatus, ProviderMetrics, RequestOutcome};
use super::rate_limiter::{AllowanceReason, RateLimitSnapshot, RateLimitState, RequestAllowance};
use super::ranker::ProviderSignals;
use crate::clock;
use crate::config::{MarketDataConfig, ProviderSettings};
use crate::models::ProviderId;

/// Mutable state for one provider.
#[derive(Debug)]
struct ProviderState {
    settings: ProviderSettings,
    enabled: bool,
    configured: bool,
    rate: RateLimitState,
    breaker: Option<CircuitBreakerState>,
    metrics: ProviderMetrics,
}

impl ProviderState {
    fn new(settings: ProviderSettings) -> Self {
        Self {
            enabled: settings.enabled,
            configured: false,
            rate: RateLimitState::new(settings.max_requests, settings.window(), settings.cooldown()),
            breaker: None,
            metrics: ProviderMetrics::default(),
            settings,
        }
    }

    /// The open breaker, if any. An expired breaker is cleared on the check
    /// that discovers it.
    fn active_breaker(&mut self, provider: ProviderId, now: DateTime<Utc>) -> Option<CircuitBreakerState> {
        if let Some(breaker) = &self.breaker {
            if breaker.is_expired(now) {
                info!(
                    "Circuit breaker: '{}' cooldown ({}) elapsed, closing",
                    provider, breaker.reason
                );
                self.clear_breaker();
            }
        }
        self.breaker.clone()
    }

    fn clear_breaker(&mut self) {
        self.breaker = None;
        self.metrics.consecutive_failures = 0;
        self.metrics.refresh_health(false);
    }

    fn allowance(&mut self, provider: ProviderId, now: DateTime<Utc>) -> RequestAllowance {
        if !self.enabled {
            return RequestAllowance::denied(AllowanceReason::Disabled, Duration::ZERO);
        }
        if !self.configured {
            return RequestAllowance::denied(AllowanceReason::Unconfigured, Duration::ZERO);
        }
        if let Some(breaker) = self.active_breaker(provider, now) {
            return RequestAllowance::denied(
                AllowanceReason::CircuitBreaker(breaker.reason),
                clock::until(now, breaker.expires_at),
            );
        }
        match self.rate.check(now) {
            Some((reason, wait)) => RequestAllowance::denied(reason, wait),
            None => RequestAllowance::allowed(),
        }
    }
}

/// Availability report for one provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAvailability {
    pub provider: ProviderId,
    pub available: bool,
    pub reasons: Vec<String>,
    pub has_credentials: bool,
    pub disabled: bool,
    pub circuit_breaker_active: bool,
    pub backoff_until: Option<DateTime<Utc>>,
    pub remaining_requests: Option<u32>,
}

/// Full state snapshot for one provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSnapshot {
    pub provider: ProviderId,
    pub enabled: bool,
    pub configured: bool,
    pub metrics: ProviderMetrics,
    pub rate_limit: RateLimitSnapshot,
    pub circuit_breaker: Option<CircuitBreakerState>,
}

/// Resilience state for every provider of one coordinator instance.
pub struct ProviderMonitor {
    states: BTreeMap<ProviderId, Mutex<ProviderState>>,
    breaker_config: CircuitBreakerConfig,
    rate_limit_floor: Duration,
}

impl ProviderMonitor {
    pub fn new(config: &MarketDataConfig) -> Self {
        let states = ProviderId::ALL
            .iter()
            .map(|id| (*id, Mutex::new(ProviderState::new(config.provider(*id)))))
            .collect();

        Self {
            states,
            breaker_config: config.circuit_breaker.clone(),
            rate_limit_floor: config.rate_limit_floor(),
        }
    }

    /// Lock one provider's state, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly stale counter,
    /// which is better than taking the whole data layer down.
    fn lock(&self, provider: ProviderId) -> Option<MutexGuard<'_, ProviderState>> {
        self.states.get(&provider).map(|state| {
            state.lock().unwrap_or_else(|poisoned| {
                warn!("Provider state mutex for '{}' was poisoned, recovering", provider);
                poisoned.into_inner()
            })
        })
    }

    pub fn set_configured(&self, provider: ProviderId, configured: bool) {
        if let Some(mut state) = self.lock(provider) {
            state.configured = configured;
        }
    }

    pub fn set_enabled(&self, provider: ProviderId, enabled: bool) {
        if let Some(mut state) = self.lock(provider) {
            info!(
                "Provider '{}' {}",
                provider,
                if enabled { "enabled" } else { "disabled" }
            );
            state.enabled = enabled;
        }
    }

    pub fn is_configured(&self, provider: ProviderId) -> bool {
        self.lock(provider).map(|s| s.configured).unwrap_or(false)
    }

    pub fn settings(&self, provider: ProviderId) -> ProviderSettings {
        self.lock(provider)
            .map(|s| s.settings.clone())
            .unwrap_or_else(|| ProviderSettings::default_for(provider))
    }

    /// Whether a request may be sent to `provider` right now.
    pub fn can_make_request(&self, provider: ProviderId, now: DateTime<Utc>) -> bool {
        self.request_allowance(provider, now).allowed
    }

    /// Allowance with the blocking reason and a wait estimate.
    pub fn request_allowance(&self, provider: ProviderId, now: DateTime<Utc>) -> RequestAllowance {
        match self.lock(provider) {
            Some(mut state) => state.allowance(provider, now),
            None => RequestAllowance::denied(AllowanceReason::Unknown, Duration::ZERO),
        }
    }

    /// Count one attempt against the window.
    pub fn add_usage_sample(&self, provider: ProviderId, now: DateTime<Utc>) {
        if let Some(mut state) = self.lock(provider) {
            state.rate.add_sample(now);
        }
    }

    /// The provider signalled a rate limit; back off.
    pub fn register_rate_limit_hit(
        &self,
        provider: ProviderId,
        retry_after: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        if let Some(mut state) = self.lock(provider) {
            state.rate.register_hit(retry_after, self.rate_limit_floor, now);
            info!(
                "Rate limiter: '{}' backing off until {:?}",
                provider,
                state.rate.backoff_until()
            );
        }
    }

    /// The local limiter refused a request; tracked separately from outcomes.
    pub fn record_rate_limited(&self, provider: ProviderId, now: DateTime<Utc>) {
        if let Some(mut state) = self.lock(provider) {
            state.metrics.record_rate_limited(now);
        }
    }

    /// Fold an outcome into the metrics and re-evaluate the breaker.
    pub fn record_request(&self, provider: ProviderId, outcome: RequestOutcome, now: DateTime<Utc>) {
        let Some(mut state) = self.lock(provider) else {
            return;
        };

        state.metrics.record(&outcome, now);

        let latency_target = state.settings.latency_target();
        if let Some(candidate) = self.breaker_config.evaluate(&state.metrics, latency_target, now) {
            let replace = match state.active_breaker(provider, now) {
                Some(current) => candidate.supersedes(&current),
                None => true,
            };
            if replace {
                info!(
                    "Circuit breaker: opening '{}' ({}) until {}",
                    provider, candidate.reason, candidate.expires_at
                );
                state.breaker = Some(candidate);
            }
        }

        let open = state.active_breaker(provider, now).is_some();
        state.metrics.refresh_health(open);

        debug!(
            "Recorded {} for '{}' (samples={}, consecutive_failures={}, health={:?})",
            if outcome.is_success() { "success" } else { "failure" },
            provider,
            state.metrics.sample_count,
            state.metrics.consecutive_failures,
            state.metrics.health
        );
    }

    /// Close a provider's breaker manually.
    pub fn clear_circuit_breaker(&self, provider: ProviderId) {
        if let Some(mut state) = self.lock(provider) {
            if state.breaker.is_some() {
                info!("Circuit breaker: manually resetting '{}'", provider);
            }
            state.clear_breaker();
        }
    }

    pub fn circuit_breaker(&self, provider: ProviderId, now: DateTime<Utc>) -> Option<CircuitBreakerState> {
        self.lock(provider)
            .and_then(|mut state| state.active_breaker(provider, now))
    }

    /// Close every expired breaker. Returns how many were closed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        self.states
            .keys()
            .filter(|id| {
                self.lock(**id)
                    .map(|mut state| {
                        let had = state.breaker.is_some();
                        had && state.active_breaker(**id, now).is_none()
                    })
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn availability(
        &self,
        provider: ProviderId,
        now: DateTime<Utc>,
        allow_unconfigured: bool,
    ) -> ProviderAvailability {
        let Some(mut state) = self.lock(provider) else {
            return ProviderAvailability {
                provider,
                available: false,
                reasons: vec![AllowanceReason::Unknown.to_string()],
                has_credentials: false,
                disabled: false,
                circuit_breaker_active: false,
                backoff_until: None,
                remaining_requests: None,
            };
        };

        let mut reasons = Vec::new();
        if !state.enabled {
            reasons.push(AllowanceReason::Disabled.to_string());
        }
        if !state.configured && !allow_unconfigured {
            reasons.push(AllowanceReason::Unconfigured.to_string());
        }
        let breaker = state.active_breaker(provider, now);
        if let Some(breaker) = &breaker {
            reasons.push(AllowanceReason::CircuitBreaker(breaker.reason).to_string());
        }
        if state.rate.is_backed_off(now) {
            reasons.push(AllowanceReason::Backoff.to_string());
        }
        if state.rate.is_exhausted(now) {
            reasons.push(AllowanceReason::RateLimit.to_string());
        }

        ProviderAvailability {
            provider,
            available: reasons.is_empty(),
            reasons,
            has_credentials: state.configured,
            disabled: !state.enabled,
            circuit_breaker_active: breaker.is_some(),
            backoff_until: state.rate.backoff_until().filter(|until| *until > now),
            remaining_requests: state.rate.remaining(now),
        }
    }

    /// Inputs for the ranking score.
    pub fn signals(&self, provider: ProviderId, now: DateTime<Utc>) -> Option<ProviderSignals> {
        let mut state = self.lock(provider)?;
        let breaker_open = state.active_breaker(provider, now).is_some();
        Some(ProviderSignals {
            provider,
            quality: state.metrics.normalized_quality,
            success_ratio: state.metrics.success_ratio(),
            avg_latency_ms: state.metrics.avg_latency_ms,
            usage_ratio: state.rate.usage_ratio(now),
            breaker_open,
            in_backoff: state.rate.is_backed_off(now),
            configured: state.configured,
            disabled: !state.enabled,
        })
    }

    pub fn metrics(&self, provider: ProviderId) -> Option<ProviderMetrics> {
        self.lock(provider).map(|state| state.metrics.clone())
    }

    pub fn health(&self, provider: ProviderId) -> HealthStatus {
        self.lock(provider)
            .map(|state| state.metrics.health)
            .unwrap_or_default()
    }

    pub fn snapshot(&self, provider: ProviderId, now: DateTime<Utc>) -> Option<ProviderSnapshot> {
        let mut state = self.lock(provider)?;
        let circuit_breaker = state.active_breaker(provider, now);
        Some(ProviderSnapshot {
            provider,
            enabled: state.enabled,
            configured: state.configured,
            metrics: state.metrics.clone(),
            rate_limit: state.rate.snapshot(now),
            circuit_breaker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::circuit_breaker::BreakerReason;

    const PROVIDER: ProviderId = ProviderId::Finnhub;

    fn monitor_with(settings: ProviderSettings) -> ProviderMonitor {
        let config = MarketDataConfig::default().with_provider(PROVIDER, settings);
        let monitor = ProviderMonitor::new(&config);
        monitor.set_configured(PROVIDER, true);
        monitor
    }

    fn monitor() -> ProviderMonitor {
        monitor_with(ProviderSettings::default_for(PROVIDER))
    }

    #[test]
    fn test_unconfigured_and_disabled_are_refused() {
        let monitor = ProviderMonitor::new(&MarketDataConfig::default());
        let now = Utc::now();

        let allowance = monitor.request_allowance(PROVIDER, now);
        assert_eq!(allowance.reason, Some(AllowanceReason::Unconfigured));

        monitor.set_configured(PROVIDER, true);
        monitor.set_enabled(PROVIDER, false);
        let allowance = monitor.request_allowance(PROVIDER, now);
        assert_eq!(allowance.reason, Some(AllowanceReason::Disabled));
        assert!(!monitor.can_make_request(PROVIDER, now));
    }

    #[test]
    fn test_sixth_call_in_window_is_rate_limited() {
        let monitor = monitor_with(ProviderSettings {
            max_requests: Some(5),
            window_ms: 60_000,
            ..ProviderSettings::default_for(PROVIDER)
        });
        let now = Utc::now();

        for _ in 0..5 {
            assert!(monitor.can_make_request(PROVIDER, now));
            monitor.add_usage_sample(PROVIDER, now);
        }

        let allowance = monitor.request_allowance(PROVIDER, now);
        assert!(!allowance.allowed);
        assert_eq!(allowance.reason, Some(AllowanceReason::RateLimit));
        assert!(allowance.wait > Duration::ZERO);
    }

    #[test]
    fn test_rate_limit_hit_blocks_until_backoff_expires() {
        let monitor = monitor();
        let now = Utc::now();
        monitor.register_rate_limit_hit(PROVIDER, Some(Duration::from_millis(30_000)), now);

        let availability = monitor.availability(PROVIDER, now, false);
        assert_eq!(
            availability.backoff_until,
            Some(clock::after(now, Duration::from_millis(30_000)))
        );
        assert_eq!(availability.remaining_requests, Some(0));
        assert!(!monitor.can_make_request(PROVIDER, clock::after(now, Duration::from_secs(29))));
        let allowance = monitor.request_allowance(PROVIDER, now);
        assert_eq!(allowance.reason, Some(AllowanceReason::Backoff));
        assert_eq!(allowance.wait, Duration::from_secs(30));
        assert!(monitor.can_make_request(PROVIDER, clock::after(now, Duration::from_secs(30))));
    }

    #[test]
    fn test_breaker_opens_at_threshold_and_closes_lazily() {
        let monitor = monitor();
        let now = Utc::now();

        monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        assert!(monitor.circuit_breaker(PROVIDER, now).is_none());
        assert!(monitor.can_make_request(PROVIDER, now));

        monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        let breaker = monitor.circuit_breaker(PROVIDER, now).unwrap();
        assert_eq!(breaker.reason, BreakerReason::Failures);
        assert_eq!(monitor.health(PROVIDER), HealthStatus::Blocked);

        let allowance = monitor.request_allowance(PROVIDER, now);
        assert_eq!(
            allowance.reason,
            Some(AllowanceReason::CircuitBreaker(BreakerReason::Failures))
        );
        assert_eq!(allowance.wait, Duration::from_millis(120_000));

        let just_before = clock::after(now, Duration::from_millis(119_999));
        assert!(!monitor.can_make_request(PROVIDER, just_before));

        let expiry = breaker.expires_at;
        assert!(monitor.can_make_request(PROVIDER, expiry));
        assert!(monitor.circuit_breaker(PROVIDER, expiry).is_none());
        assert_eq!(monitor.metrics(PROVIDER).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_manual_reset() {
        let monitor = monitor();
        let now = Utc::now();
        for _ in 0..3 {
            monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        }
        assert!(!monitor.can_make_request(PROVIDER, now));

        monitor.clear_circuit_breaker(PROVIDER);
        assert!(monitor.can_make_request(PROVIDER, now));
        assert_eq!(monitor.metrics(PROVIDER).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_recovery_success_after_reset_keeps_breaker_closed() {
        let monitor = monitor();
        let now = Utc::now();
        for _ in 0..8 {
            monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        }
        monitor.clear_circuit_breaker(PROVIDER);

        monitor.record_request(PROVIDER, RequestOutcome::success(None), now);
        let metrics = monitor.metrics(PROVIDER).unwrap();
        assert!(metrics.normalized_quality.unwrap() < 0.4);
        assert!(monitor.circuit_breaker(PROVIDER, now).is_none());
        assert!(monitor.can_make_request(PROVIDER, now));
    }

    #[test]
    fn test_sweep_closes_expired_breakers() {
        let monitor = monitor();
        let now = Utc::now();
        for _ in 0..3 {
            monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        }
        assert_eq!(monitor.sweep_expired(now), 0);
        assert_eq!(monitor.sweep_expired(clock::after(now, Duration::from_secs(121))), 1);
        assert_eq!(monitor.sweep_expired(clock::after(now, Duration::from_secs(122))), 0);
    }

    #[test]
    fn test_availability_reasons() {
        let monitor = ProviderMonitor::new(&MarketDataConfig::default());
        let now = Utc::now();

        let availability = monitor.availability(PROVIDER, now, false);
        assert!(!availability.available);
        assert_eq!(availability.reasons, vec!["unconfigured".to_string()]);

        let availability = monitor.availability(PROVIDER, now, true);
        assert!(availability.available);
        assert!(!availability.has_credentials);
    }

    #[test]
    fn test_provider_isolation() {
        let monitor = monitor();
        monitor.set_configured(ProviderId::AlphaVantage, true);
        let now = Utc::now();
        for _ in 0..3 {
            monitor.record_request(PROVIDER, RequestOutcome::failure(None), now);
        }
        assert!(!monitor.can_make_request(PROVIDER, now));
        assert!(monitor.can_make_request(ProviderId::AlphaVantage, now));
    }
}
