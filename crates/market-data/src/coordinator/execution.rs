//! Shared upstream executions: walk ranked providers until one succeeds.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::{Inner, QuoteJob, SeriesJob, QUOTE_RANKING_TIMEFRAME};
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{normalize_series, Bar, ProviderId, Quote, Timeframe};
use crate::provider::{BarRequest, MarketDataProvider, QuoteRequest};
use crate::registry::{
    AllowanceReason, FetchDiagnostics, RankedProvider, RequestOutcome, SkipReason,
};

impl Inner {
    /// Score every registered, configured provider for `timeframe`.
    pub(crate) fn rank(&self, timeframe: Timeframe, now: DateTime<Utc>) -> Vec<RankedProvider> {
        let signals: Vec<_> = self
            .providers
            .keys()
            .filter(|id| self.monitor.is_configured(**id))
            .filter_map(|id| self.monitor.signals(*id, now))
            .collect();

        self.config.scoring.rank(timeframe, &signals)
    }

    /// Provider order for one execution. A caller preference goes first.
    fn ordered_providers(
        &self,
        timeframe: Timeframe,
        preference: Option<ProviderId>,
        now: DateTime<Utc>,
    ) -> Vec<ProviderId> {
        let mut order: Vec<ProviderId> = self
            .rank(timeframe, now)
            .into_iter()
            .map(|ranked| ranked.provider)
            .collect();

        if let Some(preferred) = preference {
            if self.providers.contains_key(&preferred) {
                order.retain(|id| *id != preferred);
                order.insert(0, preferred);
            } else {
                debug!("Preferred provider '{}' is not registered, ignoring", preferred);
            }
        }

        order
    }

    /// Checks shared by series and quote walks. Returns the adapter when the
    /// provider may be called now, otherwise records why it was skipped.
    fn admit(
        &self,
        provider_id: ProviderId,
        now: DateTime<Utc>,
        diagnostics: &mut FetchDiagnostics,
    ) -> Option<Arc<dyn MarketDataProvider>> {
        let Some(adapter) = self.providers.get(&provider_id) else {
            diagnostics.record_skip(provider_id, SkipReason::NotRegistered);
            return None;
        };

        if !adapter.is_configured() {
            diagnostics.record_skip(provider_id, SkipReason::Unconfigured);
            return None;
        }

        let allowance = self.monitor.request_allowance(provider_id, now);
        if !allowance.allowed {
            let reason = allowance.reason.unwrap_or(AllowanceReason::Unknown);
            if matches!(reason, AllowanceReason::RateLimit | AllowanceReason::Backoff) {
                self.monitor.record_rate_limited(provider_id, now);
            }
            debug!(
                "Provider '{}' not allowed ({}), next available in {:?}",
                provider_id, reason, allowance.wait
            );
            diagnostics.record_skip(provider_id, reason.into());
            return None;
        }

        Some(Arc::clone(adapter))
    }

    pub(crate) async fn execute_series(self: Arc<Self>, job: SeriesJob) -> Result<Vec<Bar>, MarketDataError> {
        // A previous execution may have stored this fingerprint between the
        // caller's cache miss and the start of this one.
        if !job.bypass_cache {
            if let Some(bars) = self.series_cache.get(job.fingerprint.as_str(), Utc::now()) {
                debug!("Series cache filled before execution for '{}'", job.fingerprint);
                return Ok(bars);
            }
        }

        let mut diagnostics = FetchDiagnostics::new();

        for provider_id in self.ordered_providers(job.timeframe, job.preference, Utc::now()) {
            let now = Utc::now();
            let Some(adapter) = self.admit(provider_id, now, &mut diagnostics) else {
                continue;
            };

            if !adapter.capabilities().supports_bars {
                diagnostics.record_skip(provider_id, SkipReason::TimeframeNotSupported);
                continue;
            }
            let Some(instrument) = self.resolver.resolve_instrument(provider_id, &job.pair) else {
                diagnostics.record_skip(provider_id, SkipReason::SymbolNotSupported);
                continue;
            };
            let Some(interval) = self.resolver.resolve_interval(provider_id, job.timeframe) else {
                diagnostics.record_skip(provider_id, SkipReason::TimeframeNotSupported);
                continue;
            };

            let timeout = job
                .timeout
                .unwrap_or_else(|| self.monitor.settings(provider_id).timeout());
            let request = BarRequest {
                pair: job.pair.clone(),
                instrument,
                timeframe: job.timeframe,
                interval,
                bar_count: job.bar_count,
                timeout,
            };

            debug!(
                "Fetching {} {} x{} from '{}' as {} @ {}",
                job.pair, job.timeframe, job.bar_count, provider_id, request.instrument, interval
            );

            self.monitor.add_usage_sample(provider_id, now);
            let started = Instant::now();
            let result = call_with_timeout(provider_id, timeout, adapter.fetch_bars(&request))
                .await
                .and_then(|bars| self.post_process_series(provider_id, bars, job.bar_count));
            let latency = started.elapsed();

            match result {
                Ok(bars) => {
                    let quality = (bars.len() as f64 / job.bar_count as f64).clamp(0.0, 1.0);
                    self.record(
                        provider_id,
                        RequestOutcome::success(Some(latency)).with_quality(quality),
                    );
                    diagnostics.record_success(provider_id);

                    self.series_cache
                        .set(job.fingerprint.as_str(), bars.clone(), job.ttl, provider_id.as_str(), Utc::now());

                    info!(
                        "Fetched {} bars for {} {} from '{}' in {:?}",
                        bars.len(),
                        job.pair,
                        job.timeframe,
                        provider_id,
                        latency
                    );
                    return Ok(bars);
                }
                Err(err) => {
                    self.handle_failure(provider_id, &err, latency);
                    diagnostics.record_error(provider_id, err.to_string());
                }
            }
        }

        Err(unavailable(
            format!("{} {} x{}", job.pair, job.timeframe, job.bar_count),
            &diagnostics,
        ))
    }

    pub(crate) async fn execute_quote(self: Arc<Self>, job: QuoteJob) -> Result<Quote, MarketDataError> {
        if !job.bypass_cache {
            if let Some(quote) = self.quote_cache.get(job.fingerprint.as_str(), Utc::now()) {
                debug!("Quote cache filled before execution for '{}'", job.fingerprint);
                return Ok(quote);
            }
        }

        let mut diagnostics = FetchDiagnostics::new();

        for provider_id in self.ordered_providers(QUOTE_RANKING_TIMEFRAME, job.preference, Utc::now()) {
            let now = Utc::now();
            let Some(adapter) = self.admit(provider_id, now, &mut diagnostics) else {
                continue;
            };

            if !adapter.capabilities().supports_quotes {
                diagnostics.record_skip(provider_id, SkipReason::QuotesNotSupported);
                continue;
            }
            let Some(instrument) = self.resolver.resolve_instrument(provider_id, &job.pair) else {
                diagnostics.record_skip(provider_id, SkipReason::SymbolNotSupported);
                continue;
            };

            let timeout = job
                .timeout
                .unwrap_or_else(|| self.monitor.settings(provider_id).timeout());
            let request = QuoteRequest {
                pair: job.pair.clone(),
                instrument,
                timeout,
            };

            self.monitor.add_usage_sample(provider_id, now);
            let started = Instant::now();
            let result = call_with_timeout(provider_id, timeout, adapter.fetch_quote(&request))
                .await
                .and_then(|quote| {
                    self.validator.validate_quote(&quote)?;
                    Ok(quote)
                });
            let latency = started.elapsed();

            match result {
                Ok(quote) => {
                    self.record(provider_id, RequestOutcome::success(Some(latency)));
                    diagnostics.record_success(provider_id);
                    self.quote_cache
                        .set(job.fingerprint.as_str(), quote.clone(), job.ttl, provider_id.as_str(), Utc::now());
                    debug!("Quote for {} from '{}': {}", job.pair, provider_id, quote.mid);
                    return Ok(quote);
                }
                Err(err) => {
                    self.handle_failure(provider_id, &err, latency);
                    diagnostics.record_error(provider_id, err.to_string());
                }
            }
        }

        Err(unavailable(format!("{} quote", job.pair), &diagnostics))
    }

    /// Normalize then validate a provider series. Empty results are a
    /// provider failure.
    fn post_process_series(
        &self,
        provider_id: ProviderId,
        bars: Vec<Bar>,
        bar_count: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let received = bars.len();
        let normalized = normalize_series(bars, bar_count);
        if normalized.is_empty() {
            return Err(MarketDataError::NoData { provider: provider_id });
        }
        if normalized.len() < received {
            debug!(
                "Normalized series from '{}': {} of {} bars kept",
                provider_id,
                normalized.len(),
                received
            );
        }
        self.validator.validate_series(normalized)
    }

    /// Apply the penalty for a failed call according to its retry class.
    fn handle_failure(&self, provider_id: ProviderId, err: &MarketDataError, latency: Duration) {
        match err.retry_class() {
            RetryClass::RateLimitBackoff => {
                warn!("Provider '{}' rate limited: {}", provider_id, err);
                self.monitor
                    .register_rate_limit_hit(provider_id, err.retry_after(), Utc::now());
                self.record(provider_id, RequestOutcome::failure(Some(latency)));
            }
            RetryClass::FailoverWithPenalty | RetryClass::Never => {
                warn!("Provider '{}' failed: {}", provider_id, err);
                self.record(provider_id, RequestOutcome::failure(Some(latency)));
            }
            RetryClass::NextProvider => {
                debug!("Provider '{}' cannot serve request: {}, trying next", provider_id, err);
            }
        }
    }

    /// Record an outcome and report the resulting availability.
    fn record(&self, provider_id: ProviderId, outcome: RequestOutcome) {
        let now = Utc::now();
        self.monitor.record_request(provider_id, outcome, now);

        if let Some(sink) = &self.sink {
            let availability = self
                .monitor
                .availability(provider_id, now, self.config.allow_unconfigured);
            if let Err(e) = sink.record(&availability) {
                warn!("Failed to record availability for '{}': {}", provider_id, e);
            }
        }
    }
}

async fn call_with_timeout<T>(
    provider_id: ProviderId,
    timeout: Duration,
    call: impl Future<Output = Result<T, MarketDataError>>,
) -> Result<T, MarketDataError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(MarketDataError::Timeout { provider: provider_id }),
    }
}

fn unavailable(request: String, diagnostics: &FetchDiagnostics) -> MarketDataError {
    let attempts = diagnostics.summary();
    let errors = diagnostics.errors();
    warn!(
        "Providers exhausted for {} ({} failed, {} skipped): {}",
        request,
        errors.len(),
        diagnostics.skip_reasons().len(),
        attempts
    );
    for (provider_id, message) in errors {
        debug!("'{}' failed for {}: {}", provider_id, request, message);
    }
    MarketDataError::RealtimeDataUnavailable { request, attempts }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::MarketDataConfig;
    use crate::coordinator::MarketDataCoordinator;
    use crate::models::{Fingerprint, Pair};
    use crate::resolver::RulesResolver;

    fn series_job(bypass_cache: bool) -> SeriesJob {
        let pair = Pair::parse("EURUSD").unwrap();
        SeriesJob {
            fingerprint: Fingerprint::series(&pair, Timeframe::H1, 2, None, None),
            pair,
            timeframe: Timeframe::H1,
            bar_count: 2,
            preference: None,
            timeout: None,
            ttl: Duration::from_secs(60),
            bypass_cache,
        }
    }

    fn cached_bars() -> Vec<Bar> {
        (0..2)
            .map(|i| Bar {
                time: i * 3_600_000,
                open: 1.1,
                high: 1.2,
                low: 1.0,
                close: 1.1,
                volume: 0.0,
                provider: "FINNHUB".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_execution_serves_entry_stored_after_caller_missed() {
        let coordinator =
            MarketDataCoordinator::new(MarketDataConfig::default(), Vec::new(), Arc::new(RulesResolver::new()));
        let inner = Arc::clone(&coordinator.inner);
        let job = series_job(false);
        inner
            .series_cache
            .set(job.fingerprint.as_str(), cached_bars(), job.ttl, "FINNHUB", Utc::now());

        let bars = Arc::clone(&inner).execute_series(job).await.unwrap();
        assert_eq!(bars, cached_bars());

        let err = inner.execute_series(series_job(true)).await.unwrap_err();
        assert!(matches!(err, MarketDataError::RealtimeDataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_quote_execution_rechecks_cache() {
        let coordinator =
            MarketDataCoordinator::new(MarketDataConfig::default(), Vec::new(), Arc::new(RulesResolver::new()));
        let inner = Arc::clone(&coordinator.inner);
        let pair = Pair::parse("USDJPY").unwrap();
        let job = QuoteJob {
            fingerprint: Fingerprint::quote(&pair),
            pair: pair.clone(),
            preference: None,
            timeout: None,
            ttl: Duration::from_secs(10),
            bypass_cache: false,
        };
        let stored = inner.synthetic_quote(&pair, Utc::now());
        inner
            .quote_cache
            .set(job.fingerprint.as_str(), stored.clone(), job.ttl, "FINNHUB", Utc::now());

        let quote = inner.execute_quote(job).await.unwrap();
        assert_eq!(quote, stored);
    }
}
