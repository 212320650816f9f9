//! Request coordinator: the facade that serves `fetch_series` and
//! `fetch_quote`.
//!
//! # Flow
//!
//! ```text
//! fetch_series(pair, timeframe, bar_count, options)
//!   ├─ validate options, normalize pair and timeframe alias
//!   ├─ forceSynthetic? ──────────────────────────────> synthetic bars
//!   ├─ cache hit? ───────────────────────────────────> cached bars
//!   ├─ join or start the in-flight execution for the fingerprint
//!   │    cache filled meanwhile? ─────────────────────> cached bars
//!   │    walk ranked providers sequentially:
//!   │      skip (unconfigured / unsupported / not allowed)
//!   │      call adapter under timeout
//!   │      success → record, cache, stop
//!   │      failure → record (+ rate-limit hit), next
//!   ├─ all failed: cross pair? derive from USD legs ─> derived bars
//!   ├─ synthetic permitted? ─────────────────────────> synthetic bars
//!   └─ RealtimeDataUnavailable
//! ```
//!
//! Options that are not part of the fingerprint (`timeoutMs`,
//! `cacheTtlMsOverride`) are taken from the caller that started the shared
//! execution. The cross-derivation and synthetic fallbacks are applied per
//! caller, after the shared result.

mod cross;
mod execution;
mod health;
mod sink;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::MarketDataConfig;
use crate::errors::MarketDataError;
use crate::inflight::InFlight;
use crate::models::{
    normalize_series, Bar, FetchOptions, Fingerprint, Pair, ProviderId, Quote, Timeframe,
    DERIVED_SOURCE, SYNTHETIC_SOURCE,
};
use crate::provider::MarketDataProvider;
use crate::registry::{DataValidator, ProviderMonitor, RankedProvider};
use crate::resolver::SymbolResolver;

pub use health::{CacheStats, HealthSnapshot, ProviderHealth, SweepReport, ViabilityReport};
pub use sink::AvailabilitySink;

/// Timeframe used to rank providers for live quotes.
const QUOTE_RANKING_TIMEFRAME: Timeframe = Timeframe::M1;

/// A normalized series request.
#[derive(Clone, Debug)]
struct SeriesRequest {
    pair: Pair,
    timeframe: Timeframe,
    bar_count: usize,
    options: FetchOptions,
}

/// Work handed to a shared series execution.
#[derive(Clone, Debug)]
pub(crate) struct SeriesJob {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) pair: Pair,
    pub(crate) timeframe: Timeframe,
    pub(crate) bar_count: usize,
    pub(crate) preference: Option<ProviderId>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) ttl: Duration,
    pub(crate) bypass_cache: bool,
}

/// Work handed to a shared quote execution.
#[derive(Clone, Debug)]
pub(crate) struct QuoteJob {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) pair: Pair,
    pub(crate) preference: Option<ProviderId>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) ttl: Duration,
    pub(crate) bypass_cache: bool,
}

pub(crate) struct Inner {
    pub(crate) config: MarketDataConfig,
    pub(crate) providers: BTreeMap<ProviderId, Arc<dyn MarketDataProvider>>,
    pub(crate) resolver: Arc<dyn SymbolResolver>,
    pub(crate) monitor: ProviderMonitor,
    pub(crate) validator: DataValidator,
    pub(crate) series_cache: TtlCache<Vec<Bar>>,
    pub(crate) quote_cache: TtlCache<Quote>,
    pub(crate) series_inflight: InFlight<Vec<Bar>>,
    pub(crate) quote_inflight: InFlight<Quote>,
    pub(crate) sink: Option<Arc<dyn AvailabilitySink>>,
}

/// Resilient multi-provider market data access.
///
/// Cheap to clone; clones share all state. Every instance built with
/// [`MarketDataCoordinator::new`] has its own independent state.
#[derive(Clone)]
pub struct MarketDataCoordinator {
    inner: Arc<Inner>,
}

impl MarketDataCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `config` - Rate limits, breaker thresholds, TTLs, scoring weights
    ///   and synthetic policy
    /// * `providers` - One adapter per upstream source
    /// * `resolver` - Pair and timeframe mapping injected into every call
    pub fn new(
        config: MarketDataConfig,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        resolver: Arc<dyn SymbolResolver>,
    ) -> Self {
        Self::with_availability_sink(config, providers, resolver, None)
    }

    /// Create a coordinator that reports availability to `sink`.
    pub fn with_availability_sink(
        config: MarketDataConfig,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        resolver: Arc<dyn SymbolResolver>,
        sink: Option<Arc<dyn AvailabilitySink>>,
    ) -> Self {
        let monitor = ProviderMonitor::new(&config);

        let mut registered = BTreeMap::new();
        for provider in providers {
            let id = provider.id();
            monitor.set_configured(id, provider.is_configured());
            if registered.insert(id, provider).is_some() {
                warn!("Provider '{}' registered twice, keeping the last adapter", id);
            }
        }

        info!(
            "Market data coordinator ready with providers: [{}]",
            registered
                .iter()
                .map(|(id, p)| format!(
                    "{}{}",
                    id,
                    if p.is_configured() { "" } else { " (unconfigured)" }
                ))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let validator = DataValidator::with_config(config.validation.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                providers: registered,
                resolver,
                monitor,
                validator,
                series_cache: TtlCache::new("series"),
                quote_cache: TtlCache::new("quote"),
                series_inflight: InFlight::new(),
                quote_inflight: InFlight::new(),
                sink,
            }),
        }
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.inner.config
    }

    /// Per-provider rate-limit, breaker and quality state.
    pub fn monitor(&self) -> &ProviderMonitor {
        &self.inner.monitor
    }

    /// Fetch up to `bar_count` bars, most recent last.
    ///
    /// `timeframe` accepts any alias of a canonical timeframe ("1h", "H1",
    /// "60m", ...). Only configuration errors and
    /// [`MarketDataError::RealtimeDataUnavailable`] are returned; individual
    /// provider failures are absorbed.
    pub async fn fetch_series(
        &self,
        pair: &str,
        timeframe: &str,
        bar_count: usize,
        options: &FetchOptions,
    ) -> Result<Vec<Bar>, MarketDataError> {
        options.validate()?;
        if bar_count == 0 {
            return Err(MarketDataError::Configuration(
                "barCount must be greater than zero".to_string(),
            ));
        }
        let max_bar_count = self.inner.config.max_bar_count;
        if bar_count > max_bar_count {
            return Err(MarketDataError::Configuration(format!(
                "barCount {} exceeds the limit of {}",
                bar_count, max_bar_count
            )));
        }

        let request = SeriesRequest {
            pair: Pair::parse(pair)?,
            timeframe: Timeframe::from_str(timeframe)?,
            bar_count,
            options: options.clone(),
        };

        self.resolve_series(request).await
    }

    /// Fetch a live quote.
    pub async fn fetch_quote(
        &self,
        pair: &str,
        options: &FetchOptions,
    ) -> Result<Quote, MarketDataError> {
        options.validate()?;
        let pair = Pair::parse(pair)?;
        self.resolve_quote(pair, options.clone()).await
    }

    fn resolve_series(&self, request: SeriesRequest) -> BoxFuture<'_, Result<Vec<Bar>, MarketDataError>> {
        async move {
            let inner = &self.inner;
            let options = &request.options;
            let allow_synthetic = inner.config.synthetic.permits(options)?;

            if options.force_synthetic {
                debug!("Synthetic series forced for {} {}", request.pair, request.timeframe);
                return Ok(inner.synthetic_series(&request.pair, request.timeframe, request.bar_count, Utc::now()));
            }

            let fingerprint = Fingerprint::series(
                &request.pair,
                request.timeframe,
                request.bar_count,
                options.purpose.as_deref(),
                options.provider_preference,
            );

            if !options.bypass_cache {
                if let Some(bars) = inner.series_cache.get(fingerprint.as_str(), Utc::now()) {
                    debug!("Series cache hit for '{}'", fingerprint);
                    return Ok(bars);
                }
            }

            let job = SeriesJob {
                fingerprint: fingerprint.clone(),
                pair: request.pair.clone(),
                timeframe: request.timeframe,
                bar_count: request.bar_count,
                preference: options.provider_preference,
                timeout: options.timeout(),
                ttl: options
                    .cache_ttl_override()
                    .unwrap_or_else(|| inner.config.cache.series_ttl(request.timeframe)),
                bypass_cache: options.bypass_cache,
            };

            let shared = Arc::clone(inner);
            let upstream = inner
                .series_inflight
                .run(fingerprint.as_str(), move || async move { shared.execute_series(job).await })
                .await;

            let unavailable = match upstream {
                Ok(bars) => return Ok(bars),
                Err(err @ MarketDataError::RealtimeDataUnavailable { .. }) => err,
                Err(err) => return Err(err),
            };

            if !options.disable_cross_derivation {
                if let Some(bars) = self.derive_cross_series(&request).await {
                    let ttl = options
                        .cache_ttl_override()
                        .unwrap_or_else(|| inner.config.cache.series_ttl(request.timeframe));
                    inner
                        .series_cache
                        .set(fingerprint.as_str(), bars.clone(), ttl, DERIVED_SOURCE, Utc::now());
                    return Ok(bars);
                }
            }

            if allow_synthetic {
                warn!(
                    "All providers failed for {} {}; serving synthetic bars",
                    request.pair, request.timeframe
                );
                return Ok(inner.synthetic_series(&request.pair, request.timeframe, request.bar_count, Utc::now()));
            }

            Err(unavailable)
        }
        .boxed()
    }

    /// Derive a cross series from its two USD legs. Legs never fall back
    /// to synthetic data or further derivation.
    async fn derive_cross_series(&self, request: &SeriesRequest) -> Option<Vec<Bar>> {
        let (base_leg, quote_leg) = cross::legs(&request.pair)?;
        let leg_options = leg_options(&request.options);

        debug!(
            "Deriving {} {} from {} and {}",
            request.pair, request.timeframe, base_leg, quote_leg
        );

        let leg = |pair: Pair| SeriesRequest {
            pair,
            timeframe: request.timeframe,
            bar_count: request.bar_count,
            options: leg_options.clone(),
        };

        let base_bars = self.resolve_series(leg(base_leg)).await.ok()?;
        let quote_bars = self.resolve_series(leg(quote_leg)).await.ok()?;

        let derived = normalize_series(
            cross::derive_series(&request.pair, &base_bars, &quote_bars),
            request.bar_count,
        );

        if derived.is_empty() {
            warn!("Cross derivation for {} produced no aligned bars", request.pair);
            None
        } else {
            info!("Derived {} bars for {} from USD legs", derived.len(), request.pair);
            Some(derived)
        }
    }

    fn resolve_quote(&self, pair: Pair, options: FetchOptions) -> BoxFuture<'_, Result<Quote, MarketDataError>> {
        async move {
            let inner = &self.inner;
            let allow_synthetic = inner.config.synthetic.permits(&options)?;

            if options.force_synthetic {
                return Ok(inner.synthetic_quote(&pair, Utc::now()));
            }

            let fingerprint = Fingerprint::quote(&pair);

            if !options.bypass_cache {
                if let Some(quote) = inner.quote_cache.get(fingerprint.as_str(), Utc::now()) {
                    debug!("Quote cache hit for '{}'", fingerprint);
                    return Ok(quote);
                }
            }

            let ttl = options
                .cache_ttl_override()
                .unwrap_or_else(|| inner.config.cache.quote_ttl());
            let job = QuoteJob {
                fingerprint: fingerprint.clone(),
                pair: pair.clone(),
                preference: options.provider_preference,
                timeout: options.timeout(),
                ttl,
                bypass_cache: options.bypass_cache,
            };

            let shared = Arc::clone(inner);
            let upstream = inner
                .quote_inflight
                .run(fingerprint.as_str(), move || async move { shared.execute_quote(job).await })
                .await;

            let unavailable = match upstream {
                Ok(quote) => return Ok(quote),
                Err(err @ MarketDataError::RealtimeDataUnavailable { .. }) => err,
                Err(err) => return Err(err),
            };

            if !options.disable_cross_derivation {
                if let Some((base_leg, quote_leg)) = cross::legs(&pair) {
                    let leg_options = leg_options(&options);
                    let legs = match self.resolve_quote(base_leg, leg_options.clone()).await {
                        Ok(a) => self.resolve_quote(quote_leg, leg_options).await.map(|b| (a, b)),
                        Err(err) => Err(err),
                    };
                    if let Ok((a, b)) = legs {
                        if let Some(derived) = cross::derive_quote(&pair, &a, &b) {
                            if inner.validator.validate_quote(&derived).is_ok() {
                                inner.quote_cache.set(
                                    fingerprint.as_str(),
                                    derived.clone(),
                                    ttl,
                                    DERIVED_SOURCE,
                                    Utc::now(),
                                );
                                return Ok(derived);
                            }
                        }
                    }
                }
            }

            if allow_synthetic {
                warn!("All providers failed for {} quote; serving synthetic quote", pair);
                return Ok(inner.synthetic_quote(&pair, Utc::now()));
            }

            Err(unavailable)
        }
        .boxed()
    }

    /// Current provider order for `timeframe`, best first.
    ///
    /// Only registered, configured providers are listed.
    pub fn provider_order(&self, timeframe: Timeframe) -> Vec<ProviderId> {
        self.inner
            .rank(timeframe, Utc::now())
            .into_iter()
            .map(|ranked| ranked.provider)
            .collect()
    }

    /// Ranked providers with their scores.
    pub fn provider_ranking(&self, timeframe: Timeframe) -> Vec<RankedProvider> {
        self.inner.rank(timeframe, Utc::now())
    }

    // ------------------------------------------------------------------
    // Administrative controls
    // ------------------------------------------------------------------

    pub fn set_provider_enabled(&self, provider: ProviderId, enabled: bool) {
        self.inner.monitor.set_enabled(provider, enabled);
    }

    pub fn reset_circuit_breaker(&self, provider: ProviderId) {
        self.inner.monitor.clear_circuit_breaker(provider);
    }

    /// Drop expired cache entries and close expired breakers.
    ///
    /// Reads already evict lazily; this is the optional periodic sweep.
    pub fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let report = SweepReport {
            series_entries: self.inner.series_cache.sweep_expired(now),
            quote_entries: self.inner.quote_cache.sweep_expired(now),
            circuit_breakers: self.inner.monitor.sweep_expired(now),
        };
        debug!("Sweep: {:?}", report);
        report
    }

    /// Drop every cached series and quote.
    pub fn clear_cache(&self) {
        self.inner.series_cache.clear();
        self.inner.quote_cache.clear();
    }
}

/// Options for fetching the USD legs of a cross.
fn leg_options(options: &FetchOptions) -> FetchOptions {
    FetchOptions {
        bypass_cache: options.bypass_cache,
        purpose: options.purpose.clone(),
        timeout_ms: options.timeout_ms,
        disable_cross_derivation: true,
        disallow_synthetic: true,
        ..FetchOptions::default()
    }
}

impl Inner {
    pub(crate) fn synthetic_series(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        bar_count: usize,
        now: DateTime<Utc>,
    ) -> Vec<Bar> {
        let mut rng = rand::thread_rng();
        self.config
            .synthetic
            .generate(pair, bar_count, timeframe, now, &mut rng)
    }

    pub(crate) fn synthetic_quote(&self, pair: &Pair, now: DateTime<Utc>) -> Quote {
        let mid = self
            .synthetic_series(pair, QUOTE_RANKING_TIMEFRAME, 1, now)
            .last()
            .map(|bar| bar.close)
            .unwrap_or_else(|| self.config.synthetic.base_price(pair));
        let half_spread = pair.pip_size() / 2.0;

        Quote {
            bid: Some(mid - half_spread),
            ask: Some(mid + half_spread),
            mid,
            spread_pips: Some(1.0),
            timestamp: now.timestamp_millis(),
            provider: SYNTHETIC_SOURCE.to_string(),
        }
    }
}
