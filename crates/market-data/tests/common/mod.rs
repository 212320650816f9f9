//! Shared fixtures for coordinator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tradefeed_market_data::{
    AvailabilitySink, Bar, BarRequest, MarketDataConfig, MarketDataCoordinator, MarketDataError,
    MarketDataProvider, ProviderAvailability, ProviderCapabilities, ProviderId, Quote,
    QuoteRequest, RulesResolver,
};

/// How a mock answers.
#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed,
    Fail,
    RateLimited(Option<Duration>),
    /// Sleep before succeeding.
    Slow(Duration),
}

pub struct MockProvider {
    pub id: ProviderId,
    pub behavior: Behavior,
    pub configured: bool,
    /// Pairs this mock fails for regardless of `behavior`.
    pub failing_pairs: Vec<&'static str>,
    pub call_count: AtomicUsize,
    /// Delay applied to successful calls so concurrent callers overlap.
    pub latency: Duration,
}

impl MockProvider {
    pub fn new(id: ProviderId, behavior: Behavior) -> Self {
        Self {
            id,
            behavior,
            configured: true,
            failing_pairs: Vec::new(),
            call_count: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn failing_for(mut self, pairs: &[&'static str]) -> Self {
        self.failing_pairs = pairs.to_vec();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn respond(&self, pair: &str) -> Result<(), MarketDataError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.failing_pairs.contains(&pair) {
            return Err(MarketDataError::ProviderError {
                provider: self.id,
                message: format!("no data for {}", pair),
            });
        }

        match &self.behavior {
            Behavior::Succeed => {
                if !self.latency.is_zero() {
                    tokio::time::sleep(self.latency).await;
                }
                Ok(())
            }
            Behavior::Fail => Err(MarketDataError::ProviderError {
                provider: self.id,
                message: "Mock failure".to_string(),
            }),
            Behavior::RateLimited(retry_after) => Err(MarketDataError::RateLimited {
                provider: self.id,
                retry_after: *retry_after,
            }),
            Behavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        }
    }
}

/// Price level a mock reports for a pair.
pub fn price_for(pair: &str) -> f64 {
    match pair {
        "USDJPY" => 150.0,
        "EURUSD" => 1.1,
        "GBPUSD" => 1.25,
        _ => 1.0,
    }
}

pub fn mock_bars(pair: &str, step_ms: i64, count: usize, provider: ProviderId) -> Vec<Bar> {
    let price = price_for(pair);
    (1..=count as i64)
        .map(|i| Bar {
            time: i * step_ms,
            open: price,
            high: price * 1.001,
            low: price * 0.999,
            close: price,
            volume: 10.0,
            provider: provider.as_str().to_string(),
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_bars: true,
            supports_quotes: true,
        }
    }

    async fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, MarketDataError> {
        self.respond(request.pair.as_str()).await?;
        Ok(mock_bars(
            request.pair.as_str(),
            request.timeframe.millis(),
            request.bar_count,
            self.id,
        ))
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError> {
        self.respond(request.pair.as_str()).await?;
        let mid = price_for(request.pair.as_str());
        Ok(Quote {
            bid: Some(mid * 0.9999),
            ask: Some(mid * 1.0001),
            mid,
            spread_pips: Some(2.0),
            timestamp: 1_700_000_000_000,
            provider: self.id.as_str().to_string(),
        })
    }
}

/// Sink that keeps every record.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<ProviderAvailability>>,
}

impl AvailabilitySink for RecordingSink {
    fn record(&self, availability: &ProviderAvailability) -> Result<(), MarketDataError> {
        self.records
            .lock()
            .map_err(|e| MarketDataError::Internal(e.to_string()))?
            .push(availability.clone());
        Ok(())
    }
}

pub fn coordinator(config: MarketDataConfig, providers: &[Arc<MockProvider>]) -> MarketDataCoordinator {
    let providers: Vec<Arc<dyn MarketDataProvider>> = providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn MarketDataProvider>)
        .collect();
    MarketDataCoordinator::new(config, providers, Arc::new(RulesResolver::new()))
}
