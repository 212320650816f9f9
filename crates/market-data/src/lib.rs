//! Tradefeed Market Data Crate
//!
//! Resilient access to FX market data from several upstream sources with
//! different rate limits, reliability and latency.
//!
//! # Overview
//!
//! The crate supports:
//! - OHLCV series and live quotes for canonical pairs (EURUSD, XAUUSD, ...)
//! - Multiple providers: Twelve Data, Finnhub, Alpha Vantage, Polygon
//! - Sliding-window rate limiting with backoff
//! - Circuit breaking on failures, latency and quality
//! - Dynamic provider ranking per timeframe
//! - TTL caching and in-flight request coalescing
//! - Cross-pair derivation and an opt-in synthetic fallback
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   Caller         |  fetch_series / fetch_quote
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |  Coordinator     | --> | Cache / InFlight |  (fingerprint keyed)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! | ProviderMonitor  | --> |     Ranker       |  (rate, breaker, quality)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |    Resolver      |  (pair/timeframe -> provider symbol/interval)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |    Provider      |  (Finnhub, AlphaVantage, ...)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`MarketDataCoordinator`] - The facade every fetch goes through
//! - [`Pair`] / [`Timeframe`] - Canonical request identity
//! - [`Bar`] / [`Quote`] - Market data
//! - [`FetchOptions`] - Per-call options
//! - [`MarketDataConfig`] - Explicit configuration for one instance

pub mod cache;
pub(crate) mod clock;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod inflight;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod synthetic;

// Re-export all public types from models
pub use models::{
    normalize_series, Bar, FetchOptions, Fingerprint, Pair, ProviderId, Quote, Timeframe,
    TimeframeClass, DERIVED_SOURCE, SYNTHETIC_SOURCE,
};

// Re-export coordinator types
pub use coordinator::{
    AvailabilitySink, CacheStats, HealthSnapshot, MarketDataCoordinator, ProviderHealth,
    SweepReport, ViabilityReport,
};

pub use config::{MarketDataConfig, ProviderSettings};

// Re-export resolver types
pub use resolver::{ProviderInstrument, RulesResolver, SymbolResolver};

// Re-export provider types
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::finnhub::FinnhubProvider;
pub use provider::{BarRequest, MarketDataProvider, ProviderCapabilities, QuoteRequest};

// Re-export registry types
pub use registry::{
    CircuitBreakerConfig, DataValidator, FetchDiagnostics, HealthStatus, ProviderAvailability,
    ProviderMonitor, RankedProvider, RequestOutcome, ScoringPolicy, SkipReason,
};

pub use errors::{MarketDataError, RetryClass};
pub use synthetic::SyntheticPolicy;
