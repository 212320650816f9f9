//! Provider resilience subsystem.
//!
//! This module owns per-provider state and the policies built on it:
//! - Sliding-window rate limiting with backoff
//! - Circuit breaking on failures, latency and quality
//! - Rolling quality metrics and health classification
//! - Dynamic provider ranking
//! - Bar and quote validation

mod circuit_breaker;
mod monitor;
mod quality;
mod ranker;
mod rate_limiter;
mod skip_reason;
mod validator;

pub use circuit_breaker::{BreakerReason, CircuitBreakerConfig, CircuitBreakerState};
pub use monitor::{ProviderAvailability, ProviderMonitor, ProviderSnapshot};
pub use quality::{HealthStatus, ProviderMetrics, RequestOutcome};
pub use ranker::{base_priority, ProviderSignals, RankedProvider, ScoringPolicy};
pub use rate_limiter::{AllowanceReason, RateLimitSnapshot, RateLimitState, RequestAllowance};
pub use skip_reason::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use validator::{DataValidator, ValidationSeverity, ValidatorConfig};
