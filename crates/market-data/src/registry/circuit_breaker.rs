//! Per-provider circuit breaker driven by failure, latency and quality
//! signals.
//!
//! The breaker has two states:
//!
//! - **Closed**: no breaker record; requests are routed to the provider.
//! - **Open**: a record with a reason and an expiry; the provider is skipped.
//!
//! There is no background timer and no half-open probe state. An open
//! breaker closes lazily, the next time something checks it and finds
//! `now >= expires_at`. Closing resets the consecutive-failure count.
//!
//! Triggers are evaluated after every recorded request. When more than one
//! fires in the same pass, the most severe one wins: the candidate with the
//! latest expiry, with ties going to failures, then latency, then quality.
//! An existing open breaker is only replaced by a candidate that expires no
//! earlier.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock;

use super::quality::ProviderMetrics;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default cooldown after a failure-triggered open.
const DEFAULT_FAILURE_COOLDOWN_MS: u64 = 120_000;

/// Average latency above `target * multiplier` opens the circuit.
const DEFAULT_LATENCY_MULTIPLIER: f64 = 1.6;

const DEFAULT_LATENCY_COOLDOWN_MS: u64 = 90_000;

/// Normalized quality below this opens the circuit.
const DEFAULT_QUALITY_THRESHOLD: f64 = 0.4;

const DEFAULT_QUALITY_COOLDOWN_MS: u64 = 60_000;

/// Samples required before latency or quality can trip the breaker.
const DEFAULT_MIN_SAMPLES: u64 = 5;

/// Why a breaker opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerReason {
    Failures,
    Latency,
    Quality,
}

impl BreakerReason {
    /// Tie-break rank: lower is more severe.
    fn rank(&self) -> u8 {
        match self {
            Self::Failures => 0,
            Self::Latency => 1,
            Self::Quality => 2,
        }
    }
}

impl fmt::Display for BreakerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failures => f.write_str("failures"),
            Self::Latency => f.write_str("latency"),
            Self::Quality => f.write_str("quality"),
        }
    }
}

/// Open breaker record. Absent means closed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub reason: BreakerReason,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CircuitBreakerState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `self` should replace `current`.
    pub fn supersedes(&self, current: &CircuitBreakerState) -> bool {
        self.expires_at > current.expires_at
            || (self.expires_at == current.expires_at && self.reason.rank() <= current.reason.rank())
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_cooldown_ms: u64,
    pub latency_multiplier: f64,
    pub latency_cooldown_ms: u64,
    pub quality_threshold: f64,
    pub quality_cooldown_ms: u64,
    pub min_samples: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_cooldown_ms: DEFAULT_FAILURE_COOLDOWN_MS,
            latency_multiplier: DEFAULT_LATENCY_MULTIPLIER,
            latency_cooldown_ms: DEFAULT_LATENCY_COOLDOWN_MS,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            quality_cooldown_ms: DEFAULT_QUALITY_COOLDOWN_MS,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl CircuitBreakerConfig {
    fn cooldown(&self, reason: BreakerReason) -> Duration {
        Duration::from_millis(match reason {
            BreakerReason::Failures => self.failure_cooldown_ms,
            BreakerReason::Latency => self.latency_cooldown_ms,
            BreakerReason::Quality => self.quality_cooldown_ms,
        })
    }

    /// Evaluate every trigger against `metrics` and return the most severe
    /// one that fired, if any.
    pub fn evaluate(
        &self,
        metrics: &ProviderMetrics,
        latency_target: Duration,
        now: DateTime<Utc>,
    ) -> Option<CircuitBreakerState> {
        let mut triggered = Vec::with_capacity(3);

        if metrics.consecutive_failures >= self.failure_threshold {
            triggered.push(BreakerReason::Failures);
        }

        let latency_limit = clock::millis(latency_target) * self.latency_multiplier;
        if metrics.latency_samples() as u64 >= self.min_samples && metrics.avg_latency_ms > latency_limit {
            triggered.push(BreakerReason::Latency);
        }

        // Only a poor latest response can trip the quality breaker.
        if metrics.sample_count >= self.min_samples {
            let smoothed = metrics.normalized_quality;
            if let (Some(smoothed), Some(latest)) = (smoothed, metrics.latest_quality()) {
                if smoothed < self.quality_threshold && latest < self.quality_threshold {
                    triggered.push(BreakerReason::Quality);
                }
            }
        }

        triggered
            .into_iter()
            .map(|reason| CircuitBreakerState {
                reason,
                activated_at: now,
                expires_at: clock::after(now, self.cooldown(reason)),
            })
            .reduce(|best, candidate| if candidate.supersedes(&best) { candidate } else { best })
    }
}
