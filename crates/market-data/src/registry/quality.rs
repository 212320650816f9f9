//! Rolling request metrics, quality scoring and health classification.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock;

/// Rolling latency window size.
const LATENCY_WINDOW: usize = 20;

/// Weight of the newest quality score in the smoothed value.
const QUALITY_SMOOTHING: f64 = 0.35;

/// Success ratio or quality below this marks a provider degraded.
const DEGRADED_THRESHOLD: f64 = 0.6;

/// Outcome of one provider request, built once at the adapter boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RequestOutcome {
    Success {
        latency: Option<Duration>,
        /// Completeness of the response, 0..1.
        quality: f64,
    },
    Failure {
        latency: Option<Duration>,
        quality: f64,
    },
}

impl RequestOutcome {
    pub fn success(latency: Option<Duration>) -> Self {
        Self::Success { latency, quality: 1.0 }
    }

    pub fn failure(latency: Option<Duration>) -> Self {
        Self::Failure { latency, quality: 0.0 }
    }

    /// Replace the default quality score.
    pub fn with_quality(self, score: f64) -> Self {
        match self {
            Self::Success { latency, .. } => Self::Success { latency, quality: score },
            Self::Failure { latency, .. } => Self::Failure { latency, quality: score },
        }
    }

    /// Build an outcome from a loosely-specified report.
    ///
    /// `success` defaults to true; `quality` defaults to 1 on success and 0
    /// on failure.
    pub fn from_report(success: Option<bool>, latency: Option<Duration>, quality: Option<f64>) -> Self {
        let outcome = if success.unwrap_or(true) {
            Self::success(latency)
        } else {
            Self::failure(latency)
        };
        match quality {
            Some(score) => outcome.with_quality(score),
            None => outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            Self::Success { latency, .. } | Self::Failure { latency, .. } => *latency,
        }
    }

    pub fn quality(&self) -> f64 {
        match self {
            Self::Success { quality, .. } | Self::Failure { quality, .. } => *quality,
        }
    }
}

impl From<bool> for RequestOutcome {
    fn from(success: bool) -> Self {
        Self::from_report(Some(success), None, None)
    }
}

/// Provider health classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Blocked,
}

/// Rolling metrics for one provider.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub sample_count: u64,
    pub rate_limited_count: u64,
    pub consecutive_failures: u32,
    #[serde(skip)]
    latencies: VecDeque<f64>,
    pub avg_latency_ms: f64,
    /// Latest raw quality score as reported.
    pub quality_score: Option<f64>,
    /// Smoothed quality, clamped to 0..1.
    pub normalized_quality: Option<f64>,
    pub health: HealthStatus,
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl ProviderMetrics {
    /// Fold one outcome into the metrics. Health is refreshed separately,
    /// once the breaker has been evaluated.
    pub fn record(&mut self, outcome: &RequestOutcome, now: DateTime<Utc>) {
        self.sample_count += 1;
        self.last_request_at = Some(now);

        if outcome.is_success() {
            self.success_count += 1;
            self.consecutive_failures = 0;
            self.last_success_at = Some(now);
        } else {
            self.failure_count += 1;
            self.consecutive_failures += 1;
            self.last_failure_at = Some(now);
        }

        if let Some(latency) = outcome.latency() {
            if self.latencies.len() == LATENCY_WINDOW {
                self.latencies.pop_front();
            }
            self.latencies.push_back(clock::millis(latency));
            self.avg_latency_ms = self.latencies.iter().sum::<f64>() / self.latencies.len() as f64;
        }

        self.quality_score = Some(outcome.quality());
        let score = self.latest_quality().unwrap_or(0.0);
        let smoothed = match self.normalized_quality {
            Some(previous) => previous + QUALITY_SMOOTHING * (score - previous),
            None => score,
        };
        self.normalized_quality = Some(smoothed.clamp(0.0, 1.0));
    }

    /// Latest quality score clamped to 0..1; non-finite scores count as 0.
    pub fn latest_quality(&self) -> Option<f64> {
        self.quality_score
            .map(|raw| if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 })
    }

    /// A request skipped because the local limiter said no.
    pub fn record_rate_limited(&mut self, now: DateTime<Utc>) {
        self.rate_limited_count += 1;
        self.last_request_at = Some(now);
    }

    pub fn latency_samples(&self) -> usize {
        self.latencies.len()
    }

    pub fn success_ratio(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        (total > 0).then(|| self.success_count as f64 / total as f64)
    }

    pub fn refresh_health(&mut self, breaker_open: bool) {
        self.health = if breaker_open {
            HealthStatus::Blocked
        } else {
            match (self.success_ratio(), self.normalized_quality) {
                (None, _) => HealthStatus::Unknown,
                (Some(ratio), quality) => {
                    if ratio < DEGRADED_THRESHOLD || quality.unwrap_or(1.0) < DEGRADED_THRESHOLD {
                        HealthStatus::Degraded
                    } else {
                        HealthStatus::Healthy
                    }
                }
            }
        };
    }
}
