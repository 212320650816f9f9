//! Sliding-window rate limiting with a backoff clock.
//!
//! Each provider keeps the timestamps of its recent attempts. The list is
//! always trimmed to the current window before it is read, so the usage
//! count is exact rather than an approximation. A rate-limit signal from
//! the provider pushes a separate `backoff_until` clock forward.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Serialize, Serializer};

use crate::clock;

use super::circuit_breaker::BreakerReason;

/// Why a request is not allowed right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowanceReason {
    Disabled,
    Unconfigured,
    CircuitBreaker(BreakerReason),
    Backoff,
    RateLimit,
    /// The provider is not tracked by this instance.
    Unknown,
}

impl fmt::Display for AllowanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Unconfigured => f.write_str("unconfigured"),
            Self::CircuitBreaker(reason) => write!(f, "circuit_breaker:{}", reason),
            Self::Backoff => f.write_str("backoff"),
            Self::RateLimit => f.write_str("rate_limit"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for AllowanceReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of an allowance check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestAllowance {
    pub allowed: bool,
    pub reason: Option<AllowanceReason>,
    /// Best-effort estimate of how long until a request could be allowed.
    pub wait: Duration,
}

impl RequestAllowance {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            wait: Duration::ZERO,
        }
    }

    pub fn denied(reason: AllowanceReason, wait: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            wait,
        }
    }
}

/// Sliding-window usage and backoff state for one provider.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    window: Duration,
    /// `None` means the provider is uncapped.
    max_requests: Option<u32>,
    /// Default backoff when the provider gives no retry-after.
    cooldown: Duration,
    usage: VecDeque<DateTime<Utc>>,
    remaining: Option<u32>,
    window_reset_at: Option<DateTime<Utc>>,
    backoff_until: Option<DateTime<Utc>>,
    last_rate_limited_at: Option<DateTime<Utc>>,
}

/// Read-only view of a provider's rate-limit window.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub window_ms: u64,
    pub max_requests: Option<u32>,
    pub used: usize,
    pub remaining: Option<u32>,
    pub window_reset_at: Option<DateTime<Utc>>,
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_rate_limited_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    pub fn new(max_requests: Option<u32>, window: Duration, cooldown: Duration) -> Self {
        Self {
            window,
            max_requests,
            cooldown,
            usage: VecDeque::new(),
            remaining: max_requests,
            window_reset_at: None,
            backoff_until: None,
            last_rate_limited_at: None,
        }
    }

    /// Drop usage samples older than the window and refresh derived fields.
    fn trim(&mut self, now: DateTime<Utc>) {
        while let Some(oldest) = self.usage.front() {
            if clock::after(*oldest, self.window) <= now {
                self.usage.pop_front();
            } else {
                break;
            }
        }

        self.window_reset_at = self.usage.front().map(|t| clock::after(*t, self.window));
        if let Some(max) = self.max_requests {
            self.remaining = if self.is_backed_off(now) {
                Some(0)
            } else {
                Some(max.saturating_sub(self.usage.len() as u32))
            };
        }
    }

    /// Attempts inside the current window.
    pub fn used(&mut self, now: DateTime<Utc>) -> usize {
        self.trim(now);
        self.usage.len()
    }

    pub fn is_backed_off(&self, now: DateTime<Utc>) -> bool {
        self.backoff_until.map(|until| until > now).unwrap_or(false)
    }

    pub fn backoff_until(&self) -> Option<DateTime<Utc>> {
        self.backoff_until
    }

    /// True when the window is full.
    pub fn is_exhausted(&mut self, now: DateTime<Utc>) -> bool {
        match self.max_requests {
            Some(max) => self.used(now) >= max as usize,
            None => false,
        }
    }

    /// Window check only: backoff and capacity.
    pub fn check(&mut self, now: DateTime<Utc>) -> Option<(AllowanceReason, Duration)> {
        self.trim(now);

        if let Some(until) = self.backoff_until.filter(|until| *until > now) {
            return Some((AllowanceReason::Backoff, clock::until(now, until)));
        }

        if self.is_exhausted(now) {
            let wait = self
                .window_reset_at
                .map(|reset| clock::until(now, reset))
                .unwrap_or(self.window);
            return Some((AllowanceReason::RateLimit, wait));
        }

        None
    }

    /// Record an attempt. Called for every attempt, not only successes.
    pub fn add_sample(&mut self, now: DateTime<Utc>) {
        self.usage.push_back(now);
        self.trim(now);
    }

    /// Start a backoff of `max(retry_after or cooldown, floor)`.
    pub fn register_hit(&mut self, retry_after: Option<Duration>, floor: Duration, now: DateTime<Utc>) {
        let backoff = retry_after.unwrap_or(self.cooldown).max(floor);
        let until = clock::after(now, backoff);

        debug!("Rate limiter: backing off for {:?} (until {})", backoff, until);

        self.backoff_until = Some(until);
        self.last_rate_limited_at = Some(now);
        self.remaining = self.max_requests.map(|_| 0);
    }

    /// Share of the window already used; uncapped providers report 0.
    pub fn usage_ratio(&mut self, now: DateTime<Utc>) -> f64 {
        match self.max_requests {
            Some(0) => 1.0,
            Some(max) => self.used(now) as f64 / max as f64,
            None => 0.0,
        }
    }

    pub fn remaining(&mut self, now: DateTime<Utc>) -> Option<u32> {
        self.trim(now);
        self.remaining
    }

    pub fn snapshot(&mut self, now: DateTime<Utc>) -> RateLimitSnapshot {
        self.trim(now);
        RateLimitSnapshot {
            window_ms: self.window.as_millis() as u64,
            max_requests: self.max_requests,
            used: self.usage.len(),
            remaining: self.remaining,
            window_reset_at: self.window_reset_at,
            backoff_until: self.backoff_until,
            last_rate_limited_at: self.last_rate_limited_at,
        }
    }
}
