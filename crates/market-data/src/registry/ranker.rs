//! Dynamic provider ordering.
//!
//! Each timeframe class has a static base ordering. On top of it, every
//! provider gets a composite score from its live signals:
//!
//! ```text
//! score = (N - base_index) * base
//!       + quality * quality_weight
//!       + success_ratio * success_weight
//!       - avg_latency_ms / latency_divisor
//!       - usage_ratio * usage_weight
//!       - breaker_penalty  [breaker open]
//!       - backoff_penalty  [in backoff]
//!       - unconfigured_penalty [no credentials]
//!       - disabled_penalty [administratively disabled]
//! ```
//!
//! Providers are sorted by descending score. Ties keep the base ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{ProviderId, Timeframe, TimeframeClass};

/// Base ordering for intraday timeframes of 30 minutes or less. Also used for
/// unclassified timeframes.
const FAST_PRIORITY: [ProviderId; 4] = [
    ProviderId::TwelveData,
    ProviderId::Finnhub,
    ProviderId::Polygon,
    ProviderId::AlphaVantage,
];

/// Base ordering for multi-hour timeframes.
const SLOW_PRIORITY: [ProviderId; 4] = [
    ProviderId::TwelveData,
    ProviderId::Polygon,
    ProviderId::Finnhub,
    ProviderId::AlphaVantage,
];

/// Base ordering for daily and weekly bars.
const DAILY_PRIORITY: [ProviderId; 4] = [
    ProviderId::AlphaVantage,
    ProviderId::TwelveData,
    ProviderId::Polygon,
    ProviderId::Finnhub,
];

/// Static base ordering for a timeframe.
pub fn base_priority(timeframe: Timeframe) -> &'static [ProviderId; 4] {
    match timeframe.class() {
        TimeframeClass::Fast | TimeframeClass::Unclassified => &FAST_PRIORITY,
        TimeframeClass::Slow => &SLOW_PRIORITY,
        TimeframeClass::Daily => &DAILY_PRIORITY,
    }
}

/// Weights of the composite ranking score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub base_weight: f64,
    pub quality_weight: f64,
    pub success_weight: f64,
    pub latency_divisor: f64,
    pub usage_weight: f64,
    pub breaker_penalty: f64,
    pub backoff_penalty: f64,
    pub unconfigured_penalty: f64,
    pub disabled_penalty: f64,
    /// Quality assumed for a provider with no samples yet.
    pub neutral_quality: f64,
    /// Success ratio assumed for a provider with no samples yet.
    pub neutral_success_ratio: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_weight: 40.0,
            quality_weight: 35.0,
            success_weight: 30.0,
            latency_divisor: 120.0,
            usage_weight: 25.0,
            breaker_penalty: 60.0,
            backoff_penalty: 40.0,
            unconfigured_penalty: 80.0,
            disabled_penalty: 120.0,
            neutral_quality: 0.6,
            neutral_success_ratio: 0.75,
        }
    }
}

/// Live inputs to the score for one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSignals {
    pub provider: ProviderId,
    pub quality: Option<f64>,
    pub success_ratio: Option<f64>,
    pub avg_latency_ms: f64,
    pub usage_ratio: f64,
    pub breaker_open: bool,
    pub in_backoff: bool,
    pub configured: bool,
    pub disabled: bool,
}

impl ProviderSignals {
    /// Signals of a provider nothing is known about yet.
    pub fn fresh(provider: ProviderId) -> Self {
        Self {
            provider,
            quality: None,
            success_ratio: None,
            avg_latency_ms: 0.0,
            usage_ratio: 0.0,
            breaker_open: false,
            in_backoff: false,
            configured: true,
            disabled: false,
        }
    }
}

/// One ranked provider with its score.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProvider {
    pub provider: ProviderId,
    pub score: f64,
}

impl ScoringPolicy {
    fn penalty(&self, applies: bool, amount: f64) -> f64 {
        if applies {
            amount
        } else {
            0.0
        }
    }

    /// Composite score of one provider. `base_index` is its position in the
    /// static table of `table_len` entries.
    pub fn score(&self, signals: &ProviderSignals, base_index: usize, table_len: usize) -> f64 {
        let base = table_len.saturating_sub(base_index) as f64 * self.base_weight;
        let quality = signals.quality.unwrap_or(self.neutral_quality);
        let success = signals.success_ratio.unwrap_or(self.neutral_success_ratio);
        let latency = if self.latency_divisor > 0.0 {
            signals.avg_latency_ms / self.latency_divisor
        } else {
            0.0
        };

        base + quality * self.quality_weight + success * self.success_weight
            - latency
            - signals.usage_ratio * self.usage_weight
            - self.penalty(signals.breaker_open, self.breaker_penalty)
            - self.penalty(signals.in_backoff, self.backoff_penalty)
            - self.penalty(!signals.configured, self.unconfigured_penalty)
            - self.penalty(signals.disabled, self.disabled_penalty)
    }

    /// Rank `candidates` for `timeframe`, highest score first.
    ///
    /// Providers missing from the base table rank after every listed one at
    /// equal signals.
    pub fn rank(&self, timeframe: Timeframe, candidates: &[ProviderSignals]) -> Vec<RankedProvider> {
        let table = base_priority(timeframe);

        let mut indexed: Vec<(usize, RankedProvider)> = candidates
            .iter()
            .map(|signals| {
                let base_index = table
                    .iter()
                    .position(|p| *p == signals.provider)
                    .unwrap_or(table.len());
                (
                    base_index,
                    RankedProvider {
                        provider: signals.provider,
                        score: self.score(signals, base_index, table.len()),
                    },
                )
            })
            .collect();

        indexed.sort_by(|(a_index, a), (b_index, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a_index.cmp(b_index))
        });

        indexed.into_iter().map(|(_, ranked)| ranked).collect()
    }
}
