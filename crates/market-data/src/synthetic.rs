//! Last-resort synthetic bar generation and the policy that gates it.
//!
//! Synthetic bars are not market data. They are only produced when the
//! caller's effective policy explicitly allows them, and a hard-disabled
//! policy turns them off for every call site.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::{Bar, FetchOptions, Pair, Timeframe, SYNTHETIC_SOURCE};

const DEFAULT_VOLATILITY: f64 = 0.0015;
const DEFAULT_BASE_PRICE: f64 = 1.0;

/// Per-bar volume band.
const VOLUME_RANGE: std::ops::Range<f64> = 100.0..1_000.0;

fn default_base_prices() -> BTreeMap<String, f64> {
    [
        ("EURUSD", 1.08),
        ("GBPUSD", 1.27),
        ("AUDUSD", 0.66),
        ("NZDUSD", 0.61),
        ("USDJPY", 150.0),
        ("USDCHF", 0.88),
        ("USDCAD", 1.36),
        ("XAUUSD", 2_000.0),
    ]
    .into_iter()
    .map(|(pair, price)| (pair.to_string(), price))
    .collect()
}

/// When synthetic data may be served, and how it looks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPolicy {
    /// Permit synthetic data for callers that don't ask either way.
    pub allow_by_default: bool,
    /// Never produce synthetic data, whatever the caller asks for.
    pub hard_disabled: bool,
    /// Purposes for which synthetic data is permitted.
    pub allowed_purposes: BTreeSet<String>,
    /// Relative per-bar drift bound.
    pub volatility: f64,
    pub base_prices: BTreeMap<String, f64>,
    pub default_base_price: f64,
}

impl Default for SyntheticPolicy {
    fn default() -> Self {
        Self {
            allow_by_default: false,
            hard_disabled: false,
            allowed_purposes: BTreeSet::new(),
            volatility: DEFAULT_VOLATILITY,
            base_prices: default_base_prices(),
            default_base_price: DEFAULT_BASE_PRICE,
        }
    }
}

impl SyntheticPolicy {
    /// Effective permission for one call.
    pub fn permits(&self, options: &FetchOptions) -> Result<bool, MarketDataError> {
        if options.force_synthetic && self.hard_disabled {
            return Err(MarketDataError::Configuration(
                "forceSynthetic requested but synthetic data is disabled".to_string(),
            ));
        }
        if options.force_synthetic && options.disallow_synthetic {
            return Err(MarketDataError::Configuration(
                "forceSynthetic and disallowSynthetic are mutually exclusive".to_string(),
            ));
        }

        if self.hard_disabled || options.disallow_synthetic {
            return Ok(false);
        }

        let purpose_allowed = options
            .purpose
            .as_ref()
            .is_some_and(|purpose| self.allowed_purposes.contains(purpose));

        Ok(options.force_synthetic || purpose_allowed || self.allow_by_default)
    }

    pub fn base_price(&self, pair: &Pair) -> f64 {
        self.base_prices
            .get(pair.as_str())
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(self.default_base_price)
    }

    /// Generate a series for `pair` with this policy's price and volatility.
    pub fn generate<R: Rng>(
        &self,
        pair: &Pair,
        bar_count: usize,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<Bar> {
        generate_series(
            bar_count,
            timeframe,
            self.base_price(pair),
            self.volatility,
            now,
            rng,
        )
    }
}

/// Timestamp of the first of `bar_count` bars ending at `last`, saturating
/// instead of overflowing for absurd counts.
fn series_start(last: i64, step: i64, bar_count: usize) -> i64 {
    let span = i64::try_from(bar_count.saturating_sub(1)).unwrap_or(i64::MAX);
    last.saturating_sub(span.saturating_mul(step))
}

/// Random-walk bars ending at the last timeframe boundary at or before `now`.
///
/// Timestamps are exactly one timeframe apart. Each bar opens at the
/// previous close; close drifts by at most `volatility` of the open; high and
/// low pad the body by a volatility-scaled amount.
pub fn generate_series<R: Rng>(
    bar_count: usize,
    timeframe: Timeframe,
    base_price: f64,
    volatility: f64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Bar> {
    if bar_count == 0 {
        return Vec::new();
    }

    let step = timeframe.millis();
    let last = now.timestamp_millis().div_euclid(step) * step;
    let first = series_start(last, step, bar_count);
    let volatility = if volatility.is_finite() { volatility.abs() } else { DEFAULT_VOLATILITY };
    let floor = base_price * 1e-6;

    let mut close = base_price;
    (0..bar_count as i64)
        .map(|i| {
            let open = close;
            let drift = rng.gen_range(-1.0..=1.0) * volatility * open;
            close = (open + drift).max(floor);

            let pad = volatility * open * 0.5;
            let high = open.max(close) + rng.gen::<f64>() * pad;
            let low = (open.min(close) - rng.gen::<f64>() * pad).max(floor);

            Bar {
                time: first.saturating_add(i.saturating_mul(step)),
                open,
                high,
                low,
                close,
                volume: rng.gen_range(VOLUME_RANGE),
                provider: SYNTHETIC_SOURCE.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn options() -> FetchOptions {
        FetchOptions::default()
    }

    #[test]
    fn test_series_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        let bars = generate_series(100, Timeframe::M15, 1.08, 0.0015, now, &mut rng);

        assert_eq!(bars.len(), 100);
        assert!(bars.windows(2).all(|w| w[1].time - w[0].time == 900_000));
        assert!(bars.last().unwrap().time <= now.timestamp_millis());
        assert!(bars.iter().all(|b| b.provider == SYNTHETIC_SOURCE));
        assert!(bars.windows(2).all(|w| w[1].open == w[0].close));
        assert!(bars
            .iter()
            .all(|b| b.high >= b.open.max(b.close) && b.low <= b.open.min(b.close) && b.low > 0.0));
        assert!(bars.iter().all(|b| VOLUME_RANGE.contains(&b.volume)));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let now = Utc::now();
        let a = generate_series(10, Timeframe::H1, 150.0, 0.002, now, &mut StdRng::seed_from_u64(1));
        let b = generate_series(10, Timeframe::H1, 150.0, 0.002, now, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_series_start_saturates() {
        let step = Timeframe::D1.millis();
        let last = 1_700_006_400_000;
        assert_eq!(series_start(last, step, 1), last);
        assert_eq!(series_start(last, step, 3), last - 2 * step);
        assert_eq!(series_start(last, step, usize::MAX), last - i64::MAX);
    }

    #[test]
    fn test_zero_bars() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate_series(0, Timeframe::D1, 1.0, 0.01, Utc::now(), &mut rng).is_empty());
    }

    #[test]
    fn test_default_policy_refuses() {
        let policy = SyntheticPolicy::default();
        assert_eq!(policy.permits(&options()), Ok(false));
    }

    #[test]
    fn test_policy_resolution() {
        let mut policy = SyntheticPolicy::default();
        policy.allowed_purposes.insert("backtest".to_string());

        let backtest = FetchOptions {
            purpose: Some("backtest".to_string()),
            ..options()
        };
        assert_eq!(policy.permits(&backtest), Ok(true));

        let forced = FetchOptions {
            force_synthetic: true,
            ..options()
        };
        assert_eq!(policy.permits(&forced), Ok(true));

        let allow_all = SyntheticPolicy {
            allow_by_default: true,
            ..SyntheticPolicy::default()
        };
        let disallowed = FetchOptions {
            disallow_synthetic: true,
            ..options()
        };
        assert_eq!(allow_all.permits(&options()), Ok(true));
        assert_eq!(allow_all.permits(&disallowed), Ok(false));
    }

    #[test]
    fn test_hard_disable_wins() {
        let policy = SyntheticPolicy {
            allow_by_default: true,
            hard_disabled: true,
            ..SyntheticPolicy::default()
        };
        assert_eq!(policy.permits(&options()), Ok(false));

        let forced = FetchOptions {
            force_synthetic: true,
            ..options()
        };
        assert!(matches!(policy.permits(&forced), Err(MarketDataError::Configuration(_))));
    }

    #[test]
    fn test_base_price_lookup() {
        let policy = SyntheticPolicy::default();
        assert_eq!(policy.base_price(&Pair::parse("USDJPY").unwrap()), 150.0);
        assert_eq!(policy.base_price(&Pair::parse("EURSEK").unwrap()), DEFAULT_BASE_PRICE);
    }
}
