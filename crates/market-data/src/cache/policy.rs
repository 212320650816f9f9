use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Timeframe;

const DEFAULT_QUOTE_TTL_MS: u64 = 5_000;

fn default_series_ttl_ms(timeframe: Timeframe) -> u64 {
    match timeframe {
        Timeframe::M1 => 30_000,
        Timeframe::M5 => 60_000,
        Timeframe::M15 => 180_000,
        Timeframe::M30 => 300_000,
        Timeframe::H1 => 600_000,
        Timeframe::H4 => 1_800_000,
        Timeframe::D1 => 6 * 3_600_000,
        Timeframe::W1 => 12 * 3_600_000,
    }
}

/// How long fetched data stays fresh.
///
/// Series TTLs scale with bar granularity: a minute bar goes stale in
/// seconds, a daily bar in hours. Timeframes missing from `series_ttl_ms`
/// use the built-in table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlPolicy {
    pub series_ttl_ms: BTreeMap<Timeframe, u64>,
    pub quote_ttl_ms: u64,
}

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self {
            series_ttl_ms: Timeframe::ALL
                .iter()
                .map(|tf| (*tf, default_series_ttl_ms(*tf)))
                .collect(),
            quote_ttl_ms: DEFAULT_QUOTE_TTL_MS,
        }
    }
}

impl CacheTtlPolicy {
    pub fn series_ttl(&self, timeframe: Timeframe) -> Duration {
        let ms = self
            .series_ttl_ms
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| default_series_ttl_ms(timeframe));
        Duration::from_millis(ms)
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::from_millis(self.quote_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_grows_with_granularity() {
        let policy = CacheTtlPolicy::default();
        let ttls: Vec<Duration> = Timeframe::ALL.iter().map(|tf| policy.series_ttl(*tf)).collect();
        assert!(ttls.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(policy.series_ttl(Timeframe::M1), Duration::from_secs(30));
        assert_eq!(policy.quote_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn test_override_one_timeframe() {
        let policy: CacheTtlPolicy =
            serde_json::from_str(r#"{ "series_ttl_ms": { "M15": 1000 } }"#).unwrap();
        assert_eq!(policy.series_ttl(Timeframe::M15), Duration::from_secs(1));
        // Omitted timeframes keep their defaults.
        assert_eq!(policy.series_ttl(Timeframe::D1), Duration::from_secs(6 * 3600));
        assert_eq!(policy.quote_ttl(), Duration::from_secs(5));
    }
}
