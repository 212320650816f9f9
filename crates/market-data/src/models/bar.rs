use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Source tag for generated fallback bars.
pub const SYNTHETIC_SOURCE: &str = "synthetic";

/// Source tag for cross-rate bars derived from two USD legs.
pub const DERIVED_SOURCE: &str = "derived";

/// One OHLCV sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time, epoch milliseconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Provider that produced the bar (FINNHUB, synthetic, derived, ...).
    pub provider: String,
}

impl Bar {
    pub fn is_finite(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// Uniform post-processing applied to every series regardless of source.
///
/// Drops bars with a non-finite OHLC field, keeps the first occurrence of
/// each timestamp, sorts ascending by time and keeps the most recent
/// `bar_count` bars.
pub fn normalize_series(bars: Vec<Bar>, bar_count: usize) -> Vec<Bar> {
    let mut seen = HashSet::with_capacity(bars.len());
    let mut series: Vec<Bar> = bars
        .into_iter()
        .filter(Bar::is_finite)
        .filter(|bar| seen.insert(bar.time))
        .map(|mut bar| {
            if !bar.volume.is_finite() {
                bar.volume = 0.0;
            }
            bar
        })
        .collect();

    series.sort_by_key(|bar| bar.time);

    if series.len() > bar_count {
        series.drain(..series.len() - bar_count);
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            provider: "TEST".to_string(),
        }
    }

    #[test]
    fn test_drops_non_finite_bars() {
        let mut bad = bar(2, 1.0);
        bad.high = f64::NAN;
        let series = normalize_series(vec![bar(1, 1.0), bad, bar(3, f64::INFINITY)], 10);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].time, 1);
    }

    #[test]
    fn test_first_duplicate_wins() {
        let series = normalize_series(vec![bar(5, 1.0), bar(5, 2.0), bar(4, 3.0)], 10);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time, 4);
        assert_eq!(series[1].close, 1.0);
    }

    #[test]
    fn test_keeps_most_recent() {
        let series = normalize_series((0..10).rev().map(|t| bar(t, t as f64)).collect(), 3);
        let times: Vec<i64> = series.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![7, 8, 9]);
    }

    #[test]
    fn test_non_finite_volume_is_zeroed() {
        let mut b = bar(1, 1.0);
        b.volume = f64::NAN;
        let series = normalize_series(vec![b], 1);
        assert_eq!(series[0].volume, 0.0);
    }
}
