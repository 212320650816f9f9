//! Bar and quote validation.
//!
//! Runs after normalization, before a provider result is accepted:
//! - OHLC invariants (high >= low, open/close between high/low)
//! - Non-negative prices and volume
//! - Bid not above ask
//!
//! Hard failures reject the bar (or the quote); the provider attempt is then
//! recorded as a failure if nothing usable remains.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::{Bar, Quote};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Reject the bar or quote.
    Hard,
    /// Accept but log a warning.
    Soft,
}

#[derive(Clone, Debug)]
struct ValidationIssue {
    severity: ValidationSeverity,
    message: String,
}

impl ValidationIssue {
    fn hard(message: String) -> Self {
        Self {
            severity: ValidationSeverity::Hard,
            message,
        }
    }

    fn soft(message: String) -> Self {
        Self {
            severity: ValidationSeverity::Soft,
            message,
        }
    }
}

/// Validator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub reject_negative_prices: bool,
    pub reject_invalid_ohlc: bool,
    /// Prices above this are rejected as garbage.
    pub max_price: Option<f64>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_negative_prices: true,
            reject_invalid_ohlc: true,
            max_price: Some(1_000_000_000.0),
        }
    }
}

/// Market data validator.
#[derive(Clone, Debug, Default)]
pub struct DataValidator {
    config: ValidatorConfig,
}

impl DataValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    fn bar_issues(&self, bar: &Bar) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.config.reject_negative_prices
            && [bar.open, bar.high, bar.low, bar.close].iter().any(|p| *p <= 0.0)
        {
            issues.push(ValidationIssue::hard(format!(
                "Non-positive price in bar at {}",
                bar.time
            )));
        }

        if self.config.reject_invalid_ohlc {
            if bar.high < bar.low {
                issues.push(ValidationIssue::hard(format!(
                    "High ({}) is less than Low ({}) at {}",
                    bar.high, bar.low, bar.time
                )));
            } else if bar.open < bar.low
                || bar.open > bar.high
                || bar.close < bar.low
                || bar.close > bar.high
            {
                issues.push(ValidationIssue::soft(format!(
                    "Open/Close outside High/Low range at {}",
                    bar.time
                )));
            }
        }

        if let Some(max) = self.config.max_price {
            if bar.high > max {
                issues.push(ValidationIssue::hard(format!(
                    "High price ({}) exceeds sanity limit ({})",
                    bar.high, max
                )));
            }
        }

        if bar.volume < 0.0 {
            issues.push(ValidationIssue::soft(format!("Negative volume at {}", bar.time)));
        }

        issues
    }

    /// Drop bars with hard failures. Errors when none survive.
    pub fn validate_series(&self, bars: Vec<Bar>) -> Result<Vec<Bar>, MarketDataError> {
        let total = bars.len();
        let mut rejected = 0usize;
        let mut last_error = None;

        let valid: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| {
                let issues = self.bar_issues(bar);
                let hard = issues.iter().find(|i| i.severity == ValidationSeverity::Hard);
                match hard {
                    Some(issue) => {
                        rejected += 1;
                        last_error = Some(issue.message.clone());
                        false
                    }
                    None => true,
                }
            })
            .collect();

        if rejected > 0 {
            warn!("Series validation rejected {} of {} bars", rejected, total);
        }

        if valid.is_empty() && total > 0 {
            return Err(MarketDataError::ValidationFailed {
                message: last_error.unwrap_or_else(|| "all bars rejected".to_string()),
            });
        }

        Ok(valid)
    }

    /// Validate a quote.
    pub fn validate_quote(&self, quote: &Quote) -> Result<(), MarketDataError> {
        let mut issues = Vec::new();

        if !quote.mid.is_finite() {
            issues.push(ValidationIssue::hard("Non-finite mid price".to_string()));
        }

        if self.config.reject_negative_prices && quote.mid <= 0.0 {
            issues.push(ValidationIssue::hard(format!("Non-positive mid price: {}", quote.mid)));
        }

        if let (Some(bid), Some(ask)) = (quote.bid, quote.ask) {
            if bid > ask {
                issues.push(ValidationIssue::hard(format!(
                    "Bid ({}) is above Ask ({})",
                    bid, ask
                )));
            }
        }

        if let Some(max) = self.config.max_price {
            if quote.mid > max {
                issues.push(ValidationIssue::hard(format!(
                    "Price {} exceeds sanity limit {}",
                    quote.mid, max
                )));
            }
        }

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::ValidationFailed {
                message: errors.join("; "),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            time,
            open,
            high,
            low,
            close,
            volume: 10.0,
            provider: "TEST".to_string(),
        }
    }

    fn quote(bid: Option<f64>, ask: Option<f64>, mid: f64) -> Quote {
        Quote {
            bid,
            ask,
            mid,
            spread_pips: None,
            timestamp: 0,
            provider: "TEST".to_string(),
        }
    }

    #[test]
    fn test_valid_series_passes_through() {
        let validator = DataValidator::new();
        let bars = vec![bar(1, 1.0, 1.2, 0.9, 1.1), bar(2, 1.1, 1.3, 1.0, 1.2)];
        assert_eq!(validator.validate_series(bars.clone()).unwrap(), bars);
    }

    #[test]
    fn test_invalid_bars_are_dropped() {
        let validator = DataValidator::new();
        let bars = vec![
            bar(1, 1.0, 0.8, 0.9, 1.0),
            bar(2, -1.0, 1.0, -2.0, 0.5),
            bar(3, 1.0, 1.2, 0.9, 1.1),
        ];
        let valid = validator.validate_series(bars).unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].time, 3);
    }

    #[test]
    fn test_all_invalid_is_an_error() {
        let validator = DataValidator::new();
        let result = validator.validate_series(vec![bar(1, 1.0, 0.8, 0.9, 1.0)]);
        assert!(matches!(result, Err(MarketDataError::ValidationFailed { .. })));
    }

    #[test]
    fn test_soft_issue_keeps_bar() {
        let validator = DataValidator::new();
        let valid = validator.validate_series(vec![bar(1, 2.0, 1.2, 0.9, 1.1)]).unwrap();
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn test_relaxed_config() {
        let validator = DataValidator::with_config(ValidatorConfig {
            reject_invalid_ohlc: false,
            ..ValidatorConfig::default()
        });
        assert!(validator.validate_series(vec![bar(1, 1.0, 0.8, 0.9, 1.0)]).is_ok());
    }

    #[test]
    fn test_quote_bid_above_ask_rejected() {
        let validator = DataValidator::new();
        assert!(validator.validate_quote(&quote(Some(1.2), Some(1.1), 1.15)).is_err());
        assert!(validator.validate_quote(&quote(Some(1.1), Some(1.1), 1.1)).is_ok());
        assert!(validator.validate_quote(&quote(None, None, 1.1)).is_ok());
    }

    #[test]
    fn test_quote_non_finite_rejected() {
        let validator = DataValidator::new();
        assert!(validator.validate_quote(&quote(None, None, f64::NAN)).is_err());
        assert!(validator.validate_quote(&quote(None, None, 0.0)).is_err());
    }
}
