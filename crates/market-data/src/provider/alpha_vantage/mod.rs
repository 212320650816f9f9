//! Alpha Vantage market data provider implementation.
//!
//! This module provides FX data from the Alpha Vantage API:
//! - Intraday bars via FX_INTRADAY
//! - Daily and weekly bars via FX_DAILY / FX_WEEKLY
//! - Live bid/ask via CURRENCY_EXCHANGE_RATE
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute. When
//! the limit is hit it answers HTTP 200 with a `Note` or `Information` body.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{Bar, Pair, ProviderId, Quote, Timeframe};
use crate::provider::{BarRequest, MarketDataProvider, ProviderCapabilities, QuoteRequest};
use crate::resolver::ProviderInstrument;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: ProviderId = ProviderId::AlphaVantage;

/// Retry-after applied to a frequency-limit body.
const RATE_LIMIT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// `compact` output holds the latest 100 points.
const COMPACT_OUTPUT_SIZE: usize = 100;

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// FX_INTRADAY / FX_DAILY / FX_WEEKLY response. The series key depends on
/// the function ("Time Series FX (15min)", "Time Series FX (Daily)", ...).
#[derive(Debug, Deserialize)]
struct FxSeriesResponse {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(flatten)]
    sections: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FxBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
}

/// CURRENCY_EXCHANGE_RATE response
#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<ExchangeRate>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRate {
    #[serde(rename = "5. Exchange Rate")]
    exchange_rate: Option<String>,
    #[serde(rename = "6. Last Refreshed")]
    last_refreshed: Option<String>,
    #[serde(rename = "8. Bid Price")]
    bid: Option<String>,
    #[serde(rename = "9. Ask Price")]
    ask: Option<String>,
}

// ============================================================================
// AlphaVantageProvider
// ============================================================================

/// Alpha Vantage market data provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: Option<String>,
}

impl AlphaVantageProvider {
    /// Create a new provider. `None` or an empty key leaves it unconfigured.
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, params: &[(&str, &str)], timeout: Duration) -> Result<String, MarketDataError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: "Missing API key".to_string(),
        })?;

        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            MarketDataError::ProviderError {
                provider: PROVIDER_ID,
                message: format!("Failed to build URL: {}", e),
            }
        })?;

        debug!("Alpha Vantage request: {}", url.as_str().replace(api_key, "***"));

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketDataError::Timeout {
                        provider: PROVIDER_ID,
                    }
                } else {
                    MarketDataError::ProviderError {
                        provider: PROVIDER_ID,
                        message: e.without_url().to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID,
                retry_after: Some(RATE_LIMIT_RETRY_AFTER),
            });
        }

        if !status.is_success() {
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID,
                message: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: e.without_url().to_string(),
        })
    }

    fn extract_pair(instrument: &ProviderInstrument) -> Result<(String, String), MarketDataError> {
        match instrument {
            ProviderInstrument::FxPair { from, to } => Ok((from.clone(), to.clone())),
            ProviderInstrument::FxSymbol { symbol } => {
                let letters: String = symbol.chars().filter(|c| c.is_ascii_alphabetic()).collect();
                if letters.len() == 6 {
                    Ok((letters[..3].to_string(), letters[3..].to_string()))
                } else {
                    Err(MarketDataError::ProviderError {
                        provider: PROVIDER_ID,
                        message: format!("Cannot split FX symbol: {}", symbol),
                    })
                }
            }
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("call frequency") || lower.contains("rate limit")
}

/// Check for API-level errors in the response.
fn check_api_error(
    error_message: &Option<String>,
    note: &Option<String>,
    information: &Option<String>,
) -> Result<(), MarketDataError> {
    if let Some(ref msg) = error_message {
        return Err(MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: msg.clone(),
        });
    }

    for msg in [note, information].into_iter().flatten() {
        if mentions_rate_limit(msg) {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID,
                retry_after: Some(RATE_LIMIT_RETRY_AFTER),
            });
        }
        warn!("Alpha Vantage notice: {}", msg);
    }

    Ok(())
}

fn series_function(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::D1 => "FX_DAILY",
        Timeframe::W1 => "FX_WEEKLY",
        _ => "FX_INTRADAY",
    }
}

/// Parse "YYYY-MM-DD HH:MM:SS" or "YYYY-MM-DD" (UTC) to epoch ms.
fn parse_timestamp(value: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn parse_price(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_series(text: &str) -> Result<Vec<Bar>, MarketDataError> {
    let response: FxSeriesResponse =
        serde_json::from_str(text).map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Failed to parse response: {}", e),
        })?;

    check_api_error(&response.error_message, &response.note, &response.information)?;

    let series = response
        .sections
        .into_iter()
        .find(|(key, _)| key.starts_with("Time Series FX"))
        .map(|(_, value)| value)
        .ok_or(MarketDataError::NoData {
            provider: PROVIDER_ID,
        })?;

    let series: HashMap<String, FxBar> =
        serde_json::from_value(series).map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Failed to parse time series: {}", e),
        })?;

    let bars: Vec<Bar> = series
        .into_iter()
        .filter_map(|(time, bar)| {
            Some(Bar {
                time: parse_timestamp(&time)?,
                open: parse_price(&bar.open)?,
                high: parse_price(&bar.high)?,
                low: parse_price(&bar.low)?,
                close: parse_price(&bar.close)?,
                // FX doesn't have volume
                volume: 0.0,
                provider: PROVIDER_ID.to_string(),
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(MarketDataError::NoData {
            provider: PROVIDER_ID,
        });
    }

    Ok(bars)
}

fn parse_exchange_rate(text: &str, pair: &Pair) -> Result<Quote, MarketDataError> {
    let response: ExchangeRateResponse =
        serde_json::from_str(text).map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Failed to parse response: {}", e),
        })?;

    check_api_error(&response.error_message, &response.note, &response.information)?;

    let rate = response.rate.ok_or(MarketDataError::NoData {
        provider: PROVIDER_ID,
    })?;

    let parse = |value: &Option<String>| value.as_deref().and_then(parse_price);
    let timestamp = rate
        .last_refreshed
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    Quote::from_prices(
        pair,
        parse(&rate.bid),
        parse(&rate.ask),
        parse(&rate.exchange_rate),
        timestamp,
        PROVIDER_ID.as_str(),
    )
    .ok_or(MarketDataError::NoData {
        provider: PROVIDER_ID,
    })
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> ProviderId {
        PROVIDER_ID
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_bars: true,
            supports_quotes: true,
        }
    }

    async fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, MarketDataError> {
        let (from, to) = Self::extract_pair(&request.instrument)?;
        let function = series_function(request.timeframe);
        let output_size = if request.bar_count <= COMPACT_OUTPUT_SIZE {
            "compact"
        } else {
            "full"
        };

        let mut params = vec![
            ("function", function),
            ("from_symbol", from.as_str()),
            ("to_symbol", to.as_str()),
            ("outputsize", output_size),
        ];
        if function == "FX_INTRADAY" {
            params.push(("interval", request.interval));
        }

        let text = self.fetch(&params, request.timeout).await?;
        let bars = parse_series(&text)?;

        debug!(
            "Alpha Vantage: fetched {} {} bars for {}/{}",
            bars.len(),
            request.timeframe,
            from,
            to
        );

        Ok(bars)
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError> {
        let (from, to) = Self::extract_pair(&request.instrument)?;
        let params = [
            ("function", "CURRENCY_EXCHANGE_RATE"),
            ("from_currency", from.as_str()),
            ("to_currency", to.as_str()),
        ];

        let text = self.fetch(&params, request.timeout).await?;
        parse_exchange_rate(&text, &request.pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("2024-01-15"), Some(1_705_276_800_000));
        assert_eq!(parse_timestamp("2024-01-15 00:15:00"), Some(1_705_277_700_000));
        assert!(parse_timestamp("01-15-2024").is_none());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(" 1.0850 "), Some(1.085));
        assert!(parse_price("invalid").is_none());
        assert!(parse_price("NaN").is_none());
    }

    #[test]
    fn test_provider_id_and_configuration() {
        let provider = AlphaVantageProvider::new(Some("test_key".to_string()));
        assert_eq!(provider.id(), ProviderId::AlphaVantage);
        assert!(provider.is_configured());
        assert!(!AlphaVantageProvider::new(None).is_configured());
    }

    #[test]
    fn test_series_function() {
        assert_eq!(series_function(Timeframe::M15), "FX_INTRADAY");
        assert_eq!(series_function(Timeframe::D1), "FX_DAILY");
        assert_eq!(series_function(Timeframe::W1), "FX_WEEKLY");
    }

    #[test]
    fn test_frequency_note_is_rate_limit() {
        let text = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        assert_eq!(
            parse_series(text),
            Err(MarketDataError::RateLimited {
                provider: ProviderId::AlphaVantage,
                retry_after: Some(Duration::from_secs(60)),
            })
        );

        let info = r#"{"Information": "We have detected your API key and our standard API rate limit is 25 requests per day."}"#;
        assert!(matches!(
            parse_exchange_rate(info, &Pair::parse("EURUSD").unwrap()),
            Err(MarketDataError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_error_message_is_provider_error() {
        let text = r#"{"Error Message": "Invalid API call."}"#;
        assert!(matches!(
            parse_series(text),
            Err(MarketDataError::ProviderError { .. })
        ));
    }

    #[test]
    fn test_parse_intraday_series() {
        let text = r#"{
            "Meta Data": { "1. Information": "FX Intraday (15min) Time Series" },
            "Time Series FX (15min)": {
                "2024-01-15 00:15:00": { "1. open": "1.0950", "2. high": "1.0960", "3. low": "1.0940", "4. close": "1.0955" },
                "2024-01-15 00:00:00": { "1. open": "1.0945", "2. high": "1.0952", "3. low": "1.0941", "4. close": "1.0950" },
                "garbage": { "1. open": "x", "2. high": "1", "3. low": "1", "4. close": "1" }
            }
        }"#;
        let mut bars = parse_series(text).unwrap();
        bars.sort_by_key(|b| b.time);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].time - bars[0].time, 900_000);
        assert_eq!(bars[1].close, 1.0955);
        assert_eq!(bars[0].provider, "ALPHA_VANTAGE");
    }

    #[test]
    fn test_missing_series_is_no_data() {
        assert!(matches!(
            parse_series(r#"{"Meta Data": {}}"#),
            Err(MarketDataError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_exchange_rate() {
        let text = r#"{
            "Realtime Currency Exchange Rate": {
                "5. Exchange Rate": "1.08500",
                "6. Last Refreshed": "2024-01-15 00:15:00",
                "8. Bid Price": "1.08490",
                "9. Ask Price": "1.08510"
            }
        }"#;
        let quote = parse_exchange_rate(text, &Pair::parse("EURUSD").unwrap()).unwrap();
        assert_eq!(quote.bid, Some(1.0849));
        assert_eq!(quote.ask, Some(1.0851));
        assert!((quote.mid - 1.085).abs() < 1e-9);
        assert!((quote.spread_pips.unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(quote.timestamp, 1_705_277_700_000);
    }

    #[test]
    fn test_extract_pair_from_symbol() {
        let instrument = ProviderInstrument::FxSymbol {
            symbol: "EUR/USD".to_string(),
        };
        assert_eq!(
            AlphaVantageProvider::extract_pair(&instrument).unwrap(),
            ("EUR".to_string(), "USD".to_string())
        );
    }
}
