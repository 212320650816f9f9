//! Finnhub market data provider implementation.
//!
//! This module provides FX data from the Finnhub API:
//! - Bars via /forex/candle
//! - Live prices via /quote
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{Bar, Pair, ProviderId, Quote};
use crate::provider::{BarRequest, MarketDataProvider, ProviderCapabilities, QuoteRequest};
use crate::resolver::ProviderInstrument;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: ProviderId = ProviderId::Finnhub;

/// Look-back multiplier over `bar_count * interval`, covering weekends and
/// market closures.
const LOOKBACK_FACTOR: i64 = 3;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from /forex/candle endpoint
#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// Status: "ok" or "no_data"
    s: String,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
    /// Timestamps (Unix seconds)
    #[serde(default)]
    t: Vec<i64>,
}

/// Error response from Finnhub
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
pub struct FinnhubProvider {
    client: Client,
    api_key: Option<String>,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider. `None` or an empty key leaves the
    /// provider unconfigured.
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

    /// Make a GET request to the Finnhub API.
    async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String, MarketDataError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: "Missing API key".to_string(),
        })?;

        let url = format!("{}{}", BASE_URL, endpoint);

        // API key goes in a header so it never appears in a logged URL
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", api_key)
            .query(params)
            .timeout(timeout);

        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout {
                    provider: PROVIDER_ID,
                }
            } else {
                MarketDataError::ProviderError {
                    provider: PROVIDER_ID,
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);

        if let Some(error) = classify_status(status, retry_after) {
            return Err(error);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(error_msg) = error_resp.error {
                    return Err(MarketDataError::ProviderError {
                        provider: PROVIDER_ID,
                        message: error_msg,
                    });
                }
            }

            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID,
                message: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Failed to read response: {}", e),
        })
    }

    /// Extract the symbol string from a ProviderInstrument.
    fn extract_symbol(instrument: &ProviderInstrument) -> String {
        match instrument {
            ProviderInstrument::FxSymbol { symbol } => symbol.clone(),
            // Finnhub uses OANDA:EUR_USD format for forex
            ProviderInstrument::FxPair { from, to } => format!("OANDA:{}_{}", from, to),
        }
    }
}

/// Rate-limit and auth statuses. 403 is Finnhub's quota-exceeded answer.
fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<MarketDataError> {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => Some(MarketDataError::RateLimited {
            provider: PROVIDER_ID,
            retry_after,
        }),
        StatusCode::UNAUTHORIZED => Some(MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: "Invalid or missing API key".to_string(),
        }),
        _ => None,
    }
}

/// `Retry-After` in delta-seconds form.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_candles(text: &str, symbol: &str) -> Result<Vec<Bar>, MarketDataError> {
    let response: CandleResponse =
        serde_json::from_str(text).map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Failed to parse candle response: {}", e),
        })?;

    if response.s == "no_data" {
        return Err(MarketDataError::NoData {
            provider: PROVIDER_ID,
        });
    }

    if response.s != "ok" {
        return Err(MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Unexpected candle status: {}", response.s),
        });
    }

    let len = response.t.len();
    if response.c.len() != len
        || response.o.len() != len
        || response.h.len() != len
        || response.l.len() != len
    {
        return Err(MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: "Mismatched array lengths in candle response".to_string(),
        });
    }

    if len == 0 {
        return Err(MarketDataError::NoData {
            provider: PROVIDER_ID,
        });
    }

    let bars: Vec<Bar> = (0..len)
        .map(|i| Bar {
            time: response.t[i] * 1000,
            open: response.o[i],
            high: response.h[i],
            low: response.l[i],
            close: response.c[i],
            volume: response.v.get(i).copied().unwrap_or(0.0),
            provider: PROVIDER_ID.to_string(),
        })
        .collect();

    debug!("Finnhub: parsed {} candles for {}", bars.len(), symbol);

    Ok(bars)
}

fn parse_quote(text: &str, pair: &Pair, symbol: &str) -> Result<Quote, MarketDataError> {
    let response: QuoteResponse =
        serde_json::from_str(text).map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("Failed to parse quote response: {}", e),
        })?;

    // Finnhub returns 0 for unknown symbols instead of an error
    let price = response.c.filter(|c| *c != 0.0 || response.o.unwrap_or(0.0) != 0.0);
    if price.is_none() {
        warn!("Finnhub: no quote data for {}", symbol);
        return Err(MarketDataError::NoData {
            provider: PROVIDER_ID,
        });
    }

    let timestamp = response
        .t
        .map(|ts| ts * 1000)
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    Quote::from_prices(pair, None, None, price, timestamp, PROVIDER_ID.as_str()).ok_or(
        MarketDataError::NoData {
            provider: PROVIDER_ID,
        },
    )
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
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
        let symbol = Self::extract_symbol(&request.instrument);

        let to = Utc::now().timestamp();
        let bars = i64::try_from(request.bar_count.max(1)).unwrap_or(i64::MAX);
        let span = (request.timeframe.seconds() as i64).saturating_mul(bars);
        let from = to.saturating_sub(span.saturating_mul(LOOKBACK_FACTOR)).max(0);
        let (from, to) = (from.to_string(), to.to_string());

        let params = [
            ("symbol", symbol.as_str()),
            ("resolution", request.interval),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ];

        let text = self.fetch("/forex/candle", &params, request.timeout).await?;
        parse_candles(&text, &symbol)
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError> {
        let symbol = Self::extract_symbol(&request.instrument);
        let params = [("symbol", symbol.as_str())];
        let text = self.fetch("/quote", &params, request.timeout).await?;
        parse_quote(&text, &request.pair, &symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_and_configuration() {
        assert_eq!(FinnhubProvider::new(None).id(), ProviderId::Finnhub);
        assert!(!FinnhubProvider::new(None).is_configured());
        assert!(!FinnhubProvider::new(Some("  ".to_string())).is_configured());
        assert!(FinnhubProvider::new(Some("key".to_string())).is_configured());
    }

    #[test]
    fn test_extract_symbol() {
        let pair = ProviderInstrument::FxPair {
            from: "EUR".to_string(),
            to: "USD".to_string(),
        };
        assert_eq!(FinnhubProvider::extract_symbol(&pair), "OANDA:EUR_USD");

        let symbol = ProviderInstrument::FxSymbol {
            symbol: "OANDA:GBP_JPY".to_string(),
        };
        assert_eq!(FinnhubProvider::extract_symbol(&symbol), "OANDA:GBP_JPY");
    }

    #[test]
    fn test_rate_limit_statuses() {
        let retry = Some(Duration::from_secs(30));
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, retry),
            Some(MarketDataError::RateLimited {
                provider: ProviderId::Finnhub,
                retry_after: retry
            })
        );
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None),
            Some(MarketDataError::RateLimited { retry_after: None, .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None),
            Some(MarketDataError::ProviderError { .. })
        ));
        assert_eq!(classify_status(StatusCode::OK, None), None);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_parse_candles() {
        let json = r#"{
            "s": "ok",
            "t": [1700000000, 1700000900],
            "o": [1.0, 1.1], "h": [1.2, 1.3], "l": [0.9, 1.0], "c": [1.1, 1.2],
            "v": [100, 200]
        }"#;
        let bars = parse_candles(json, "OANDA:EUR_USD").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 1_700_000_000_000);
        assert_eq!(bars[1].volume, 200.0);
        assert_eq!(bars[0].provider, "FINNHUB");
    }

    #[test]
    fn test_parse_candles_no_data() {
        assert!(matches!(
            parse_candles(r#"{"s":"no_data"}"#, "X"),
            Err(MarketDataError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_candles_mismatched_arrays() {
        let json = r#"{"s":"ok","t":[1,2],"o":[1],"h":[1,1],"l":[1,1],"c":[1,1]}"#;
        assert!(matches!(
            parse_candles(json, "X"),
            Err(MarketDataError::ProviderError { .. })
        ));
    }

    #[test]
    fn test_parse_quote() {
        let pair = Pair::parse("EURUSD").unwrap();
        let quote = parse_quote(r#"{"c":1.0850,"o":1.08,"t":1700000000}"#, &pair, "X").unwrap();
        assert_eq!(quote.mid, 1.0850);
        assert_eq!(quote.timestamp, 1_700_000_000_000);
        assert!(quote.bid.is_none());

        assert!(matches!(
            parse_quote(r#"{"c":0,"o":0,"t":0}"#, &pair, "X"),
            Err(MarketDataError::NoData { .. })
        ));
    }
}
