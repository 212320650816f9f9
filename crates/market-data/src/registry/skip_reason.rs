//! Skip reason tracking for provider selection diagnostics.

use std::fmt;

use serde::Serialize;

use super::rate_limiter::AllowanceReason;
use crate::models::ProviderId;

/// Why a provider was skipped during fetch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    /// No adapter is registered for this provider.
    NotRegistered,

    /// Provider has no credentials.
    Unconfigured,

    /// The local limiter, backoff, breaker or an admin switch refused the call.
    NotAllowed { reason: String },

    /// Provider has no interval code for this timeframe.
    TimeframeNotSupported,

    /// Provider cannot map this pair to a symbol.
    SymbolNotSupported,

    /// Provider doesn't serve live quotes.
    QuotesNotSupported,
}

impl From<AllowanceReason> for SkipReason {
    fn from(reason: AllowanceReason) -> Self {
        match reason {
            AllowanceReason::Unconfigured => Self::Unconfigured,
            other => Self::NotAllowed {
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered => f.write_str("not_registered"),
            Self::Unconfigured => f.write_str("unconfigured"),
            Self::NotAllowed { reason } => f.write_str(reason),
            Self::TimeframeNotSupported => f.write_str("timeframe_not_supported"),
            Self::SymbolNotSupported => f.write_str("symbol_not_supported"),
            Self::QuotesNotSupported => f.write_str("quotes_not_supported"),
        }
    }
}

/// Record of a single provider attempt during a fetch.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
    pub success: bool,
}

/// Per-provider attempt trail of one execution.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, error: String) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers attempted".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.provider_id, err)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn skip_reasons(&self) -> Vec<(ProviderId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (a.provider_id, s)))
            .collect()
    }

    pub fn errors(&self) -> Vec<(ProviderId, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (a.provider_id, e.as_str())))
            .collect()
    }
}
