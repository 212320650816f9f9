use std::path::{Path, PathBuf};

use anyhow::Context;
use tradefeed_market_data::{MarketDataConfig, ProviderId};

/// Process configuration, read once at startup.
pub struct Config {
    pub market_data: MarketDataConfig,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let market_data = match std::env::var("TRADEFEED_CONFIG").ok().map(PathBuf::from) {
            Some(path) => load_file(&path)?,
            None => MarketDataConfig::default(),
        };

        let allow_synthetic = std::env::var("TRADEFEED_ALLOW_SYNTHETIC").ok();
        let disabled = std::env::var("TRADEFEED_DISABLED_PROVIDERS").unwrap_or_default();

        Ok(Self {
            market_data: apply_overrides(market_data, allow_synthetic.as_deref(), &disabled)?,
            finnhub_api_key: non_empty(std::env::var("TRADEFEED_FINNHUB_API_KEY").ok()),
            alpha_vantage_api_key: non_empty(
                std::env::var("TRADEFEED_ALPHA_VANTAGE_API_KEY").ok(),
            ),
        })
    }
}

/// Read a JSON config file. Missing fields keep their defaults.
fn load_file(path: &Path) -> anyhow::Result<MarketDataConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

fn apply_overrides(
    mut config: MarketDataConfig,
    allow_synthetic: Option<&str>,
    disabled_providers: &str,
) -> anyhow::Result<MarketDataConfig> {
    if let Some(flag) = allow_synthetic {
        config.synthetic.allow_by_default = parse_flag(flag)
            .with_context(|| format!("Invalid TRADEFEED_ALLOW_SYNTHETIC: {}", flag))?;
    }

    for name in disabled_providers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let id: ProviderId = name
            .parse()
            .with_context(|| format!("Invalid TRADEFEED_DISABLED_PROVIDERS entry: {}", name))?;
        let mut settings = config.provider(id);
        settings.enabled = false;
        config = config.with_provider(id, settings);
    }

    Ok(config)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
