mod config;

use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tradefeed_market_data::{
    AlphaVantageProvider, FetchOptions, FinnhubProvider, MarketDataCoordinator,
    MarketDataProvider, ProviderId, RulesResolver, Timeframe,
};

use config::Config;

#[derive(Parser)]
#[command(name = "tradefeed", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an OHLCV series
    Series {
        /// Pair, e.g. "EURUSD" or "EUR/USD"
        #[arg(long)]
        pair: String,

        /// Timeframe alias, e.g. "15m", "H1", "1d"
        #[arg(long, default_value = "M15")]
        timeframe: String,

        /// Number of bars
        #[arg(long, default_value = "100")]
        count: usize,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Fetch a live quote
    Quote {
        #[arg(long)]
        pair: String,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Print the provider health snapshot
    Health,

    /// Check whether any provider can serve a timeframe right now
    Viable {
        #[arg(long, default_value = "M15")]
        timeframe: String,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// Skip the cache lookup
    #[arg(long)]
    bypass_cache: bool,

    /// Caller purpose, checked against the synthetic policy
    #[arg(long)]
    purpose: Option<String>,

    /// Try this provider first
    #[arg(long)]
    provider: Option<String>,

    /// Per-call timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    force_synthetic: bool,

    #[arg(long)]
    disallow_synthetic: bool,

    #[arg(long)]
    no_cross: bool,
}

impl OptionArgs {
    fn into_options(self) -> anyhow::Result<FetchOptions> {
        let provider_preference = self
            .provider
            .as_deref()
            .map(ProviderId::from_str)
            .transpose()?;

        Ok(FetchOptions {
            bypass_cache: self.bypass_cache,
            purpose: self.purpose,
            provider_preference,
            disable_cross_derivation: self.no_cross,
            force_synthetic: self.force_synthetic,
            disallow_synthetic: self.disallow_synthetic,
            timeout_ms: self.timeout_ms,
            ..FetchOptions::default()
        })
    }
}

fn init_tracing() {
    let log_format = std::env::var("TRADEFEED_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays clean JSON.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn build_coordinator(config: Config) -> MarketDataCoordinator {
    let providers: Vec<Arc<dyn MarketDataProvider>> = vec![
        Arc::new(FinnhubProvider::new(config.finnhub_api_key)),
        Arc::new(AlphaVantageProvider::new(config.alpha_vantage_api_key)),
    ];

    MarketDataCoordinator::new(config.market_data, providers, Arc::new(RulesResolver::new()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing();

    let coordinator = build_coordinator(config);

    match cli.command {
        Commands::Series {
            pair,
            timeframe,
            count,
            options,
        } => {
            let bars = coordinator
                .fetch_series(&pair, &timeframe, count, &options.into_options()?)
                .await?;
            tracing::info!("Fetched {} bars for {} {}", bars.len(), pair, timeframe);
            print_json(&bars)?;
        }
        Commands::Quote { pair, options } => {
            let quote = coordinator
                .fetch_quote(&pair, &options.into_options()?)
                .await?;
            print_json(&quote)?;
        }
        Commands::Health => {
            print_json(&coordinator.health_status())?;
        }
        Commands::Viable { timeframe } => {
            let timeframe = Timeframe::from_str(&timeframe)?;
            print_json(&coordinator.is_data_fetch_viable(timeframe))?;
        }
    }

    Ok(())
}
