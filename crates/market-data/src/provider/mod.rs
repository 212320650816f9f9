//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities
//! - Concrete provider implementations (Finnhub, Alpha Vantage)
//!
//! # Provider Resolution
//!
//! Providers receive pre-resolved `ProviderInstrument` parameters and
//! interval codes. The resolution from canonical pairs and timeframes
//! happens in the resolver module, not in the providers themselves.

mod capabilities;
mod request;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;

pub use capabilities::ProviderCapabilities;
pub use request::{BarRequest, QuoteRequest};
pub use traits::MarketDataProvider;
