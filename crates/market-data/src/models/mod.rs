//! Market data models
//!
//! This module contains the core data types shared by every component:
//! - `types` - The fixed `ProviderId` enumeration
//! - `timeframe` - Canonical bar intervals and their alias table
//! - `pair` - Canonical instrument pairs (EURUSD, XAUUSD, ...)
//! - `bar` - OHLCV bars and series normalization
//! - `quote` - Bid/ask quotes
//! - `request` - Caller options and request fingerprints

mod bar;
mod pair;
mod quote;
mod request;
mod timeframe;
mod types;

pub use bar::{normalize_series, Bar, DERIVED_SOURCE, SYNTHETIC_SOURCE};
pub use pair::Pair;
pub use quote::Quote;
pub use request::{FetchOptions, Fingerprint};
pub use timeframe::{Timeframe, TimeframeClass};
pub use types::ProviderId;
