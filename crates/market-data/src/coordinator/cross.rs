//! Cross-rate derivation from two USD legs.
//!
//! A cross `AAABBB` with no USD leg is priced as
//! `(USD per AAA) / (USD per BBB)`. Each leg is the market-convention USD
//! pair for its currency; legs quoted as `USDxxx` are inverted first, which
//! swaps high/low and bid/ask.

use std::collections::HashMap;

use crate::models::{Bar, Pair, Quote, DERIVED_SOURCE};

/// The two USD pairs needed to derive `pair`, or `None` if it isn't a cross.
pub(crate) fn legs(pair: &Pair) -> Option<(Pair, Pair)> {
    if !pair.is_cross() {
        return None;
    }
    let (base, quote) = pair.legs()?;
    Some((Pair::usd_leg(base).0, Pair::usd_leg(quote).0))
}

/// USD-per-unit OHLC for one leg bar.
fn usd_per_unit(bar: &Bar, usd_quoted: bool) -> (f64, f64, f64, f64) {
    if usd_quoted {
        (bar.open, bar.high, bar.low, bar.close)
    } else {
        (1.0 / bar.open, 1.0 / bar.low, 1.0 / bar.high, 1.0 / bar.close)
    }
}

/// Align two leg series by timestamp and derive the cross series.
pub(crate) fn derive_series(pair: &Pair, base_leg: &[Bar], quote_leg: &[Bar]) -> Vec<Bar> {
    let Some((base, quote)) = pair.legs() else {
        return Vec::new();
    };
    let base_usd_quoted = Pair::usd_leg(base).1;
    let quote_usd_quoted = Pair::usd_leg(quote).1;

    let quote_by_time: HashMap<i64, &Bar> = quote_leg.iter().map(|bar| (bar.time, bar)).collect();

    base_leg
        .iter()
        .filter_map(|a| {
            let b = quote_by_time.get(&a.time)?;
            let (ao, ah, al, ac) = usd_per_unit(a, base_usd_quoted);
            let (bo, bh, bl, bc) = usd_per_unit(b, quote_usd_quoted);

            let open = ao / bo;
            let close = ac / bc;
            let high = (ah / bl).max(open).max(close);
            let low = (al / bh).min(open).min(close);

            Some(Bar {
                time: a.time,
                open,
                high,
                low,
                close,
                volume: 0.0,
                provider: DERIVED_SOURCE.to_string(),
            })
        })
        .collect()
}

/// USD-per-unit (bid, ask, mid) for one leg quote.
fn quote_usd_per_unit(quote: &Quote, usd_quoted: bool) -> (Option<f64>, Option<f64>, f64) {
    if usd_quoted {
        (quote.bid, quote.ask, quote.mid)
    } else {
        (quote.ask.map(|a| 1.0 / a), quote.bid.map(|b| 1.0 / b), 1.0 / quote.mid)
    }
}

/// Derive a cross quote: `bid = bidA / askB`, `ask = askA / bidB`.
pub(crate) fn derive_quote(pair: &Pair, base_leg: &Quote, quote_leg: &Quote) -> Option<Quote> {
    let (base, quote) = pair.legs()?;
    let (a_bid, a_ask, a_mid) = quote_usd_per_unit(base_leg, Pair::usd_leg(base).1);
    let (b_bid, b_ask, b_mid) = quote_usd_per_unit(quote_leg, Pair::usd_leg(quote).1);

    let bid = a_bid.zip(b_ask).map(|(a, b)| a / b);
    let ask = a_ask.zip(b_bid).map(|(a, b)| a / b);

    Quote::from_prices(
        pair,
        bid,
        ask,
        Some(a_mid / b_mid),
        base_leg.timestamp.min(quote_leg.timestamp),
        DERIVED_SOURCE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(raw: &str) -> Pair {
        Pair::parse(raw).unwrap()
    }

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            time,
            open,
            high,
            low,
            close,
            volume: 1.0,
            provider: "TEST".to_string(),
        }
    }

    fn quote(bid: f64, ask: f64) -> Quote {
        Quote::from_prices(&pair("EURUSD"), Some(bid), Some(ask), None, 1_000, "TEST").unwrap()
    }

    #[test]
    fn test_legs() {
        assert_eq!(legs(&pair("EURJPY")), Some((pair("EURUSD"), pair("USDJPY"))));
        assert_eq!(legs(&pair("CADCHF")), Some((pair("USDCAD"), pair("USDCHF"))));
        assert_eq!(legs(&pair("EURUSD")), None);
    }

    #[test]
    fn test_derive_series_aligns_and_multiplies() {
        // EURJPY = EURUSD * USDJPY
        let eurusd = vec![bar(1, 1.10, 1.12, 1.08, 1.11), bar(2, 1.11, 1.11, 1.11, 1.11)];
        let usdjpy = vec![bar(1, 150.0, 151.0, 149.0, 150.5), bar(3, 150.0, 150.0, 150.0, 150.0)];

        let derived = derive_series(&pair("EURJPY"), &eurusd, &usdjpy);
        assert_eq!(derived.len(), 1);

        let b = &derived[0];
        assert_eq!(b.time, 1);
        assert!((b.open - 1.10 * 150.0).abs() < 1e-9);
        assert!((b.close - 1.11 * 150.5).abs() < 1e-9);
        assert!((b.high - 1.12 * 151.0).abs() < 1e-9);
        assert!((b.low - 1.08 * 149.0).abs() < 1e-9);
        assert_eq!(b.provider, DERIVED_SOURCE);
    }

    #[test]
    fn test_derive_series_both_legs_inverted() {
        // CADCHF = USDCHF / USDCAD
        let usdcad = vec![bar(1, 1.25, 1.25, 1.25, 1.25)];
        let usdchf = vec![bar(1, 0.90, 0.90, 0.90, 0.90)];
        let derived = derive_series(&pair("CADCHF"), &usdcad, &usdchf);
        assert!((derived[0].close - 0.90 / 1.25).abs() < 1e-12);
        assert!(derived[0].low <= derived[0].high);
    }

    #[test]
    fn test_derive_quote() {
        let eurusd = quote(1.0999, 1.1001);
        let usdjpy = Quote::from_prices(&pair("USDJPY"), Some(149.99), Some(150.01), None, 500, "TEST").unwrap();

        let derived = derive_quote(&pair("EURJPY"), &eurusd, &usdjpy).unwrap();
        let bid = derived.bid.unwrap();
        let ask = derived.ask.unwrap();
        assert!((bid - 1.0999 * 149.99).abs() < 1e-9);
        assert!((ask - 1.1001 * 150.01).abs() < 1e-9);
        assert!(bid <= ask);
        assert_eq!(derived.timestamp, 500);
        assert_eq!(derived.provider, DERIVED_SOURCE);
        assert!(derived.spread_pips.is_some());
    }
}
