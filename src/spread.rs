use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{Quote, Spread};

/// Pure function over an unordered set of venue quotes for a single symbol:
/// considers every pair in both directions and emits a `Spread` for each
/// positive result. `spread_pct = (sell - buy) / buy * 100`.
pub fn calculate_spreads(symbol: &str, quotes: &[Quote], now: DateTime<Utc>) -> Vec<Spread> {
    let mut spreads = Vec::new();

    for i in 0..quotes.len() {
        for j in 0..quotes.len() {
            if i == j {
                continue;
            }
            let buy = &quotes[i];
            let sell = &quotes[j];

            // Buy at the ask on `buy`'s venue, sell at the bid on `sell`'s venue.
            let price_buy = buy.ask;
            let price_sell = sell.bid;
            if price_sell <= price_buy {
                continue;
            }

            let spread_abs = price_sell - price_buy;
            let spread_pct = spread_abs / price_buy * Decimal::ONE_HUNDRED;
            if spread_pct <= Decimal::ZERO {
                continue;
            }

            spreads.push(Spread {
                symbol: symbol.to_string(),
                venue_buy: buy.venue.clone(),
                venue_sell: sell.venue.clone(),
                price_buy,
                price_sell,
                size_buy: buy.ask_size,
                size_sell: sell.bid_size,
                spread_abs,
                spread_pct,
                timestamp: now,
            });
        }
    }

    spreads
}

/// Highest `spread_pct` among `spreads`, or `0` when empty so the display
/// always has a value to render for every symbol it tracks.
pub fn best_spread_pct(spreads: &[Spread]) -> Decimal {
    spreads
        .iter()
        .map(|s| s.spread_pct)
        .max()
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn quote(venue: &str, bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            venue: venue.to_string(),
            symbol: "BTC-USD-PERP".to_string(),
            bid,
            ask,
            bid_size: dec!(1),
            ask_size: dec!(1),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn basic_spread_calculation() {
        let now = Utc::now();
        let quotes = vec![
            quote("binance", dec!(100.0), dec!(100.1)),
            quote("lighter", dec!(100.15), dec!(100.2)),
        ];
        let spreads = calculate_spreads("BTC-USD-PERP", &quotes, now);

        // Buy on binance at 100.1, sell on lighter at 100.15.
        let winning = spreads
            .iter()
            .find(|s| s.venue_buy == "binance" && s.venue_sell == "lighter")
            .expect("expected a positive spread");
        let expected_pct = (dec!(100.15) - dec!(100.1)) / dec!(100.1) * dec!(100);
        assert_eq!(winning.spread_pct, expected_pct);
    }

    #[test]
    fn only_positive_spreads_are_emitted() {
        let now = Utc::now();
        let quotes = vec![
            quote("binance", dec!(100.0), dec!(100.1)),
            quote("lighter", dec!(99.9), dec!(100.0)),
        ];
        let spreads = calculate_spreads("BTC-USD-PERP", &quotes, now);
        assert!(spreads.iter().all(|s| s.spread_pct > Decimal::ZERO));
        assert!(spreads
            .iter()
            .find(|s| s.venue_buy == "lighter" && s.venue_sell == "binance")
            .is_none());
    }

    #[test]
    fn no_venues_produces_no_spreads() {
        let spreads = calculate_spreads("BTC-USD-PERP", &[], Utc::now());
        assert!(spreads.is_empty());
    }

    #[test]
    fn best_spread_pct_defaults_to_zero() {
        assert_eq!(best_spread_pct(&[]), Decimal::ZERO);
    }
}
