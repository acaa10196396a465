use std::collections::HashMap;

use parking_lot::RwLock;

/// Bidirectional mapping between a venue's native symbol spelling and the
/// canonical `BASE-QUOTE-PERP` form used everywhere past the Ingestion Stage.
///
/// Round-trip invariant: `to_native(venue, to_canonical(venue, s)) == s` for
/// every symbol registered with `register`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    to_canonical: RwLock<HashMap<(String, String), String>>,
    to_native: RwLock<HashMap<(String, String), String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, venue: &str, native: &str, canonical: &str) {
        self.to_canonical
            .write()
            .insert((venue.to_string(), native.to_string()), canonical.to_string());
        self.to_native
            .write()
            .insert((venue.to_string(), canonical.to_string()), native.to_string());
    }

    pub fn to_canonical(&self, venue: &str, native: &str) -> Option<String> {
        self.to_canonical
            .read()
            .get(&(venue.to_string(), native.to_string()))
            .cloned()
    }

    pub fn to_native(&self, venue: &str, canonical: &str) -> Option<String> {
        self.to_native
            .read()
            .get(&(venue.to_string(), canonical.to_string()))
            .cloned()
    }
}

/// Builds the canonical `BASE-QUOTE-PERP` form from a base and quote asset.
pub fn canonicalize(base: &str, quote: &str) -> String {
    format!("{}-{}-PERP", base.to_uppercase(), quote.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_matches_convention() {
        assert_eq!(canonicalize("btc", "usd"), "BTC-USD-PERP");
    }

    #[test]
    fn round_trips_through_registration() {
        let table = SymbolTable::new();
        table.register("binance", "BTCUSDT", "BTC-USD-PERP");

        let canonical = table.to_canonical("binance", "BTCUSDT").unwrap();
        assert_eq!(canonical, "BTC-USD-PERP");

        let native = table.to_native("binance", &canonical).unwrap();
        assert_eq!(native, "BTCUSDT");
    }

    #[test]
    fn unregistered_pair_is_none() {
        let table = SymbolTable::new();
        assert!(table.to_canonical("binance", "ETHUSDT").is_none());
    }
}
