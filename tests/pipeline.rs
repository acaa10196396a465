use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;

use perp_arb_monitor::adapter::{UpdatePayload, VenueUpdate};
use perp_arb_monitor::ingestion::IngestionStage;
use perp_arb_monitor::opportunity::OpportunityFinder;
use perp_arb_monitor::processing::ProcessingStage;
use perp_arb_monitor::spread::calculate_spreads;
use perp_arb_monitor::state::StateStore;
use perp_arb_monitor::symbol::SymbolTable;
use perp_arb_monitor::types::Quote;

fn quote(venue: &str, bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> Quote {
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
fn ingestion_through_opportunity_finding_end_to_end() {
    let ingestion = IngestionStage::new(
        100,
        100,
        Arc::new(SymbolTable::new()),
        vec!["BTC-USD-PERP".to_string()],
    );
    let state = Arc::new(StateStore::new(30));
    let processing = ProcessingStage::new(ingestion.orderbook_queue(), ingestion.ticker_queue(), state.clone());

    ingestion.handle_update(
        "binance",
        VenueUpdate::Keyed {
            symbol: "BTC-USD-PERP".to_string(),
            payload: UpdatePayload::Quote(quote("binance", dec!(100.0), dec!(100.1))),
        },
    );
    ingestion.handle_update(
        "lighter",
        VenueUpdate::Keyed {
            symbol: "BTC-USD-PERP".to_string(),
            payload: UpdatePayload::Quote(quote("lighter", dec!(100.3), dec!(100.4))),
        },
    );

    processing.drain_once();

    let now = Utc::now();
    let quotes: Vec<_> = state.quotes_for_symbol("BTC-USD-PERP", now).into_values().collect();
    assert_eq!(quotes.len(), 2);

    let spreads = calculate_spreads("BTC-USD-PERP", &quotes, now);
    assert!(!spreads.is_empty());

    let finder = OpportunityFinder::new(dec!(0.0));
    finder.update(&spreads, &HashMap::new(), now);
    assert!(!finder.active().is_empty());

    // Quotes converge: the opportunity should disappear on the next tick.
    let tight_quotes = vec![quote("binance", dec!(100.2), dec!(100.21))];
    let tight_spreads = calculate_spreads("BTC-USD-PERP", &tight_quotes, now);
    finder.update(&tight_spreads, &HashMap::new(), now);
    assert!(finder.active().is_empty());
}
