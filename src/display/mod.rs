pub mod scroller;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::types::{Opportunity, OccurrenceLogEntry};

pub use scroller::{Scroller, ScrollerLine};

type OpportunityKey = (String, String, String);

#[derive(Debug, Clone)]
struct DisplayEntry {
    opportunity: Opportunity,
    last_real_seen: DateTime<Utc>,
    hold_deadline: Option<DateTime<Utc>>,
    /// Start of the current continuous run for `duration()`, per §4.7(a):
    /// distinct from `last_real_seen`/`hold_deadline`, which drive the
    /// post-disappearance hold rather than the displayed duration.
    ui_duration_start: DateTime<Utc>,
    /// Last tick this entry was actually present in the live set, used only
    /// to detect whether the next sighting bridges the continuation
    /// tolerance or starts a fresh run.
    last_ui_seen: DateTime<Utc>,
}

/// Renders a stable view of opportunities on top of the Opportunity Finder's
/// immediate create/destroy semantics. Kept as state strictly separate from
/// `OpportunityFinder` (the original implementation blurred the two, which
/// produced flicker and double-counting bugs this crate avoids by never
/// sharing state between the two layers).
pub struct DisplayEngine {
    continuation_tolerance: Duration,
    post_disappearance_hold: Duration,
    occurrence_window: Duration,
    occurrence_dedup: Duration,

    entries: HashMap<OpportunityKey, DisplayEntry>,
    occurrence_log: Vec<OccurrenceLogEntry>,
    last_occurrence_recorded: HashMap<OpportunityKey, DateTime<Utc>>,
    debug_messages: VecDeque<String>,
}

const DEBUG_RING_CAPACITY: usize = 100;

impl DisplayEngine {
    pub fn new(
        continuation_tolerance_secs: u64,
        post_disappearance_hold_secs: u64,
        occurrence_window_secs: u64,
        occurrence_dedup_secs: u64,
    ) -> Self {
        Self {
            continuation_tolerance: Duration::seconds(continuation_tolerance_secs as i64),
            post_disappearance_hold: Duration::seconds(post_disappearance_hold_secs as i64),
            occurrence_window: Duration::seconds(occurrence_window_secs as i64),
            occurrence_dedup: Duration::seconds(occurrence_dedup_secs as i64),
            entries: HashMap::new(),
            occurrence_log: Vec::new(),
            last_occurrence_recorded: HashMap::new(),
            debug_messages: VecDeque::new(),
        }
    }

    /// Advances display state for one tick given the Opportunity Finder's
    /// current live set. Returns the set of keys newly added to the display
    /// this tick (for scroller emission).
    pub fn update(&mut self, live: &[Opportunity], now: DateTime<Utc>) -> Vec<OpportunityKey> {
        let live_keys: Vec<OpportunityKey> = live.iter().map(|o| o.key()).collect();
        let continuation_tolerance = self.continuation_tolerance;
        let mut newly_displayed = Vec::new();

        for opportunity in live {
            let key = opportunity.key();
            let is_new = !self.entries.contains_key(&key);

            // Symbol-level reset: reappearance of any opportunity for this
            // symbol clears holds on every tracked key for that symbol.
            for entry in self.entries.values_mut() {
                if entry.opportunity.symbol == opportunity.symbol {
                    entry.hold_deadline = None;
                }
            }

            self.entries
                .entry(key.clone())
                .and_modify(|entry| {
                    let gap = now - entry.last_ui_seen;
                    if gap > continuation_tolerance {
                        entry.ui_duration_start = now;
                    }
                    entry.last_ui_seen = now;
                    entry.opportunity = opportunity.clone();
                    entry.last_real_seen = now;
                    entry.hold_deadline = None;
                })
                .or_insert_with(|| DisplayEntry {
                    opportunity: opportunity.clone(),
                    last_real_seen: now,
                    hold_deadline: None,
                    ui_duration_start: now,
                    last_ui_seen: now,
                });

            if is_new {
                newly_displayed.push(key.clone());
            }
            self.record_occurrence(&key, opportunity, now);
        }

        let stale_keys: Vec<OpportunityKey> = self
            .entries
            .keys()
            .filter(|k| !live_keys.contains(k))
            .cloned()
            .collect();

        for key in stale_keys {
            let entry = self.entries.get_mut(&key).expect("key just listed");
            let gap = now - entry.last_real_seen;

            if gap <= self.continuation_tolerance {
                continue;
            }

            match entry.hold_deadline {
                None => entry.hold_deadline = Some(now + self.post_disappearance_hold),
                Some(deadline) if now >= deadline => {
                    self.entries.remove(&key);
                }
                Some(_) => {}
            }
        }

        self.prune_occurrence_log(now);
        newly_displayed
    }

    fn record_occurrence(&mut self, key: &OpportunityKey, opportunity: &Opportunity, now: DateTime<Utc>) {
        if let Some(&last) = self.last_occurrence_recorded.get(key) {
            if now - last < self.occurrence_dedup {
                return;
            }
        }
        self.last_occurrence_recorded.insert(key.clone(), now);
        self.occurrence_log.push(OccurrenceLogEntry {
            symbol: opportunity.symbol.clone(),
            venue_buy: opportunity.venue_buy.clone(),
            venue_sell: opportunity.venue_sell.clone(),
            at: now,
        });
    }

    fn prune_occurrence_log(&mut self, now: DateTime<Utc>) {
        let window = self.occurrence_window;
        self.occurrence_log.retain(|e| now - e.at <= window);
    }

    /// Count of occurrences for `symbol` within the rolling window, as of
    /// the last `update` call.
    pub fn occurrence_count(&self, symbol: &str) -> usize {
        self.occurrence_log.iter().filter(|e| e.symbol == symbol).count()
    }

    pub fn displayed(&self) -> Vec<Opportunity> {
        self.entries.values().map(|e| e.opportunity.clone()).collect()
    }

    pub fn is_displayed(&self, key: &OpportunityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Continuous duration this key has been displayed as of `now`, per
    /// §4.7(a): accumulates across gaps within the continuation tolerance,
    /// resets to zero on a gap beyond it, and is zero once the key is no
    /// longer displayed at all.
    pub fn duration(&self, key: &OpportunityKey, now: DateTime<Utc>) -> Duration {
        self.entries
            .get(key)
            .map(|entry| now - entry.ui_duration_start)
            .unwrap_or_else(Duration::zero)
    }

    pub fn add_debug_message(&mut self, message: impl Into<String>) {
        if self.debug_messages.len() == DEBUG_RING_CAPACITY {
            self.debug_messages.pop_front();
        }
        self.debug_messages.push_back(message.into());
    }

    pub fn debug_messages(&self) -> impl Iterator<Item = &String> {
        self.debug_messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn opp(symbol: &str, at: DateTime<Utc>) -> Opportunity {
        Opportunity {
            symbol: symbol.to_string(),
            venue_buy: "binance".to_string(),
            venue_sell: "lighter".to_string(),
            price_buy: dec!(100),
            price_sell: dec!(100.1),
            size_buy: dec!(1),
            size_sell: dec!(1),
            spread_abs: dec!(0.1),
            spread_pct: dec!(0.1),
            funding_rate_buy: None,
            funding_rate_sell: None,
            first_seen: at,
            last_seen: at,
            duration_seconds: 0,
            funding_rate_diff_8h: None,
        }
    }

    #[test]
    fn duration_accumulates_across_small_gaps() {
        let mut engine = DisplayEngine::new(2, 5, 900, 1);
        let t0 = Utc::now();
        engine.update(&[opp("BTC-USD-PERP", t0)], t0);
        assert!(engine.is_displayed(&opp("BTC-USD-PERP", t0).key()));

        // 1s gap with no live opportunity: within continuation tolerance.
        let t1 = t0 + Duration::seconds(1);
        engine.update(&[], t1);
        assert!(engine.is_displayed(&opp("BTC-USD-PERP", t0).key()));
    }

    #[test]
    fn post_disappearance_hold_expires_at_exact_boundary() {
        let mut engine = DisplayEngine::new(2, 5, 900, 1);
        let t0 = Utc::now();
        let key = opp("BTC-USD-PERP", t0).key();
        engine.update(&[opp("BTC-USD-PERP", t0)], t0);

        // Gap beyond continuation tolerance starts the hold countdown.
        let t_gone = t0 + Duration::seconds(3);
        engine.update(&[], t_gone);
        assert!(engine.is_displayed(&key));

        // Still within the 5s hold.
        let t_mid = t_gone + Duration::seconds(4);
        engine.update(&[], t_mid);
        assert!(engine.is_displayed(&key));

        // Hold deadline reached.
        let t_expired = t_gone + Duration::seconds(5);
        engine.update(&[], t_expired);
        assert!(!engine.is_displayed(&key));
    }

    #[test]
    fn reappearance_resets_hold_for_same_symbol() {
        let mut engine = DisplayEngine::new(2, 5, 900, 1);
        let t0 = Utc::now();
        engine.update(&[opp("BTC-USD-PERP", t0)], t0);

        let t_gone = t0 + Duration::seconds(3);
        engine.update(&[], t_gone);

        let t_back = t_gone + Duration::seconds(4);
        engine.update(&[opp("BTC-USD-PERP", t_back)], t_back);

        let t_after_original_deadline = t_gone + Duration::seconds(6);
        engine.update(&[], t_after_original_deadline);
        assert!(engine.is_displayed(&opp("BTC-USD-PERP", t0).key()));
    }

    #[test]
    fn duration_bridges_a_gap_within_tolerance() {
        let mut engine = DisplayEngine::new(2, 5, 900, 1);
        let t0 = Utc::now();
        let key = opp("BTC-USD-PERP", t0).key();
        engine.update(&[opp("BTC-USD-PERP", t0)], t0);

        // 2s gap is exactly the continuation tolerance: bridged, not reset.
        let t_back = t0 + Duration::seconds(2);
        engine.update(&[opp("BTC-USD-PERP", t_back)], t_back);
        assert_eq!(engine.duration(&key, t_back), Duration::seconds(2));
    }

    #[test]
    fn duration_resets_after_exceeding_tolerance() {
        let mut engine = DisplayEngine::new(2, 5, 900, 1);
        let t0 = Utc::now();
        let key = opp("BTC-USD-PERP", t0).key();
        engine.update(&[opp("BTC-USD-PERP", t0)], t0);

        // 3s gap exceeds the 2s tolerance: the run restarts at reappearance.
        let t_back = t0 + Duration::seconds(3);
        engine.update(&[opp("BTC-USD-PERP", t_back)], t_back);
        assert_eq!(engine.duration(&key, t_back), Duration::zero());
    }

    #[test]
    fn duration_is_zero_once_no_longer_displayed() {
        let engine = DisplayEngine::new(2, 5, 900, 1);
        let key = opp("BTC-USD-PERP", Utc::now()).key();
        assert_eq!(engine.duration(&key, Utc::now()), Duration::zero());
    }

    #[test]
    fn occurrence_window_boundary() {
        let mut engine = DisplayEngine::new(2, 5, 900, 0);
        let t0 = Utc::now();
        engine.update(&[opp("BTC-USD-PERP", t0)], t0);
        assert_eq!(engine.occurrence_count("BTC-USD-PERP"), 1);

        let t_900 = t0 + Duration::seconds(900);
        engine.update(&[], t_900);
        assert_eq!(engine.occurrence_count("BTC-USD-PERP"), 1);

        let t_901 = t0 + Duration::seconds(901);
        engine.update(&[], t_901);
        assert_eq!(engine.occurrence_count("BTC-USD-PERP"), 0);
    }
}
