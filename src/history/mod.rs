pub mod storage;

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::config::ReducerStrategy;
use crate::types::{SampledRecord, Spread};

type BucketKey = (String, String, String, DateTime<Utc>);

/// One raw row captured for a bucket: a spread plus the funding-rate
/// differential known at the time it was observed. Kept as a full row
/// (rather than a bare `spread_pct`) so `max`/`mean` can act on every
/// numeric field, not just the one the reducer is named after.
#[derive(Debug, Clone)]
struct SampleRow {
    price_buy: Decimal,
    price_sell: Decimal,
    size_buy: Decimal,
    size_sell: Decimal,
    spread_pct: Decimal,
    funding_rate_diff_8h: Option<Decimal>,
}

/// Wall-clock bucketed sampling accumulator. Feeds raw spreads in as they're
/// computed; on bucket rollover, reduces each key's accumulated rows
/// (`max`, `mean`, or `latest`) into one `SampledRecord` per key.
pub struct SamplingAccumulator {
    interval: chrono::Duration,
    reducer: ReducerStrategy,
    buckets: HashMap<BucketKey, Vec<SampleRow>>,
}

impl SamplingAccumulator {
    pub fn new(interval_secs: u64, reducer: ReducerStrategy) -> Self {
        Self {
            interval: chrono::Duration::seconds(interval_secs as i64),
            reducer,
            buckets: HashMap::new(),
        }
    }

    fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let interval_secs = self.interval.num_seconds().max(1);
        let floored = (at.timestamp().div_euclid(interval_secs)) * interval_secs;
        Utc.timestamp_opt(floored, 0).single().unwrap_or(at)
    }

    /// Records one spread observation, optionally carrying the funding-rate
    /// differential known for that `(venue_buy, venue_sell)` pair at the
    /// time of observation.
    pub fn record(&mut self, spread: &Spread, funding_rate_diff_8h: Option<Decimal>) {
        let bucket_start = self.bucket_start(spread.timestamp);
        let key = (
            spread.symbol.clone(),
            spread.venue_buy.clone(),
            spread.venue_sell.clone(),
            bucket_start,
        );
        self.buckets.entry(key).or_default().push(SampleRow {
            price_buy: spread.price_buy,
            price_sell: spread.price_sell,
            size_buy: spread.size_buy,
            size_sell: spread.size_sell,
            spread_pct: spread.spread_pct,
            funding_rate_diff_8h,
        });
    }

    /// Reduces and removes every bucket whose `bucket_start` has fully
    /// elapsed as of `now`, returning one `SampledRecord` per bucket.
    pub fn flush_elapsed(&mut self, now: DateTime<Utc>) -> Vec<SampledRecord> {
        let current_bucket = self.bucket_start(now);
        let elapsed_keys: Vec<BucketKey> = self
            .buckets
            .keys()
            .filter(|(_, _, _, bucket_start)| *bucket_start < current_bucket)
            .cloned()
            .collect();

        let mut records = Vec::with_capacity(elapsed_keys.len());
        for key in elapsed_keys {
            let rows = self.buckets.remove(&key).unwrap_or_default();
            if rows.is_empty() {
                continue;
            }
            let (symbol, venue_buy, venue_sell, bucket_start_time) = key;
            let reduced = reduce(&rows, self.reducer);
            records.push(SampledRecord {
                symbol,
                venue_buy,
                venue_sell,
                bucket_start_time,
                price_buy: reduced.price_buy,
                price_sell: reduced.price_sell,
                size_buy: reduced.size_buy,
                size_sell: reduced.size_sell,
                spread_pct: reduced.spread_pct,
                funding_rate_diff_8h: reduced.funding_rate_diff_8h,
                funding_rate_diff_annual_pct: reduced
                    .funding_rate_diff_8h
                    .map(|diff| diff * Decimal::from(1095) * Decimal::ONE_HUNDRED),
            });
        }
        records
    }
}

/// Reduces a bucket's rows to one row per the configured strategy:
/// `max` picks the row with the largest `spread_pct` wholesale, `mean`
/// averages every numeric field independently, `latest` takes the
/// most-recently-recorded row as-is.
fn reduce(rows: &[SampleRow], strategy: ReducerStrategy) -> SampleRow {
    match strategy {
        ReducerStrategy::Max => rows
            .iter()
            .max_by(|a, b| a.spread_pct.cmp(&b.spread_pct))
            .cloned()
            .expect("rows is non-empty"),
        ReducerStrategy::Mean => {
            let count = Decimal::from(rows.len());
            let sum_field = |f: fn(&SampleRow) -> Decimal| -> Decimal {
                rows.iter().map(f).sum::<Decimal>() / count
            };
            let funding_diffs: Vec<Decimal> =
                rows.iter().filter_map(|r| r.funding_rate_diff_8h).collect();
            SampleRow {
                price_buy: sum_field(|r| r.price_buy),
                price_sell: sum_field(|r| r.price_sell),
                size_buy: sum_field(|r| r.size_buy),
                size_sell: sum_field(|r| r.size_sell),
                spread_pct: sum_field(|r| r.spread_pct),
                funding_rate_diff_8h: if funding_diffs.is_empty() {
                    None
                } else {
                    Some(funding_diffs.iter().copied().sum::<Decimal>() / Decimal::from(funding_diffs.len()))
                },
            }
        }
        ReducerStrategy::Latest => rows.last().cloned().expect("rows is non-empty"),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn spread_at(pct: Decimal, secs: i64) -> Spread {
        let price_buy = dec!(100);
        let price_sell = price_buy + price_buy * pct / dec!(100);
        Spread {
            symbol: "BTC-USD-PERP".to_string(),
            venue_buy: "binance".to_string(),
            venue_sell: "lighter".to_string(),
            price_buy,
            price_sell,
            size_buy: dec!(1),
            size_sell: dec!(1),
            spread_abs: price_sell - price_buy,
            spread_pct: pct,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn max_reducer_picks_the_row_with_largest_spread() {
        let mut acc = SamplingAccumulator::new(60, ReducerStrategy::Max);
        acc.record(&spread_at(dec!(0.1), 10), None);
        acc.record(&spread_at(dec!(0.3), 30), Some(dec!(0.002)));
        acc.record(&spread_at(dec!(0.2), 50), None);

        let records = acc.flush_elapsed(Utc.timestamp_opt(120, 0).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spread_pct, dec!(0.3));
        assert_eq!(records[0].funding_rate_diff_8h, Some(dec!(0.002)));
    }

    #[test]
    fn mean_reducer_averages_every_numeric_field() {
        let mut acc = SamplingAccumulator::new(60, ReducerStrategy::Mean);
        acc.record(&spread_at(dec!(0.1), 10), Some(dec!(0.001)));
        acc.record(&spread_at(dec!(0.3), 30), Some(dec!(0.003)));

        let records = acc.flush_elapsed(Utc.timestamp_opt(120, 0).unwrap());
        assert_eq!(records[0].spread_pct, dec!(0.2));
        assert_eq!(records[0].funding_rate_diff_8h, Some(dec!(0.002)));
    }

    #[test]
    fn latest_reducer_takes_the_most_recently_recorded_row() {
        let mut acc = SamplingAccumulator::new(60, ReducerStrategy::Latest);
        acc.record(&spread_at(dec!(0.1), 10), None);
        acc.record(&spread_at(dec!(0.3), 30), None);

        let records = acc.flush_elapsed(Utc.timestamp_opt(120, 0).unwrap());
        assert_eq!(records[0].spread_pct, dec!(0.3));
    }

    #[test]
    fn bucket_not_flushed_until_fully_elapsed() {
        let mut acc = SamplingAccumulator::new(60, ReducerStrategy::Max);
        acc.record(&spread_at(dec!(0.1), 10), None);
        let records = acc.flush_elapsed(Utc.timestamp_opt(45, 0).unwrap());
        assert!(records.is_empty());
    }
}
