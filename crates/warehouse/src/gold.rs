//! Gold aggregation: fixed-bucket OHLC/volume/notional bars from
//! normalized fact rows, with first/last-by-timestamp selection.

use ahash::AHashMap;
use duckdb::params;
use std::hash::Hash;
use tracing::debug;

use crate::duck::Warehouse;
use crate::error::Result;
use crate::models::MergeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Minute,
    Day,
}

impl Bucket {
    pub fn width_us(self) -> i64 {
        match self {
            Bucket::Minute => 60_000_000,
            Bucket::Day => 86_400_000_000,
        }
    }

    pub fn start_of(self, ts_event_us: i64) -> i64 {
        ts_event_us - ts_event_us.rem_euclid(self.width_us())
    }
}

/// One normalized observation: a quote contributes its mid with zero size,
/// a trade contributes its price and size. `seq` is insertion order within
/// equal timestamps and breaks first/last ties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactObs {
    pub ts_event_us: i64,
    pub seq: u64,
    pub mid: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoldBar {
    pub bucket_start_us: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub notional: f64,
    pub obs: u64,
}

struct Acc {
    bar: GoldBar,
    first_key: (i64, u64),
    last_key: (i64, u64),
}

/// Aggregate observations into one bar per (group, bucket).
///
/// open = mid at the earliest (ts, seq); close = mid at the latest, ties
/// resolved toward the higher seq; high/low = mid extrema; volume and
/// notional sum trade size and price x size. A bucket exists only where an
/// observation does, so empty buckets are never emitted and a
/// single-observation bucket degenerates to open=high=low=close.
pub fn aggregate<K: Eq + Hash + Ord + Clone>(
    obs: impl IntoIterator<Item = (K, FactObs)>,
    bucket: Bucket,
) -> Vec<(K, GoldBar)> {
    let mut groups: AHashMap<(K, i64), Acc> = AHashMap::new();

    for (key, o) in obs {
        let start = bucket.start_of(o.ts_event_us);
        let ord_key = (o.ts_event_us, o.seq);
        let entry = groups.entry((key, start));
        match entry {
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(Acc {
                    bar: GoldBar {
                        bucket_start_us: start,
                        open: o.mid,
                        high: o.mid,
                        low: o.mid,
                        close: o.mid,
                        volume: o.size,
                        notional: o.mid * o.size,
                        obs: 1,
                    },
                    first_key: ord_key,
                    last_key: ord_key,
                });
            }
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let acc = e.get_mut();
                if ord_key < acc.first_key {
                    acc.first_key = ord_key;
                    acc.bar.open = o.mid;
                }
                if ord_key >= acc.last_key {
                    acc.last_key = ord_key;
                    acc.bar.close = o.mid;
                }
                acc.bar.high = acc.bar.high.max(o.mid);
                acc.bar.low = acc.bar.low.min(o.mid);
                acc.bar.volume += o.size;
                acc.bar.notional += o.mid * o.size;
                acc.bar.obs += 1;
            }
        }
    }

    let mut out: Vec<(K, GoldBar)> = groups
        .into_iter()
        .map(|((key, _), acc)| (key, acc.bar))
        .collect();
    out.sort_by(|a, b| (&a.0, a.1.bucket_start_us).cmp(&(&b.0, b.1.bucket_start_us)));
    out
}

impl Warehouse {
    /// Build 1-minute gold bars per instrument from quotes and trades and
    /// merge them into g_bar_1m. Re-running over the same facts replaces
    /// rows with identical content.
    pub fn build_gold_1m(&self) -> Result<MergeOutcome> {
        let obs = {
            let mut stmt = self.conn.prepare(
                "SELECT ts, instrument_id, mid, size FROM (
                    SELECT epoch_us(ts_event) AS ts, instrument_id,
                           (bid_px + ask_px) / 2.0 AS mid, 0.0 AS size
                      FROM f_quote_l1
                    UNION ALL
                    SELECT epoch_us(ts_event), instrument_id, last_px, last_sz
                      FROM f_trade
                 ) ORDER BY ts, instrument_id, size, mid",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(0)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, f64>(3)?,
                ))
            })?;
            let mut obs = Vec::new();
            for (seq, row) in rows.enumerate() {
                let (instrument_id, ts, mid, size) = row?;
                obs.push((
                    instrument_id,
                    FactObs { ts_event_us: ts, seq: seq as u64, mid, size },
                ));
            }
            obs
        };

        let bars = aggregate(obs, Bucket::Minute);
        debug!(buckets = bars.len(), "gold 1m aggregation");
        self.merge_gold_bars(&bars)
    }

    fn merge_gold_bars(&self, bars: &[(i64, GoldBar)]) -> Result<MergeOutcome> {
        self.with_transaction(|conn| {
            let mut exists = conn.prepare(
                "SELECT count(*) FROM g_bar_1m
                  WHERE bucket_start = make_timestamp(?) AND instrument_id = ?",
            )?;
            let mut upsert = conn.prepare(
                "INSERT OR REPLACE INTO g_bar_1m
                   (bucket_start, instrument_id, open, high, low, close, volume, notional)
                 VALUES (make_timestamp(?), ?, ?, ?, ?, ?, ?, ?)",
            )?;
            let mut out = MergeOutcome::default();
            for (instrument_id, bar) in bars {
                let present: i64 = exists
                    .query_row(params![bar.bucket_start_us, instrument_id], |r| r.get(0))?;
                upsert.execute(params![
                    bar.bucket_start_us,
                    instrument_id,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.notional,
                ])?;
                if present > 0 {
                    out.replaced += 1;
                } else {
                    out.inserted += 1;
                }
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(ts: i64, seq: u64, mid: f64, size: f64) -> FactObs {
        FactObs { ts_event_us: ts, seq, mid, size }
    }

    #[test]
    fn single_tick_round_trips() {
        let bars = aggregate([("ES", obs(61_000_000, 0, 101.5, 3.0))], Bucket::Minute);
        assert_eq!(bars.len(), 1);
        let (_, b) = &bars[0];
        assert_eq!(b.bucket_start_us, 60_000_000);
        assert_eq!(b.open, 101.5);
        assert_eq!(b.high, 101.5);
        assert_eq!(b.low, 101.5);
        assert_eq!(b.close, 101.5);
        assert_eq!(b.volume, 3.0);
        assert_eq!(b.notional, 101.5 * 3.0);
    }

    #[test]
    fn open_close_follow_timestamps_not_input_order() {
        let bars = aggregate(
            [
                (1i64, obs(30_000_000, 2, 100.0, 1.0)),
                (1i64, obs(10_000_000, 0, 99.0, 1.0)),
                (1i64, obs(20_000_000, 1, 105.0, 1.0)),
            ],
            Bucket::Minute,
        );
        let (_, b) = &bars[0];
        assert_eq!(b.open, 99.0);
        assert_eq!(b.close, 100.0);
        assert_eq!(b.high, 105.0);
        assert_eq!(b.low, 99.0);
        assert_eq!(b.volume, 3.0);
    }

    #[test]
    fn equal_timestamps_break_close_ties_on_seq() {
        let ts = 5_000_000;
        let bars = aggregate(
            [(1i64, obs(ts, 1, 100.0, 0.0)), (1i64, obs(ts, 2, 101.0, 0.0))],
            Bucket::Minute,
        );
        let (_, b) = &bars[0];
        assert_eq!(b.open, 100.0);
        assert_eq!(b.close, 101.0); // higher seq wins the tie
    }

    #[test]
    fn buckets_split_on_boundaries() {
        let bars = aggregate(
            [
                (1i64, obs(59_999_999, 0, 1.0, 0.0)),
                (1i64, obs(60_000_000, 1, 2.0, 0.0)),
            ],
            Bucket::Minute,
        );
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].1.bucket_start_us, 0);
        assert_eq!(bars[1].1.bucket_start_us, 60_000_000);
    }

    #[test]
    fn no_observations_no_buckets() {
        let bars = aggregate(std::iter::empty::<(i64, FactObs)>(), Bucket::Day);
        assert!(bars.is_empty());
    }

    #[test]
    fn quotes_carry_no_volume() {
        let bars = aggregate(
            [
                (1i64, obs(1, 0, 100.0, 0.0)), // quote mid
                (1i64, obs(2, 1, 100.5, 4.0)), // trade
            ],
            Bucket::Day,
        );
        let (_, b) = &bars[0];
        assert_eq!(b.volume, 4.0);
        assert_eq!(b.notional, 100.5 * 4.0);
    }

    #[test]
    fn groups_are_independent() {
        let bars = aggregate(
            [(1i64, obs(1, 0, 10.0, 1.0)), (2i64, obs(1, 1, 20.0, 1.0))],
            Bucket::Day,
        );
        assert_eq!(bars.len(), 2);
    }
}
