//! Idempotent merge layer.
//!
//! Every natural-keyed fact table goes through the same protocol: validate
//! the whole batch up front, then write it in one transaction with
//! replace-on-conflict semantics. A merge always leaves exactly one row per
//! natural key, and re-merging identical content changes nothing but may
//! physically rewrite rows. Duplicate-key violations never reach the
//! caller; a batch that fails validation is rejected whole, with every
//! offending key reported.

use duckdb::params;
use tracing::{debug, warn};

use continuous::ContinuousBar;

use crate::duck::Warehouse;
use crate::error::{MergeError, Result};
use crate::models::{ContinuousQuoteRow, FutDailyBarRow, MergeOutcome, QuoteRow};

/// Batch validation: drop exact duplicates, reject the batch when a key
/// appears with conflicting content or a row fails its own checks.
/// Returns the surviving rows in input order.
fn validate_batch<'a, R: PartialEq>(
    table: &'static str,
    rows: &'a [R],
    key_of: impl Fn(&R) -> String,
    row_ok: impl Fn(&R) -> bool,
) -> std::result::Result<Vec<&'a R>, MergeError> {
    let mut bad_keys: Vec<String> = Vec::new();
    let mut seen: ahash::AHashMap<String, &R> = ahash::AHashMap::new();
    let mut keep: Vec<&R> = Vec::new();

    for row in rows {
        let key = key_of(row);
        if !row_ok(row) {
            bad_keys.push(key);
            continue;
        }
        match seen.get(&key) {
            None => {
                seen.insert(key, row);
                keep.push(row);
            }
            Some(prev) if **prev == *row => {
                // exact duplicate within the batch: collapse silently
            }
            Some(_) => bad_keys.push(key),
        }
    }

    if bad_keys.is_empty() {
        Ok(keep)
    } else {
        bad_keys.sort();
        bad_keys.dedup();
        Err(MergeError::PartialBatchFailure { table, keys: bad_keys })
    }
}

fn finite(xs: &[f64]) -> bool {
    xs.iter().all(|x| x.is_finite())
}

impl Warehouse {
    /// Merge continuous daily bars by (trading_date, contract_series).
    pub fn merge_continuous_bars(&self, bars: &[ContinuousBar]) -> Result<MergeOutcome> {
        let keep = validate_batch(
            "g_continuous_bar_daily",
            bars,
            |b| format!("{}|{}", b.trading_date, b.series.key()),
            |b| finite(&[b.open, b.high, b.low, b.close]) && b.volume >= 0,
        )?;

        self.with_transaction(|conn| {
            let mut exists = conn.prepare(
                "SELECT count(*) FROM g_continuous_bar_daily
                  WHERE trading_date = CAST(? AS DATE) AND contract_series = ?",
            )?;
            let mut upsert = conn.prepare(
                "INSERT OR REPLACE INTO g_continuous_bar_daily
                   (trading_date, contract_series, underlying_instrument_id,
                    open, high, low, close, volume)
                 VALUES (CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?)",
            )?;
            let mut out = MergeOutcome::default();
            for bar in keep {
                let date = bar.trading_date.to_string();
                let key = bar.series.key();
                let present: i64 =
                    exists.query_row(params![date, key], |r| r.get(0))?;
                upsert.execute(params![
                    date,
                    key,
                    bar.underlying_instrument_id,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
                if present > 0 {
                    out.replaced += 1;
                } else {
                    out.inserted += 1;
                }
            }
            debug!(inserted = out.inserted, replaced = out.replaced, "merged continuous bars");
            Ok(out)
        })
    }

    /// Merge raw per-expiry daily bars by (trading_date, instrument_id).
    pub fn merge_daily_bars(&self, rows: &[FutDailyBarRow]) -> Result<MergeOutcome> {
        let keep = validate_batch(
            "f_fut_bar_daily",
            rows,
            |b| format!("{}|{}", b.trading_date, b.instrument_id),
            |b| finite(&[b.open, b.high, b.low, b.close]) && b.volume >= 0,
        )?;

        self.with_transaction(|conn| {
            let mut exists = conn.prepare(
                "SELECT count(*) FROM f_fut_bar_daily
                  WHERE trading_date = CAST(? AS DATE) AND instrument_id = ?",
            )?;
            let mut upsert = conn.prepare(
                "INSERT OR REPLACE INTO f_fut_bar_daily
                   (trading_date, instrument_id, open, high, low, close, volume)
                 VALUES (CAST(? AS DATE), ?, ?, ?, ?, ?, ?)",
            )?;
            let mut out = MergeOutcome::default();
            for bar in keep {
                let date = bar.trading_date.to_string();
                let present: i64 =
                    exists.query_row(params![date, bar.instrument_id], |r| r.get(0))?;
                upsert.execute(params![
                    date,
                    bar.instrument_id,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
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

    /// Merge level-1 quotes by (ts_event, instrument_id).
    pub fn merge_quotes(&self, rows: &[QuoteRow]) -> Result<MergeOutcome> {
        let keep = validate_batch(
            "f_quote_l1",
            rows,
            |q| format!("{}|{}", q.ts_event_us, q.instrument_id),
            |q| finite(&[q.bid_px, q.bid_sz, q.ask_px, q.ask_sz]),
        )?;

        self.with_transaction(|conn| {
            let mut exists = conn.prepare(
                "SELECT count(*) FROM f_quote_l1
                  WHERE ts_event = make_timestamp(?) AND instrument_id = ?",
            )?;
            let mut upsert = conn.prepare(
                "INSERT OR REPLACE INTO f_quote_l1
                   (ts_event, ts_rcv, instrument_id, bid_px, bid_sz, ask_px, ask_sz)
                 VALUES (make_timestamp(?), make_timestamp(?), ?, ?, ?, ?, ?)",
            )?;
            let mut out = MergeOutcome::default();
            for q in keep {
                let present: i64 =
                    exists.query_row(params![q.ts_event_us, q.instrument_id], |r| r.get(0))?;
                upsert.execute(params![
                    q.ts_event_us,
                    q.ts_rcv_us,
                    q.instrument_id,
                    q.bid_px,
                    q.bid_sz,
                    q.ask_px,
                    q.ask_sz,
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

    /// Merge continuous quotes by (ts_event, contract_series,
    /// underlying_instrument_id).
    pub fn merge_continuous_quotes(&self, rows: &[ContinuousQuoteRow]) -> Result<MergeOutcome> {
        let keep = validate_batch(
            "f_continuous_quote_l1",
            rows,
            |q| format!("{}|{}|{}", q.ts_event_us, q.contract_series, q.underlying_instrument_id),
            |q| finite(&[q.bid_px, q.bid_sz, q.ask_px, q.ask_sz]),
        )?;

        self.with_transaction(|conn| {
            let mut exists = conn.prepare(
                "SELECT count(*) FROM f_continuous_quote_l1
                  WHERE ts_event = make_timestamp(?)
                    AND contract_series = ?
                    AND underlying_instrument_id = ?",
            )?;
            let mut upsert = conn.prepare(
                "INSERT OR REPLACE INTO f_continuous_quote_l1
                   (ts_event, ts_rcv, contract_series, underlying_instrument_id,
                    bid_px, bid_sz, ask_px, ask_sz)
                 VALUES (make_timestamp(?), make_timestamp(?), ?, ?, ?, ?, ?, ?)",
            )?;
            let mut out = MergeOutcome::default();
            for q in keep {
                let present: i64 = exists.query_row(
                    params![q.ts_event_us, q.contract_series, q.underlying_instrument_id],
                    |r| r.get(0),
                )?;
                upsert.execute(params![
                    q.ts_event_us,
                    q.ts_rcv_us,
                    q.contract_series,
                    q.underlying_instrument_id,
                    q.bid_px,
                    q.bid_sz,
                    q.ask_px,
                    q.ask_sz,
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

    /// Canonical duplicate repair: collapse existing duplicates of
    /// `key_cols` to the lexicographically-first surviving row (ordered by
    /// the full column list), then enforce uniqueness going forward with a
    /// unique index. Returns the number of rows removed.
    ///
    /// Tables created with a natural PRIMARY KEY never accumulate
    /// duplicates; this exists for legacy data and for tables ingested
    /// before their key constraint was introduced.
    pub fn dedupe_then_enforce_unique(&self, table: &str, key_cols: &[&str]) -> Result<u64> {
        let cols: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT column_name FROM information_schema.columns
                  WHERE table_name = ? ORDER BY ordinal_position",
            )?;
            let rows = stmt.query_map(params![table], |r| r.get::<_, String>(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        let col_list = cols.join(", ");
        let key_list = key_cols.join(", ");

        let before = self.count(table)?;
        self.with_transaction(|conn| {
            conn.execute_batch(&format!(
                r#"
                CREATE OR REPLACE TEMP TABLE _dedup AS
                SELECT {col_list} FROM (
                    SELECT t.*, row_number() OVER (
                        PARTITION BY {key_list} ORDER BY {col_list}
                    ) AS rn
                    FROM {table} t
                ) WHERE rn = 1;
                DELETE FROM {table};
                INSERT INTO {table} SELECT {col_list} FROM _dedup;
                DROP TABLE _dedup;
                "#
            ))?;
            Ok(())
        })?;
        let after = self.count(table)?;

        self.conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_{table}_natural ON {table}({key_list});"
        ))?;

        let removed = (before - after).max(0) as u64;
        if removed > 0 {
            warn!(table, removed, "collapsed duplicate natural keys");
        }
        Ok(removed)
    }
}
