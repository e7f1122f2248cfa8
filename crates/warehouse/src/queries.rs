//! Read side: catalog snapshots, session calendar, existing-date probes,
//! raw-bar lookups for the series builder.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use duckdb::{params, OptionalExt};

use continuous::{CatalogSnapshot, DailyBar, DailyBarSource, Instrument, SessionCalendar};

use crate::duck::Warehouse;
use crate::error::Result;

fn parse_date(s: &str) -> NaiveDate {
    // DuckDB renders DATE as ISO-8601; anything else is a driver bug we
    // want to hear about in tests, not paper over.
    NaiveDate::from_str(s).expect("ISO date from DuckDB")
}

impl Warehouse {
    /// Load every instrument definition into an in-memory snapshot for
    /// the resolver. The snapshot is the point-in-time truth; refreshing
    /// it means calling this again.
    pub fn load_catalog(&self) -> Result<CatalogSnapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT instrument_id, root, CAST(expiry AS VARCHAR),
                    tick_size, multiplier, native_symbol
               FROM dim_instrument",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(Instrument {
                instrument_id: r.get(0)?,
                root: r.get(1)?,
                expiry: parse_date(&r.get::<_, String>(2)?),
                tick_size: r.get(3)?,
                multiplier: r.get(4)?,
                native_symbol: r.get(5)?,
            })
        })?;
        let mut snap = CatalogSnapshot::new();
        for row in rows {
            snap.upsert(row?);
        }
        Ok(snap)
    }

    /// Trading dates already present for a series in
    /// g_continuous_bar_daily. Used to skip re-builds of covered ranges.
    pub fn existing_daily_dates(&self, contract_series: &str) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT CAST(trading_date AS VARCHAR)
               FROM g_continuous_bar_daily
              WHERE contract_series = ?
              ORDER BY 1",
        )?;
        let rows = stmt.query_map(params![contract_series], |r| r.get::<_, String>(0))?;
        rows.map(|r| r.map(|s| parse_date(&s)))
            .collect::<std::result::Result<_, _>>()
            .map_err(Into::into)
    }

    /// Session calendar from dim_session. Empty until the first
    /// [`Warehouse::sync_sessions`] run.
    pub fn session_calendar(&self) -> Result<SessionCalendar> {
        let mut stmt = self
            .conn
            .prepare("SELECT CAST(trade_date AS VARCHAR) FROM dim_session")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let dates: Vec<NaiveDate> = rows
            .map(|r| r.map(|s| parse_date(&s)))
            .collect::<std::result::Result<_, _>>()?;
        Ok(SessionCalendar::from_dates(dates))
    }

    /// Derive the trading calendar from the data: insert every
    /// trading_date seen in g_continuous_bar_daily that dim_session does
    /// not know yet. The data is the source of truth; futures trade many
    /// Sundays, so no weekday assumption would survive contact with it.
    /// Idempotent; returns the number of sessions added.
    pub fn sync_sessions(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT CAST(trading_date AS VARCHAR)
               FROM g_continuous_bar_daily
              WHERE trading_date NOT IN (SELECT trade_date FROM dim_session)",
        )?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let missing: Vec<NaiveDate> = rows
            .map(|r| r.map(|s| parse_date(&s)))
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        self.with_transaction(|conn| {
            let mut ins = conn.prepare(
                "INSERT OR IGNORE INTO dim_session
                   (trade_date, week, month, quarter, is_holiday)
                 VALUES (CAST(? AS DATE), ?, ?, ?, FALSE)",
            )?;
            for d in &missing {
                ins.execute(params![
                    d.to_string(),
                    d.iso_week().week(),
                    d.month(),
                    (d.month0() / 3) + 1,
                ])?;
            }
            Ok(missing.len())
        })
    }

    /// Bootstrap calendar for first builds: the distinct trading dates of
    /// the raw per-expiry bars. Once continuous bars exist,
    /// [`Warehouse::sync_sessions`] keeps dim_session authoritative.
    pub fn calendar_from_raw(&self) -> Result<SessionCalendar> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT CAST(trading_date AS VARCHAR) FROM f_fut_bar_daily",
        )?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let dates: Vec<NaiveDate> = rows
            .map(|r| r.map(|s| parse_date(&s)))
            .collect::<std::result::Result<_, _>>()?;
        Ok(SessionCalendar::from_dates(dates))
    }

    /// Raw daily bar for one (instrument, date), if ingested.
    pub fn raw_daily_bar(&self, instrument_id: i64, date: NaiveDate) -> Result<Option<DailyBar>> {
        let mut stmt = self.conn.prepare(
            "SELECT open, high, low, close, volume
               FROM f_fut_bar_daily
              WHERE instrument_id = ? AND trading_date = CAST(? AS DATE)",
        )?;
        let bar = stmt
            .query_row(params![instrument_id, date.to_string()], |r| {
                Ok(DailyBar {
                    open: r.get(0)?,
                    high: r.get(1)?,
                    low: r.get(2)?,
                    close: r.get(3)?,
                    volume: r.get(4)?,
                })
            })
            .optional()?;
        Ok(bar)
    }

    /// Per-table row counts for the summary display.
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        const TABLES: &[&str] = &[
            "dim_instrument",
            "dim_continuous_contract",
            "dim_canonical_series",
            "dim_roll_dates",
            "dim_session",
            "f_quote_l1",
            "f_trade",
            "f_continuous_quote_l1",
            "f_fut_bar_daily",
            "g_continuous_bar_daily",
            "g_bar_1m",
        ];
        let mut out = Vec::with_capacity(TABLES.len());
        for t in TABLES {
            out.push((*t, self.count(t)?));
        }
        Ok(out)
    }
}

/// The warehouse is the series builder's raw fact store.
impl DailyBarSource for Warehouse {
    fn daily_bar(&self, instrument_id: i64, date: NaiveDate) -> Option<DailyBar> {
        self.raw_daily_bar(instrument_id, date).ok().flatten()
    }
}

/// And the resolver's volume source: observed volume is the raw daily
/// bar's volume.
impl continuous::VolumeSource for Warehouse {
    fn volume_on(&self, instrument_id: i64, date: NaiveDate) -> Option<i64> {
        self.daily_bar(instrument_id, date).map(|b| b.volume)
    }
}
