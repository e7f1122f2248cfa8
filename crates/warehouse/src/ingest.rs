//! Write-side entry points for dimension rows and fact batches coming from
//! the download/transform collaborator.

use duckdb::params;
use tracing::info;

use continuous::{ContractSeries, Instrument, RollEvent};

use crate::duck::Warehouse;
use crate::error::Result;
use crate::models::TradeRow;

impl Warehouse {
    /// Upsert instrument definitions keyed by instrument_id. Definitions
    /// are never deleted; a newer definition for the same id supersedes
    /// the old row.
    pub fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<usize> {
        self.with_transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO dim_instrument
                   (instrument_id, root, expiry, tick_size, multiplier, native_symbol)
                 VALUES (?, ?, CAST(? AS DATE), ?, ?, ?)
                 ON CONFLICT (instrument_id) DO UPDATE SET
                   root = excluded.root,
                   expiry = excluded.expiry,
                   tick_size = excluded.tick_size,
                   multiplier = excluded.multiplier,
                   native_symbol = excluded.native_symbol",
            )?;
            for inst in instruments {
                stmt.execute(params![
                    inst.instrument_id,
                    inst.root,
                    inst.expiry.to_string(),
                    inst.tick_size,
                    inst.multiplier,
                    inst.native_symbol,
                ])?;
            }
            Ok(instruments.len())
        })
    }

    /// Register a continuous series in the dimension table. Created once
    /// per distinct triple; only the description may change afterwards.
    pub fn register_series(
        &self,
        series: &ContractSeries,
        adjustment_method: &str,
        description: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO dim_continuous_contract
               (contract_series, root, rank, roll_rule, adjustment_method, description)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (contract_series) DO UPDATE SET
               description = excluded.description",
            params![
                series.key(),
                series.root,
                series.rank,
                series.rule.tag(),
                adjustment_method,
                description,
            ],
        )?;
        Ok(())
    }

    /// Append trades. Trades carry no natural key (two identical prints
    /// are two trades); upstream batches are file-level deduplicated.
    pub fn append_trades(&self, rows: &[TradeRow]) -> Result<usize> {
        self.with_transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO f_trade
                   (ts_event, ts_rcv, instrument_id, last_px, last_sz, aggressor)
                 VALUES (make_timestamp(?), make_timestamp(?), ?, ?, ?, ?)",
            )?;
            for t in rows {
                stmt.execute(params![
                    t.ts_event_us,
                    t.ts_rcv_us,
                    t.instrument_id,
                    t.last_px,
                    t.last_sz,
                    t.aggressor,
                ])?;
            }
            Ok(rows.len())
        })
    }

    /// Record detected roll transitions, enriched with symbols/expiries
    /// when the catalog knows the contracts. Replace-on-conflict keeps the
    /// log append-only in effect while staying re-runnable.
    pub fn record_roll_events(
        &self,
        events: &[RollEvent],
        catalog: &continuous::CatalogSnapshot,
    ) -> Result<usize> {
        self.with_transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO dim_roll_dates
                   (contract_series, rank, roll_date,
                    old_instrument_id, new_instrument_id,
                    old_native_symbol, new_native_symbol,
                    old_expiry, new_expiry)
                 VALUES (?, ?, CAST(? AS DATE), ?, ?, ?, ?, CAST(? AS DATE), CAST(? AS DATE))",
            )?;
            for ev in events {
                let old = catalog.get(ev.old_instrument_id);
                let new = catalog.get(ev.new_instrument_id);
                stmt.execute(params![
                    ev.series.key(),
                    ev.series.rank,
                    ev.roll_date.to_string(),
                    ev.old_instrument_id,
                    ev.new_instrument_id,
                    old.map(|i| i.native_symbol.clone()),
                    new.map(|i| i.native_symbol.clone()),
                    old.map(|i| i.expiry.to_string()),
                    new.map(|i| i.expiry.to_string()),
                ])?;
            }
            if !events.is_empty() {
                info!(count = events.len(), "recorded roll events");
            }
            Ok(events.len())
        })
    }
}
