//! Canonical series selection: one authoritative continuous series per
//! root, operator-directed and coverage-informed.

use std::str::FromStr;

use chrono::NaiveDate;
use duckdb::{params, OptionalExt};
use tracing::info;

use continuous::CanonicalConfig;

use crate::duck::Warehouse;
use crate::error::{Result, WarehouseError};
use crate::models::{CanonicalBarRow, CanonicalRow, CoverageRow};

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::from_str(s).expect("ISO date from DuckDB")
}

impl Warehouse {
    /// The canonical series key for a root, if one is configured.
    pub fn canonical_for(&self, root: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT contract_series FROM dim_canonical_series WHERE root = ?")?;
        Ok(stmt.query_row(params![root], |r| r.get(0)).optional()?)
    }

    /// Point a root at a series. Full replacement of the root's row, never
    /// additive: after this call exactly one mapping exists for `root`.
    pub fn set_canonical(
        &self,
        root: &str,
        contract_series: &str,
        description: Option<&str>,
        optional: bool,
    ) -> Result<()> {
        self.with_transaction(|conn| {
            conn.execute("DELETE FROM dim_canonical_series WHERE root = ?", params![root])?;
            conn.execute(
                "INSERT INTO dim_canonical_series (root, contract_series, description, optional)
                 VALUES (?, ?, ?, ?)",
                params![root, contract_series, description, optional],
            )?;
            Ok(())
        })?;
        info!(root, contract_series, "canonical mapping set");
        Ok(())
    }

    /// Apply an operator config file wholesale (one full replace per root).
    pub fn apply_canonical_config(&self, config: &CanonicalConfig) -> Result<usize> {
        for (root, entry) in &config.roots {
            self.set_canonical(
                root,
                &entry.contract_series,
                entry.description.as_deref(),
                entry.optional,
            )?;
        }
        Ok(config.roots.len())
    }

    pub fn canonical_mappings(&self) -> Result<Vec<CanonicalRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT root, contract_series, description, optional
               FROM dim_canonical_series ORDER BY root",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(CanonicalRow {
                root: r.get(0)?,
                contract_series: r.get(1)?,
                description: r.get(2)?,
                optional: r.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
    }

    /// Read the canonical view, enforcing its hard invariant first: at
    /// most one row per (root, trading_date). An ambiguous view fails
    /// loudly instead of returning silently-deduplicated rows.
    pub fn canonical_bars(&self, root: Option<&str>) -> Result<Vec<CanonicalBarRow>> {
        let dup = {
            let mut stmt = self.conn.prepare(
                "SELECT root, CAST(trading_date AS VARCHAR), count(*)
                   FROM v_canonical_bar_daily
                  WHERE (? IS NULL OR root = ?)
                  GROUP BY root, trading_date
                 HAVING count(*) > 1
                  ORDER BY root, trading_date
                  LIMIT 1",
            )?;
            stmt.query_row(params![root, root], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
            })
            .optional()?
        };
        if let Some((dup_root, date, count)) = dup {
            return Err(WarehouseError::CanonicalAmbiguity {
                root: dup_root,
                date: parse_date(&date),
                count: count as usize,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT root, CAST(trading_date AS VARCHAR), contract_series,
                    underlying_instrument_id, open, high, low, close, volume
               FROM v_canonical_bar_daily
              WHERE (? IS NULL OR root = ?)
              ORDER BY root, trading_date",
        )?;
        let rows = stmt.query_map(params![root, root], |r| {
            Ok(CanonicalBarRow {
                root: r.get(0)?,
                trading_date: parse_date(&r.get::<_, String>(1)?),
                contract_series: r.get(2)?,
                underlying_instrument_id: r.get(3)?,
                open: r.get(4)?,
                high: r.get(5)?,
                low: r.get(6)?,
                close: r.get(7)?,
                volume: r.get(8)?,
            })
        })?;
        rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
    }

    /// Coverage audit over g_continuous_bar_daily: per candidate series of
    /// each root, how many bars and over what span. Read-only; feeds the
    /// operator's canonical decision, never applies one.
    pub fn audit_coverage(&self, root: Option<&str>) -> Result<Vec<CoverageRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT contract_series,
                    count(*) AS row_count,
                    CAST(min(trading_date) AS VARCHAR) AS first_date,
                    CAST(max(trading_date) AS VARCHAR) AS last_date
               FROM g_continuous_bar_daily
              GROUP BY contract_series
              ORDER BY contract_series",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (series, row_count, first, last) = row?;
            // root is the prefix before the first underscore of the key
            let series_root = series.split('_').next().unwrap_or(&series).to_string();
            if let Some(filter) = root {
                if !series_root.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            let first_date = parse_date(&first);
            let last_date = parse_date(&last);
            let coverage_years = (last_date - first_date).num_days() as f64 / 365.25;
            out.push(CoverageRow {
                root: series_root,
                contract_series: series,
                first_date,
                last_date,
                row_count,
                coverage_years,
            });
        }
        Ok(out)
    }

    /// Best-coverage recommendation per root: most rows, ties broken by
    /// the latest last_date. Purely advisory.
    pub fn recommend_canonical(&self, root: Option<&str>) -> Result<Vec<CoverageRow>> {
        let coverage = self.audit_coverage(root)?;
        let mut best: ahash::AHashMap<String, CoverageRow> = ahash::AHashMap::new();
        for row in coverage {
            match best.get(&row.root) {
                Some(cur)
                    if (cur.row_count, cur.last_date) >= (row.row_count, row.last_date) => {}
                _ => {
                    best.insert(row.root.clone(), row);
                }
            }
        }
        let mut out: Vec<CoverageRow> = best.into_values().collect();
        out.sort_by(|a, b| a.root.cmp(&b.root));
        Ok(out)
    }
}
