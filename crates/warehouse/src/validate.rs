//! Post-ingest integrity checks. Read-only: they report, the operator
//! repairs (usually via `dedupe_then_enforce_unique`).

use crate::duck::Warehouse;
use crate::error::Result;

impl Warehouse {
    /// Returns (check name, offending row count) pairs; zero everywhere
    /// means a clean warehouse.
    pub fn integrity_checks(&self) -> Result<Vec<(&'static str, i64)>> {
        let checks: &[(&'static str, &str)] = &[
            (
                "unlinked instruments (quotes)",
                "SELECT count(*) FROM f_quote_l1 q
                   LEFT JOIN dim_instrument d USING (instrument_id)
                  WHERE d.instrument_id IS NULL",
            ),
            (
                "unlinked instruments (trades)",
                "SELECT count(*) FROM f_trade t
                   LEFT JOIN dim_instrument d USING (instrument_id)
                  WHERE d.instrument_id IS NULL",
            ),
            (
                "unlinked series (continuous quotes)",
                "SELECT count(*) FROM f_continuous_quote_l1 q
                   LEFT JOIN dim_continuous_contract c USING (contract_series)
                  WHERE c.contract_series IS NULL",
            ),
            (
                "unlinked series (continuous daily bars)",
                "SELECT count(*) FROM g_continuous_bar_daily b
                   LEFT JOIN dim_continuous_contract c USING (contract_series)
                  WHERE c.contract_series IS NULL",
            ),
            (
                "duplicate keys (continuous daily bars)",
                "SELECT CAST(coalesce(sum(n - 1), 0) AS BIGINT) FROM (
                     SELECT count(*) AS n FROM g_continuous_bar_daily
                      GROUP BY trading_date, contract_series
                 ) WHERE n > 1",
            ),
            (
                "duplicate keys (quotes)",
                "SELECT CAST(coalesce(sum(n - 1), 0) AS BIGINT) FROM (
                     SELECT count(*) AS n FROM f_quote_l1
                      GROUP BY ts_event, instrument_id
                 ) WHERE n > 1",
            ),
        ];

        let mut out = Vec::with_capacity(checks.len());
        for (name, sql) in checks {
            let n: i64 = self.conn.query_row(sql, [], |r| r.get(0))?;
            out.push((*name, n));
        }
        Ok(out)
    }
}
