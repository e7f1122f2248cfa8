//! Storage-facing row shapes. Prices and sizes are f64 on disk (DOUBLE
//! columns); event timestamps cross the boundary as UTC epoch microseconds
//! to match DuckDB's native TIMESTAMP resolution.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteRow {
    pub ts_event_us: i64,
    pub ts_rcv_us: i64,
    pub instrument_id: i64,
    pub bid_px: f64,
    pub bid_sz: f64,
    pub ask_px: f64,
    pub ask_sz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRow {
    pub ts_event_us: i64,
    pub ts_rcv_us: i64,
    pub instrument_id: i64,
    pub last_px: f64,
    pub last_sz: f64,
    pub aggressor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousQuoteRow {
    pub ts_event_us: i64,
    pub ts_rcv_us: i64,
    pub contract_series: String,
    pub underlying_instrument_id: i64,
    pub bid_px: f64,
    pub bid_sz: f64,
    pub ask_px: f64,
    pub ask_sz: f64,
}

/// Raw per-expiry daily bar as ingested (the series builder's input).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FutDailyBarRow {
    pub trading_date: NaiveDate,
    pub instrument_id: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Coverage metrics for one candidate series of a root (audit output).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub root: String,
    pub contract_series: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub row_count: i64,
    pub coverage_years: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRow {
    pub root: String,
    pub contract_series: String,
    pub description: Option<String>,
    pub optional: bool,
}

/// One row of the canonical read view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalBarRow {
    pub root: String,
    pub trading_date: NaiveDate,
    pub contract_series: String,
    pub underlying_instrument_id: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Counts reported by one merge batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: u64,
    pub replaced: u64,
}

impl MergeOutcome {
    pub fn total(&self) -> u64 {
        self.inserted + self.replaced
    }

    pub fn add(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
    }
}
