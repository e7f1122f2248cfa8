//! Continuous-series construction: resolve the active contract per trading
//! date and lift its raw daily bar into the logical series.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::SessionCalendar;
use crate::instruments::CatalogSnapshot;
use crate::roll::{RollError, RollResolver, VolumeSource};
use crate::series::ContractSeries;

/// Raw per-expiry daily bar as materialized by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Read access to the raw daily-bar fact store. The warehouse implements
/// this; tests use in-memory fixtures.
pub trait DailyBarSource {
    fn daily_bar(&self, instrument_id: i64, date: NaiveDate) -> Option<DailyBar>;
}

/// Adapter: a daily-bar store doubles as the resolver's volume source:
/// observed trade volume for a date is the raw bar's volume.
pub struct BarVolume<'a, S>(pub &'a S);

impl<S: DailyBarSource> VolumeSource for BarVolume<'_, S> {
    fn volume_on(&self, instrument_id: i64, date: NaiveDate) -> Option<i64> {
        self.0.daily_bar(instrument_id, date).map(|b| b.volume)
    }
}

/// One row of a continuous series: the active contract's bar for the day,
/// with the contract id kept for traceability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousBar {
    pub trading_date: NaiveDate,
    pub series: ContractSeries,
    pub underlying_instrument_id: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

pub struct SeriesBuilder<'a, S: DailyBarSource> {
    catalog: &'a CatalogSnapshot,
    calendar: &'a SessionCalendar,
    bars: &'a S,
}

impl<'a, S: DailyBarSource> SeriesBuilder<'a, S> {
    pub fn new(catalog: &'a CatalogSnapshot, calendar: &'a SessionCalendar, bars: &'a S) -> Self {
        Self { catalog, calendar, bars }
    }

    /// Lazy bar sequence for `series` over [start, end]; one bar per
    /// trading date where the series is active and its contract has data.
    ///
    /// Gaps are explicit absence: a date where the series is NotActive, or
    /// where the active contract has no raw bar (holiday, provider outage),
    /// yields nothing, never a zero-filled or partial row. Catalog
    /// staleness on individual dates is logged and skipped so the rest of
    /// the range proceeds.
    ///
    /// Output is a pure function of (catalog, calendar, raw store, inputs),
    /// so overlapping re-runs are safe and, combined with the merge layer,
    /// idempotent.
    pub fn bars<'s>(
        &'s self,
        series: &'s ContractSeries,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = ContinuousBar> + 's {
        self.calendar.range(start, end).iter().filter_map(move |&date| {
            let volumes = BarVolume(self.bars);
            let resolver = RollResolver::new(self.catalog, self.calendar, &volumes);
            let resolved = match resolver.resolve(&series.root, series.rank, series.rule, date) {
                Ok(r) => r,
                Err(RollError::StaleCatalog { .. }) => {
                    warn!(root = %series.root, %date, "catalog stale; skipping date");
                    None
                }
            };
            let instrument_id = resolved?;
            let bar = self.bars.daily_bar(instrument_id, date)?;
            Some(ContinuousBar {
                trading_date: date,
                series: series.clone(),
                underlying_instrument_id: instrument_id,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
        })
    }

    /// Collected form of [`SeriesBuilder::bars`].
    pub fn build(
        &self,
        series: &ContractSeries,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<ContinuousBar> {
        self.bars(series, start, end).collect()
    }
}

/// Split [start, end] into calendar-month chunks. Long builds merge one
/// chunk at a time so a mid-range failure only costs the remaining chunks.
pub fn month_chunks(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut out = Vec::new();
    let mut lo = start;
    while lo <= end {
        let (y, m) = if lo.month() == 12 {
            (lo.year() + 1, 1)
        } else {
            (lo.year(), lo.month() + 1)
        };
        let next_month = NaiveDate::from_ymd_opt(y, m, 1).expect("valid month start");
        let hi = next_month
            .checked_sub_days(Days::new(1))
            .expect("valid month end")
            .min(end);
        out.push((lo, hi));
        lo = next_month;
    }
    out
}
