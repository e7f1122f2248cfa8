//! Roll resolution: which dated contract backs a continuous series on a
//! given day.
//!
//! Resolution is a pure function of (catalog snapshot, session calendar,
//! volume source, date). There is no cached "current contract" pointer to
//! go stale when the catalog refreshes mid-run; callers re-resolve per date.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::calendar::SessionCalendar;
use crate::instruments::CatalogSnapshot;
use crate::series::{ContractSeries, RollRule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RollError {
    /// Every listed contract for the root expired before the requested
    /// date. Distinct from NotActive so callers can tell "universe
    /// exhausted, refresh the catalog" from "data not yet loaded".
    #[error("stale catalog for root {root}: all contracts expired before {date}")]
    StaleCatalog { root: String, date: NaiveDate },
}

/// Observed trade volume per (instrument, date). The resolver only needs
/// this for volume-crossover rules; calendar rules never consult it.
pub trait VolumeSource {
    fn volume_on(&self, instrument_id: i64, date: NaiveDate) -> Option<i64>;
}

/// A volume source with no data; every lookup falls back to calendar
/// ordering. Adequate for calendar-rule-only universes.
pub struct NoVolume;

impl VolumeSource for NoVolume {
    fn volume_on(&self, _instrument_id: i64, _date: NaiveDate) -> Option<i64> {
        None
    }
}

/// One detected transition of a series' active instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollEvent {
    pub series: ContractSeries,
    pub roll_date: NaiveDate,
    pub old_instrument_id: i64,
    pub new_instrument_id: i64,
}

pub struct RollResolver<'a, V: VolumeSource> {
    catalog: &'a CatalogSnapshot,
    calendar: &'a SessionCalendar,
    volumes: &'a V,
}

impl<'a, V: VolumeSource> RollResolver<'a, V> {
    pub fn new(catalog: &'a CatalogSnapshot, calendar: &'a SessionCalendar, volumes: &'a V) -> Self {
        Self { catalog, calendar, volumes }
    }

    /// Active instrument for (root, rank, rule) on `date`.
    ///
    /// `Ok(None)` (NotActive) means fewer than rank+1 contracts with
    /// expiry >= date are listed. A root whose every contract is already
    /// expired errors with [`RollError::StaleCatalog`] instead.
    pub fn resolve(
        &self,
        root: &str,
        rank: u32,
        rule: RollRule,
        date: NaiveDate,
    ) -> Result<Option<i64>, RollError> {
        if self.catalog.is_stale_for(root, date) {
            return Err(RollError::StaleCatalog { root: root.to_string(), date });
        }

        let curve: Vec<&crate::instruments::Instrument> =
            self.catalog.unexpired(root, date).collect();
        let rank = rank as usize;
        if curve.len() < rank + 1 {
            return Ok(None);
        }

        let id = match rule {
            RollRule::CalendarPreExpiry { days } => {
                // Contracts inside the roll window form a prefix of the
                // expiry-ordered curve; skip them and index by rank. When
                // the window reaches the end of the listed curve there is
                // nothing further to roll into, so the tail contracts stay
                // active.
                let in_window = curve
                    .iter()
                    .take_while(|i| {
                        self.calendar.trading_days_until(date, i.expiry) <= days as usize
                    })
                    .count();
                let skip = in_window.min(curve.len() - (rank + 1));
                curve[skip + rank].instrument_id
            }
            RollRule::VolumeCrossover => {
                let front = self.volume_front(root, &curve, date);
                if rank == 0 {
                    front
                } else {
                    // Expiry order among what lower ranks did not claim.
                    match curve
                        .iter()
                        .filter(|i| i.instrument_id != front)
                        .nth(rank - 1)
                    {
                        Some(i) => i.instrument_id,
                        None => return Ok(None),
                    }
                }
            }
        };
        Ok(Some(id))
    }

    /// Rank-0 pick under volume crossover: whichever of the two
    /// nearest-dated contracts printed more volume on `date`. Missing
    /// volume on either side degrades to calendar ordering, logged so
    /// degraded selections are observable downstream.
    fn volume_front(
        &self,
        root: &str,
        curve: &[&crate::instruments::Instrument],
        date: NaiveDate,
    ) -> i64 {
        let near = curve[0];
        let Some(next) = curve.get(1) else {
            return near.instrument_id;
        };
        match (
            self.volumes.volume_on(near.instrument_id, date),
            self.volumes.volume_on(next.instrument_id, date),
        ) {
            (Some(v_near), Some(v_next)) => {
                if v_next > v_near {
                    next.instrument_id
                } else {
                    near.instrument_id
                }
            }
            _ => {
                warn!(
                    root,
                    %date,
                    near = near.instrument_id,
                    next = next.instrument_id,
                    "volume missing for crossover; degraded to calendar ordering"
                );
                near.instrument_id
            }
        }
    }

    /// Compare resolution on `date` against the previous trading day and
    /// emit a roll event when the active instrument changed. Days where
    /// either side is NotActive produce no event.
    pub fn detect_roll(
        &self,
        series: &ContractSeries,
        date: NaiveDate,
    ) -> Result<Option<RollEvent>, RollError> {
        let Some(prev_day) = self.calendar.prev_trading_day(date) else {
            return Ok(None);
        };
        let today = self.resolve(&series.root, series.rank, series.rule, date)?;
        let before = self.resolve(&series.root, series.rank, series.rule, prev_day)?;
        match (before, today) {
            (Some(old), Some(new)) if old != new => Ok(Some(RollEvent {
                series: series.clone(),
                roll_date: date,
                old_instrument_id: old,
                new_instrument_id: new,
            })),
            _ => Ok(None),
        }
    }

    /// All roll events for a series across [start, end], one per detected
    /// transition, ascending by date.
    pub fn roll_events(
        &self,
        series: &ContractSeries,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RollEvent>, RollError> {
        let mut out = Vec::new();
        for &date in self.calendar.range(start, end) {
            if let Some(ev) = self.detect_roll(series, date)? {
                out.push(ev);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::Instrument;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn inst(id: i64, root: &str, expiry: NaiveDate) -> Instrument {
        Instrument {
            instrument_id: id,
            root: root.into(),
            expiry,
            tick_size: 0.25,
            multiplier: 50.0,
            native_symbol: format!("{root}{id}"),
        }
    }

    fn es_catalog() -> CatalogSnapshot {
        CatalogSnapshot::from_instruments([
            inst(101, "ES", d(2025, 3, 21)),
            inst(102, "ES", d(2025, 6, 20)),
        ])
    }

    fn march_calendar() -> SessionCalendar {
        // every weekday of March 2025
        SessionCalendar::from_dates(
            (1..=31)
                .filter_map(|day| NaiveDate::from_ymd_opt(2025, 3, day))
                .filter(|dt| {
                    use chrono::Datelike;
                    dt.weekday().number_from_monday() <= 5
                }),
        )
    }

    const CAL_2D: RollRule = RollRule::CalendarPreExpiry { days: 2 };

    #[test]
    fn rolls_two_trading_days_before_expiry() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);

        // 2025-03-18: three sessions remain to the Mar-21 expiry -> March.
        assert_eq!(r.resolve("ES", 0, CAL_2D, d(2025, 3, 18)).unwrap(), Some(101));
        // 2025-03-19: two sessions remain -> rolled to June.
        assert_eq!(r.resolve("ES", 0, CAL_2D, d(2025, 3, 19)).unwrap(), Some(102));
    }

    #[test]
    fn rank_one_rides_ahead_of_the_roll() {
        let catalog = CatalogSnapshot::from_instruments([
            inst(101, "ES", d(2025, 3, 21)),
            inst(102, "ES", d(2025, 6, 20)),
            inst(103, "ES", d(2025, 9, 19)),
        ]);
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);

        assert_eq!(r.resolve("ES", 1, CAL_2D, d(2025, 3, 18)).unwrap(), Some(102));
        // front rolled to June, so rank 1 moves out to September
        assert_eq!(r.resolve("ES", 1, CAL_2D, d(2025, 3, 19)).unwrap(), Some(103));
    }

    #[test]
    fn not_active_when_curve_too_short() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        assert_eq!(r.resolve("ES", 2, CAL_2D, d(2025, 3, 3)).unwrap(), None);
        // unknown root: nothing listed at all
        assert_eq!(r.resolve("NQ", 0, CAL_2D, d(2025, 3, 3)).unwrap(), None);
    }

    #[test]
    fn exhausted_curve_keeps_last_contract_active() {
        // Only one contract listed and it is inside the roll window:
        // nothing further out to roll into, so it stays active.
        let catalog = CatalogSnapshot::from_instruments([inst(101, "ES", d(2025, 3, 21))]);
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        assert_eq!(r.resolve("ES", 0, CAL_2D, d(2025, 3, 20)).unwrap(), Some(101));
    }

    #[test]
    fn stale_catalog_is_not_notactive() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        let err = r.resolve("ES", 0, CAL_2D, d(2025, 7, 1)).unwrap_err();
        assert_eq!(
            err,
            RollError::StaleCatalog { root: "ES".into(), date: d(2025, 7, 1) }
        );
    }

    #[test]
    fn resolve_is_pure() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        for _ in 0..3 {
            assert_eq!(r.resolve("ES", 0, CAL_2D, d(2025, 3, 10)).unwrap(), Some(101));
        }
    }

    struct FixedVolume(Vec<(i64, NaiveDate, i64)>);

    impl VolumeSource for FixedVolume {
        fn volume_on(&self, instrument_id: i64, date: NaiveDate) -> Option<i64> {
            self.0
                .iter()
                .find(|(id, dt, _)| *id == instrument_id && *dt == date)
                .map(|(_, _, v)| *v)
        }
    }

    #[test]
    fn volume_crossover_follows_the_prints() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let day = d(2025, 3, 10);
        let vols = FixedVolume(vec![(101, day, 1_000), (102, day, 5_000)]);
        let r = RollResolver::new(&catalog, &calendar, &vols);
        assert_eq!(
            r.resolve("ES", 0, RollRule::VolumeCrossover, day).unwrap(),
            Some(102)
        );
        // rank 1 takes the remaining nearest contract
        assert_eq!(
            r.resolve("ES", 1, RollRule::VolumeCrossover, day).unwrap(),
            Some(101)
        );
    }

    #[test]
    fn missing_volume_degrades_to_calendar_order() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        // never NotActive purely for missing volume
        assert_eq!(
            r.resolve("ES", 0, RollRule::VolumeCrossover, d(2025, 3, 10)).unwrap(),
            Some(101)
        );
    }

    #[test]
    fn volume_tie_prefers_nearer_expiry() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let day = d(2025, 3, 10);
        let vols = FixedVolume(vec![(101, day, 2_000), (102, day, 2_000)]);
        let r = RollResolver::new(&catalog, &calendar, &vols);
        assert_eq!(
            r.resolve("ES", 0, RollRule::VolumeCrossover, day).unwrap(),
            Some(101)
        );
    }

    #[test]
    fn detects_single_roll_event() {
        let catalog = es_catalog();
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        let series = ContractSeries::new("ES", 0, CAL_2D).unwrap();
        let events = r.roll_events(&series, d(2025, 3, 3), d(2025, 3, 28)).unwrap();
        assert_eq!(
            events,
            vec![RollEvent {
                series: series.clone(),
                roll_date: d(2025, 3, 19),
                old_instrument_id: 101,
                new_instrument_id: 102,
            }]
        );
    }

    #[test]
    fn calendar_rule_never_rolls_backward() {
        let catalog = CatalogSnapshot::from_instruments([
            inst(101, "ES", d(2025, 3, 21)),
            inst(102, "ES", d(2025, 6, 20)),
            inst(103, "ES", d(2025, 9, 19)),
        ]);
        let calendar = march_calendar();
        let r = RollResolver::new(&catalog, &calendar, &NoVolume);
        let mut last_expiry = None;
        for &date in calendar.range(d(2025, 3, 3), d(2025, 3, 21)) {
            let id = r.resolve("ES", 0, CAL_2D, date).unwrap().unwrap();
            let expiry = catalog.get(id).unwrap().expiry;
            if let Some(prev) = last_expiry {
                assert!(expiry >= prev, "rolled backward on {date}");
            }
            last_expiry = Some(expiry);
        }
    }
}
