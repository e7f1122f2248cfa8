//! Trading-session calendar.
//!
//! The calendar is derived from days that actually have data, never from a
//! Mon-Fri assumption or an exchange holiday file. Futures trade ~314
//! days/year including many Sundays; the ingested bars are the source of
//! truth for which days count.

use ahash::AHashSet;
use chrono::{Days, NaiveDate};

/// An ordered set of trading dates with trading-day arithmetic.
#[derive(Debug, Clone, Default)]
pub struct SessionCalendar {
    days: Vec<NaiveDate>,
    set: AHashSet<NaiveDate>,
}

impl SessionCalendar {
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let set: AHashSet<NaiveDate> = dates.into_iter().collect();
        let mut days: Vec<NaiveDate> = set.iter().copied().collect();
        days.sort_unstable();
        Self { days, set }
    }

    /// Every calendar day in [start, end], weekends included. Useful as a
    /// stand-in before any sessions have been ingested.
    pub fn all_days(start: NaiveDate, end: NaiveDate) -> Self {
        let mut days = Vec::new();
        let mut d = start;
        while d <= end {
            days.push(d);
            d = d.checked_add_days(Days::new(1)).expect("date overflow");
        }
        Self {
            set: days.iter().copied().collect(),
            days,
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.set.contains(&date)
    }

    /// Trading dates in [start, end], ascending.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        &self.days[lo..hi]
    }

    /// Latest trading date strictly before `date`, if any.
    pub fn prev_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.days.partition_point(|d| *d < date);
        idx.checked_sub(1).map(|i| self.days[i])
    }

    /// Number of trading days in (date, until], i.e. how many sessions
    /// remain strictly after `date` up to and including `until`. This is
    /// the "N trading days pre expiry" distance the calendar roll uses.
    pub fn trading_days_until(&self, date: NaiveDate, until: NaiveDate) -> usize {
        if until <= date {
            return 0;
        }
        let lo = self.days.partition_point(|d| *d <= date);
        let hi = self.days.partition_point(|d| *d <= until);
        hi.saturating_sub(lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_is_inclusive_and_sorted() {
        let cal = SessionCalendar::from_dates([d(2025, 1, 3), d(2025, 1, 1), d(2025, 1, 2)]);
        assert_eq!(cal.range(d(2025, 1, 2), d(2025, 1, 3)), &[d(2025, 1, 2), d(2025, 1, 3)]);
        assert_eq!(cal.range(d(2025, 1, 4), d(2025, 1, 9)), &[] as &[NaiveDate]);
    }

    #[test]
    fn prev_trading_day_skips_gaps() {
        // gap over a weekend: Fri 17th then Mon 20th
        let cal = SessionCalendar::from_dates([d(2025, 1, 17), d(2025, 1, 20)]);
        assert_eq!(cal.prev_trading_day(d(2025, 1, 20)), Some(d(2025, 1, 17)));
        assert_eq!(cal.prev_trading_day(d(2025, 1, 17)), None);
    }

    #[test]
    fn trading_days_until_counts_sessions_not_calendar_days() {
        let cal = SessionCalendar::from_dates([
            d(2025, 3, 17),
            d(2025, 3, 18),
            d(2025, 3, 19),
            d(2025, 3, 20),
            d(2025, 3, 21),
        ]);
        // from the 18th to expiry on the 21st: 19, 20, 21 -> 3 sessions
        assert_eq!(cal.trading_days_until(d(2025, 3, 18), d(2025, 3, 21)), 3);
        assert_eq!(cal.trading_days_until(d(2025, 3, 21), d(2025, 3, 21)), 0);
        // dates not in the calendar still count sessions strictly between
        assert_eq!(cal.trading_days_until(d(2025, 3, 15), d(2025, 3, 18)), 2);
    }

    #[test]
    fn dedupes_input() {
        let cal = SessionCalendar::from_dates([d(2025, 1, 1), d(2025, 1, 1)]);
        assert_eq!(cal.len(), 1);
    }
}
