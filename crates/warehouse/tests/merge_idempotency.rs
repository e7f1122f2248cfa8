//! Merge-layer invariants against an in-memory warehouse: batch atomicity,
//! replace-on-conflict, duplicate repair.

use chrono::NaiveDate;

use continuous::{ContinuousBar, ContractSeries, RollRule};
use warehouse::{FutDailyBarRow, TradeRow, Warehouse, WarehouseError};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn series() -> ContractSeries {
    ContractSeries::new("ES", 0, RollRule::CalendarPreExpiry { days: 2 }).unwrap()
}

fn bar(date: NaiveDate, close: f64) -> ContinuousBar {
    ContinuousBar {
        trading_date: date,
        series: series(),
        underlying_instrument_id: 101,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1_000,
    }
}

#[test]
fn remerge_of_identical_content_is_a_noop_in_effect() {
    let wh = Warehouse::open_in_memory().unwrap();
    let bars = vec![bar(d(2025, 1, 2), 5000.0), bar(d(2025, 1, 3), 5010.0)];

    let first = wh.merge_continuous_bars(&bars).unwrap();
    assert_eq!((first.inserted, first.replaced), (2, 0));

    let second = wh.merge_continuous_bars(&bars).unwrap();
    assert_eq!((second.inserted, second.replaced), (0, 2));

    let dates = wh.existing_daily_dates("ES_FRONT_CALENDAR_2D").unwrap();
    assert_eq!(dates, vec![d(2025, 1, 2), d(2025, 1, 3)]);
}

#[test]
fn sequential_remerge_keeps_second_value() {
    let wh = Warehouse::open_in_memory().unwrap();
    wh.merge_continuous_bars(&[bar(d(2025, 1, 1), 5000.0)]).unwrap();
    wh.merge_continuous_bars(&[bar(d(2025, 1, 1), 5005.0)]).unwrap();

    let close: f64 = wh
        .conn()
        .query_row(
            "SELECT close FROM g_continuous_bar_daily
              WHERE trading_date = DATE '2025-01-01' AND contract_series = 'ES_FRONT_CALENDAR_2D'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(close, 5005.0);

    let n: i64 = wh
        .conn()
        .query_row("SELECT count(*) FROM g_continuous_bar_daily", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 1);
}

#[test]
fn conflicting_rows_in_one_batch_reject_the_whole_batch() {
    let wh = Warehouse::open_in_memory().unwrap();
    let batch = vec![bar(d(2025, 1, 1), 5000.0), bar(d(2025, 1, 1), 4999.0)];

    let err = wh.merge_continuous_bars(&batch).unwrap_err();
    match err {
        WarehouseError::Merge(warehouse::MergeError::PartialBatchFailure { keys, .. }) => {
            assert_eq!(keys, vec!["2025-01-01|ES_FRONT_CALENDAR_2D".to_string()]);
        }
        other => panic!("unexpected: {other:?}"),
    }

    // atomic: nothing was applied
    let n: i64 = wh
        .conn()
        .query_row("SELECT count(*) FROM g_continuous_bar_daily", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 0);
}

#[test]
fn one_bad_row_rejects_the_batch_and_reports_every_key() {
    let wh = Warehouse::open_in_memory().unwrap();
    let mut nan = bar(d(2025, 1, 2), 5000.0);
    nan.close = f64::NAN;
    let mut inf = bar(d(2025, 1, 3), 5000.0);
    inf.high = f64::INFINITY;
    let batch = vec![bar(d(2025, 1, 1), 5000.0), nan, inf];

    let err = wh.merge_continuous_bars(&batch).unwrap_err();
    match err {
        WarehouseError::Merge(warehouse::MergeError::PartialBatchFailure { keys, .. }) => {
            assert_eq!(
                keys,
                vec![
                    "2025-01-02|ES_FRONT_CALENDAR_2D".to_string(),
                    "2025-01-03|ES_FRONT_CALENDAR_2D".to_string(),
                ]
            );
        }
        other => panic!("unexpected: {other:?}"),
    }
    let n: i64 = wh
        .conn()
        .query_row("SELECT count(*) FROM g_continuous_bar_daily", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 0, "good rows from a rejected batch must not land");
}

#[test]
fn exact_duplicates_within_a_batch_collapse() {
    let wh = Warehouse::open_in_memory().unwrap();
    let batch = vec![bar(d(2025, 1, 1), 5000.0), bar(d(2025, 1, 1), 5000.0)];
    let out = wh.merge_continuous_bars(&batch).unwrap();
    assert_eq!((out.inserted, out.replaced), (1, 0));
}

#[test]
fn raw_daily_bars_merge_by_date_and_instrument() {
    let wh = Warehouse::open_in_memory().unwrap();
    let rows = vec![
        FutDailyBarRow {
            trading_date: d(2025, 1, 2),
            instrument_id: 101,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10,
        },
        FutDailyBarRow {
            trading_date: d(2025, 1, 2),
            instrument_id: 102,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.6,
            volume: 20,
        },
    ];
    let first = wh.merge_daily_bars(&rows).unwrap();
    assert_eq!((first.inserted, first.replaced), (2, 0));
    let again = wh.merge_daily_bars(&rows).unwrap();
    assert_eq!((again.inserted, again.replaced), (0, 2));

    let got = wh.raw_daily_bar(102, d(2025, 1, 2)).unwrap().unwrap();
    assert_eq!(got.close, 1.6);
    assert!(wh.raw_daily_bar(103, d(2025, 1, 2)).unwrap().is_none());
}

#[test]
fn dedupe_then_enforce_unique_keeps_lexicographically_first() {
    let wh = Warehouse::open_in_memory().unwrap();
    // f_trade has no natural key, so it is the one place duplicates can
    // accumulate; seed some and repair.
    let t = |px: f64, aggressor: &str| TradeRow {
        ts_event_us: 1_000_000,
        ts_rcv_us: 1_000_100,
        instrument_id: 101,
        last_px: px,
        last_sz: 2.0,
        aggressor: Some(aggressor.to_string()),
    };
    wh.append_trades(&[t(100.0, "B"), t(100.0, "B"), t(100.0, "A")]).unwrap();

    let removed = wh
        .dedupe_then_enforce_unique("f_trade", &["ts_event", "instrument_id", "last_px", "last_sz"])
        .unwrap();
    assert_eq!(removed, 2);

    let (n, aggressor): (i64, String) = wh
        .conn()
        .query_row(
            "SELECT count(*) OVER (), aggressor FROM f_trade LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(n, 1);
    // ordering over the full column list is lexicographic; 'A' < 'B'
    assert_eq!(aggressor, "A");
}
