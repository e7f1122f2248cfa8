//! Migration ledger and file-backed open/read-only behavior.

use tempfile::TempDir;
use warehouse::Warehouse;

#[test]
fn migrations_apply_once() {
    let wh = Warehouse::open_in_memory().unwrap();
    let applied: i64 = wh
        .conn()
        .query_row("SELECT count(*) FROM _migrations", [], |r| r.get(0))
        .unwrap();
    assert!(applied >= 4);

    // re-running is a no-op
    wh.migrate().unwrap();
    let again: i64 = wh
        .conn()
        .query_row("SELECT count(*) FROM _migrations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(applied, again);
}

#[test]
fn reopen_preserves_schema_and_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.duckdb");

    let applied = {
        let wh = Warehouse::open(&path).unwrap();
        wh.conn()
            .query_row::<i64, _, _>("SELECT count(*) FROM _migrations", [], |r| r.get(0))
            .unwrap()
    };

    let wh = Warehouse::open(&path).unwrap();
    let again: i64 = wh
        .conn()
        .query_row("SELECT count(*) FROM _migrations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(applied, again);
    assert_eq!(wh.canonical_for("ES").unwrap(), None);
}

#[test]
fn read_only_handle_can_query_but_not_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.duckdb");
    {
        let wh = Warehouse::open(&path).unwrap();
        wh.set_canonical("ES", "ES_FRONT_CALENDAR_2D", None, false).unwrap();
    }

    let ro = Warehouse::open_read_only(&path).unwrap();
    assert_eq!(
        ro.canonical_for("ES").unwrap().as_deref(),
        Some("ES_FRONT_CALENDAR_2D")
    );
    assert!(ro.set_canonical("ES", "ES_FRONT_VOLUME", None, false).is_err());
}

#[test]
fn table_counts_cover_the_whole_schema() {
    let wh = Warehouse::open_in_memory().unwrap();
    let counts = wh.table_counts().unwrap();
    assert!(counts.iter().any(|(t, _)| *t == "g_continuous_bar_daily"));
    assert!(counts.iter().all(|(_, n)| *n == 0));
}
