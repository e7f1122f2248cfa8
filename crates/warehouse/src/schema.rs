//! Embedded schema migrations, applied in order by [`crate::duck::Warehouse::migrate`].
//! Each entry runs at most once; the `_migrations` ledger records what has
//! been applied. Keys here are stable and bit-exact: downstream readers
//! depend on them.

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_dimensions",
        r#"
        CREATE TABLE IF NOT EXISTS dim_instrument (
            instrument_id  BIGINT PRIMARY KEY,
            root           TEXT NOT NULL,
            expiry         DATE NOT NULL,
            tick_size      DOUBLE NOT NULL,
            multiplier     DOUBLE NOT NULL,
            native_symbol  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dim_continuous_contract (
            contract_series    TEXT PRIMARY KEY,
            root               TEXT NOT NULL,
            rank               INTEGER NOT NULL,
            roll_rule          TEXT NOT NULL,
            adjustment_method  TEXT NOT NULL,
            description        TEXT
        );

        CREATE TABLE IF NOT EXISTS dim_canonical_series (
            root             TEXT PRIMARY KEY,
            contract_series  TEXT NOT NULL,
            description      TEXT,
            optional         BOOLEAN NOT NULL DEFAULT FALSE
        );

        CREATE TABLE IF NOT EXISTS dim_roll_dates (
            contract_series    TEXT NOT NULL,
            rank               INTEGER NOT NULL,
            roll_date          DATE NOT NULL,
            old_instrument_id  BIGINT NOT NULL,
            new_instrument_id  BIGINT NOT NULL,
            old_native_symbol  TEXT,
            new_native_symbol  TEXT,
            old_expiry         DATE,
            new_expiry         DATE,
            PRIMARY KEY (contract_series, rank, roll_date)
        );

        CREATE TABLE IF NOT EXISTS dim_session (
            trade_date  DATE PRIMARY KEY,
            week        INTEGER NOT NULL,
            month       INTEGER NOT NULL,
            quarter     INTEGER NOT NULL,
            is_holiday  BOOLEAN NOT NULL DEFAULT FALSE
        );
        "#,
    ),
    (
        "0002_facts",
        r#"
        CREATE TABLE IF NOT EXISTS f_quote_l1 (
            ts_event       TIMESTAMP NOT NULL,
            ts_rcv         TIMESTAMP NOT NULL,
            instrument_id  BIGINT NOT NULL,
            bid_px         DOUBLE,
            bid_sz         DOUBLE,
            ask_px         DOUBLE,
            ask_sz         DOUBLE,
            PRIMARY KEY (ts_event, instrument_id)
        );

        -- Trades are append-only: two identical prints are two trades, so
        -- there is no natural key to enforce here.
        CREATE TABLE IF NOT EXISTS f_trade (
            ts_event       TIMESTAMP NOT NULL,
            ts_rcv         TIMESTAMP NOT NULL,
            instrument_id  BIGINT NOT NULL,
            last_px        DOUBLE NOT NULL,
            last_sz        DOUBLE NOT NULL,
            aggressor      TEXT
        );

        CREATE TABLE IF NOT EXISTS f_continuous_quote_l1 (
            ts_event                  TIMESTAMP NOT NULL,
            ts_rcv                    TIMESTAMP NOT NULL,
            contract_series           TEXT NOT NULL,
            underlying_instrument_id  BIGINT NOT NULL,
            bid_px                    DOUBLE,
            bid_sz                    DOUBLE,
            ask_px                    DOUBLE,
            ask_sz                    DOUBLE,
            PRIMARY KEY (ts_event, contract_series, underlying_instrument_id)
        );

        CREATE TABLE IF NOT EXISTS f_fut_bar_daily (
            trading_date   DATE NOT NULL,
            instrument_id  BIGINT NOT NULL,
            open           DOUBLE NOT NULL,
            high           DOUBLE NOT NULL,
            low            DOUBLE NOT NULL,
            close          DOUBLE NOT NULL,
            volume         BIGINT NOT NULL,
            PRIMARY KEY (trading_date, instrument_id)
        );
        "#,
    ),
    (
        "0003_gold",
        r#"
        CREATE TABLE IF NOT EXISTS g_continuous_bar_daily (
            trading_date              DATE NOT NULL,
            contract_series           TEXT NOT NULL,
            underlying_instrument_id  BIGINT NOT NULL,
            open                      DOUBLE NOT NULL,
            high                      DOUBLE NOT NULL,
            low                       DOUBLE NOT NULL,
            close                     DOUBLE NOT NULL,
            volume                    BIGINT NOT NULL,
            PRIMARY KEY (trading_date, contract_series)
        );

        CREATE TABLE IF NOT EXISTS g_bar_1m (
            bucket_start   TIMESTAMP NOT NULL,
            instrument_id  BIGINT NOT NULL,
            open           DOUBLE NOT NULL,
            high           DOUBLE NOT NULL,
            low            DOUBLE NOT NULL,
            close          DOUBLE NOT NULL,
            volume         DOUBLE NOT NULL,
            notional       DOUBLE NOT NULL,
            PRIMARY KEY (bucket_start, instrument_id)
        );
        "#,
    ),
    (
        "0004_canonical_view",
        r#"
        CREATE OR REPLACE VIEW v_canonical_bar_daily AS
        SELECT
            c.root,
            b.trading_date,
            b.contract_series,
            b.underlying_instrument_id,
            b.open, b.high, b.low, b.close, b.volume
        FROM dim_canonical_series c
        JOIN g_continuous_bar_daily b USING (contract_series);
        "#,
    ),
];
