use std::path::Path;

use duckdb::{params, Config, Connection};
use tracing::info;

use crate::error::{Result, WarehouseError};
use crate::schema::MIGRATIONS;

/// Handle to the embedded analytical store.
///
/// Single-writer by design: one ingestion process holds a writable handle
/// at a time, readers open read-only without coordination. All mutation
/// goes through serialized transactions on this connection.
pub struct Warehouse {
    pub(crate) conn: Connection,
}

impl Warehouse {
    /// Open (or create) a file-backed warehouse and apply pending
    /// migrations.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let wh = Self { conn };
        wh.migrate()?;
        Ok(wh)
    }

    /// In-memory warehouse, mostly for tests and one-off audits.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let wh = Self { conn };
        wh.migrate()?;
        Ok(wh)
    }

    /// Read-only handle for concurrent audits/queries; never migrates.
    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let config = Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(db_path, config)?;
        Ok(Self { conn })
    }

    /// Apply embedded migrations not yet recorded in `_migrations`.
    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id          TEXT PRIMARY KEY,
                applied_at  TIMESTAMP DEFAULT current_timestamp
            );
            "#,
        )?;
        for (id, sql) in MIGRATIONS {
            let applied: i64 = self.conn.query_row(
                "SELECT count(*) FROM _migrations WHERE id = ?",
                params![id],
                |r| r.get(0),
            )?;
            if applied > 0 {
                continue;
            }
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("INSERT INTO _migrations(id) VALUES (?)", params![id])?;
            info!(migration = id, "applied");
        }
        Ok(())
    }

    /// Run `f` inside a single transaction; rolled back on any error.
    /// The merge layer uses this for batch atomicity: either every row in
    /// a batch lands or none do.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match f(&self.conn) {
            Ok(v) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(v)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Row count of an internal table. Table names come from callers in
    /// this crate, never from user input.
    pub(crate) fn count(&self, table: &str) -> Result<i64> {
        self.conn
            .query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
            .map_err(WarehouseError::from)
    }
}
