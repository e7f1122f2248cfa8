use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum MergeError {
    /// The whole batch was rejected; nothing was written. Carries every
    /// offending key, not just the first, so the caller can repair the
    /// input in one pass.
    #[error("batch rejected for {table}: {} invalid key(s): [{}]", .keys.len(), .keys.join(", "))]
    PartialBatchFailure { table: &'static str, keys: Vec<String> },
    #[error("duckdb: {0}")]
    Duck(#[from] duckdb::Error),
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("duckdb: {0}")]
    Duck(#[from] duckdb::Error),
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// The canonical view found more than one row for a (root, date).
    /// Fatal at query time: silently deduplicated results would hide a
    /// configuration bug from every downstream consumer.
    #[error("canonical view ambiguous: {count} rows for ({root}, {date})")]
    CanonicalAmbiguity { root: String, date: NaiveDate, count: usize },
    #[error(transparent)]
    Series(#[from] continuous::SeriesError),
}
