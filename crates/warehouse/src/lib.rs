//! Embedded DuckDB market warehouse.
//!
//! The warehouse is the sole durable owner of all market data; everything
//! in the `continuous` crate is a stateless transformation that reads and
//! upserts here. Single writer, serialized transactions, idempotent
//! merge-by-natural-key everywhere.

pub mod canonical;
pub mod duck;
pub mod error;
pub mod gold;
pub mod ingest;
pub mod merge;
pub mod models;
pub mod queries;
pub mod schema;
pub mod validate;

pub use duck::Warehouse;
pub use error::{MergeError, Result, WarehouseError};
pub use gold::{aggregate, Bucket, FactObs, GoldBar};
pub use models::{
    CanonicalBarRow, CanonicalRow, ContinuousQuoteRow, CoverageRow, FutDailyBarRow, MergeOutcome,
    QuoteRow, TradeRow,
};
