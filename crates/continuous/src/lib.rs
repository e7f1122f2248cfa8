//! Continuous-futures core: instrument catalog, session calendar, roll
//! resolution and continuous-series construction.
//!
//! Everything here is a stateless transformation over an in-memory catalog
//! snapshot; durable state lives in the warehouse crate.

pub mod builder;
pub mod calendar;
pub mod instruments;
pub mod roll;
pub mod series;
pub mod symbols;
pub mod universe;

pub use builder::{month_chunks, BarVolume, ContinuousBar, DailyBar, DailyBarSource, SeriesBuilder};
pub use calendar::SessionCalendar;
pub use instruments::{CatalogSnapshot, Instrument, InstrumentDef};
pub use roll::{NoVolume, RollError, RollEvent, RollResolver, VolumeSource};
pub use series::{validate_bijective, ContractSeries, RollRule, SeriesError};
pub use universe::{CanonicalConfig, ConfigError, RootUniverse, UniverseConfig};
