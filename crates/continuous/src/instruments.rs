use ahash::AHashMap;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::symbols::{imm_expiry, parse_native_symbol};

/// Static facts for a single dated contract (no runtime state).
/// Definitions are upserted by instrument_id; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: i64,
    pub root: String,
    pub expiry: NaiveDate,
    pub tick_size: f64,
    pub multiplier: f64,
    pub native_symbol: String,
}

/// A raw instrument definition as delivered by the upstream collaborator.
/// `expiry` may be absent; the catalog backfills it from the native symbol
/// (IMM convention) when it can.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDef {
    pub instrument_id: i64,
    pub root: Option<String>,
    pub expiry: Option<NaiveDate>,
    pub tick_size: Option<f64>,
    pub multiplier: Option<f64>,
    pub native_symbol: String,
}

impl InstrumentDef {
    /// Resolve the definition into a full instrument, parsing the native
    /// symbol for anything the feed left out. Returns `None` when neither
    /// the definition nor the symbol yields an expiry.
    pub fn resolve(&self) -> Option<Instrument> {
        let parsed = parse_native_symbol(&self.native_symbol);
        let root = match (&self.root, &parsed) {
            (Some(r), _) => r.clone(),
            (None, Some(p)) => p.root.clone(),
            (None, None) => return None,
        };
        let expiry = match (self.expiry, &parsed) {
            (Some(e), _) => e,
            (None, Some(p)) => imm_expiry(p)?,
            (None, None) => return None,
        };
        Some(Instrument {
            instrument_id: self.instrument_id,
            root,
            expiry,
            tick_size: self.tick_size.unwrap_or(0.25),
            multiplier: self.multiplier.unwrap_or(50.0),
            native_symbol: self.native_symbol.clone(),
        })
    }
}

/// Point-in-time snapshot of every known instrument, keyed by
/// instrument_id with a per-root index ordered by (expiry, instrument_id).
///
/// The snapshot is the resolver's whole world: resolution is a pure
/// function of (snapshot, date), so refreshing the catalog mid-run can
/// never leave a stale "current contract" pointer behind.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    by_id: AHashMap<i64, Instrument>,
    by_root: AHashMap<String, Vec<i64>>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let mut snap = Self::new();
        for inst in instruments {
            snap.upsert(inst);
        }
        snap
    }

    /// Insert or replace a definition. Last write wins per instrument_id.
    pub fn upsert(&mut self, inst: Instrument) {
        let root = inst.root.clone();
        let id = inst.instrument_id;
        if let Some(prev) = self.by_id.insert(id, inst) {
            if let Some(ids) = self.by_root.get_mut(&prev.root) {
                ids.retain(|i| *i != id);
            }
        }
        let ids = self.by_root.entry(root).or_default();
        ids.push(id);
        ids.sort_by_key(|i| {
            let inst = &self.by_id[i];
            (inst.expiry, inst.instrument_id)
        });
    }

    pub fn get(&self, instrument_id: i64) -> Option<&Instrument> {
        self.by_id.get(&instrument_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All instruments for a root, ordered by (expiry, instrument_id).
    pub fn for_root(&self, root: &str) -> impl Iterator<Item = &Instrument> {
        self.by_root
            .get(root)
            .into_iter()
            .flatten()
            .map(|id| &self.by_id[id])
    }

    /// Instruments for a root not yet expired at `date` (expiry >= date),
    /// still in (expiry, instrument_id) order.
    pub fn unexpired(&self, root: &str, date: NaiveDate) -> impl Iterator<Item = &Instrument> {
        self.for_root(root).filter(move |i| i.expiry >= date)
    }

    /// True when the root is known but every contract expired before `date`.
    pub fn is_stale_for(&self, root: &str, date: NaiveDate) -> bool {
        let mut any = false;
        for inst in self.for_root(root) {
            any = true;
            if inst.expiry >= date {
                return false;
            }
        }
        any
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.by_root.keys().map(String::as_str)
    }
}
