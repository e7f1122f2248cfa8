use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Policy for switching the active instrument as expiry approaches.
///
/// The triple (root, rank, rule) is the canonical in-memory identity of a
/// continuous series; the string key is only its storage encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollRule {
    /// Roll `days` trading days before the active contract's expiry.
    CalendarPreExpiry { days: u32 },
    /// Roll when the next contract out-trades the current one.
    VolumeCrossover,
}

impl RollRule {
    /// Encoded tag used inside contract_series keys: `CALENDAR_2D`, `VOLUME`.
    pub fn tag(&self) -> String {
        match self {
            RollRule::CalendarPreExpiry { days } => format!("CALENDAR_{days}D"),
            RollRule::VolumeCrossover => "VOLUME".to_string(),
        }
    }

    pub fn parse_tag(tag: &str) -> Option<RollRule> {
        if tag == "VOLUME" {
            return Some(RollRule::VolumeCrossover);
        }
        let rest = tag.strip_prefix("CALENDAR_")?;
        let days = rest.strip_suffix('D')?.parse().ok()?;
        Some(RollRule::CalendarPreExpiry { days })
    }
}

impl fmt::Display for RollRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("invalid root symbol {root:?}: must be non-empty, ascii alphanumeric")]
    InvalidRoot { root: String },
    #[error("unparseable contract_series key {key:?}")]
    BadKey { key: String },
    #[error("contract_series collision: {key:?} produced by {first:?} and {second:?}")]
    AmbiguousCollision {
        key: String,
        first: Box<ContractSeries>,
        second: Box<ContractSeries>,
    },
}

/// Logical identity of a continuous series: (root, rank, roll_rule).
///
/// Serialized as `{ROOT}_{FRONT|RANK_n}_{RULE}`, e.g. `ES_FRONT_CALENDAR_2D`
/// or `NQ_RANK_1_VOLUME`. Encoding and decoding must stay bijective; root
/// symbols are therefore restricted to ascii alphanumerics (no underscore,
/// which is the key separator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractSeries {
    pub root: String,
    pub rank: u32,
    pub rule: RollRule,
}

impl ContractSeries {
    pub fn new(root: impl Into<String>, rank: u32, rule: RollRule) -> Result<Self, SeriesError> {
        let root = root.into();
        if root.is_empty() || !root.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(SeriesError::InvalidRoot { root });
        }
        Ok(Self { root, rank, rule })
    }

    /// Storage key, e.g. `ES_FRONT_CALENDAR_2D`.
    pub fn key(&self) -> String {
        let prefix = if self.rank == 0 {
            "FRONT".to_string()
        } else {
            format!("RANK_{}", self.rank)
        };
        format!("{}_{}_{}", self.root, prefix, self.rule.tag())
    }

    pub fn parse_key(key: &str) -> Result<Self, SeriesError> {
        let bad = || SeriesError::BadKey { key: key.to_string() };
        let (root, rest) = key.split_once('_').ok_or_else(bad)?;
        let (rank, tag) = if let Some(tag) = rest.strip_prefix("FRONT_") {
            (0u32, tag)
        } else if let Some(rest) = rest.strip_prefix("RANK_") {
            let (n, tag) = rest.split_once('_').ok_or_else(bad)?;
            (n.parse().map_err(|_| bad())?, tag)
        } else {
            return Err(bad());
        };
        let rule = RollRule::parse_tag(tag).ok_or_else(bad)?;
        ContractSeries::new(root, rank, rule).map_err(|_| bad())
    }
}

impl fmt::Display for ContractSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for ContractSeries {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractSeries::parse_key(s)
    }
}

/// Startup check: every configured series must encode to a distinct key and
/// every key must decode back to its source triple. A collision here means
/// two logical series would silently share warehouse rows, so ingestion for
/// the offending series must not proceed.
pub fn validate_bijective<'a>(
    series: impl IntoIterator<Item = &'a ContractSeries>,
) -> Result<(), SeriesError> {
    let mut seen: AHashMap<String, &ContractSeries> = AHashMap::new();
    for s in series {
        let key = s.key();
        let decoded = ContractSeries::parse_key(&key)?;
        if decoded != *s {
            return Err(SeriesError::AmbiguousCollision {
                key,
                first: Box::new(s.clone()),
                second: Box::new(decoded),
            });
        }
        if let Some(first) = seen.insert(key.clone(), s) {
            if first != s {
                return Err(SeriesError::AmbiguousCollision {
                    key,
                    first: Box::new(first.clone()),
                    second: Box::new(s.clone()),
                });
            }
        }
    }
    Ok(())
}
