//! Universe configuration: which (root, ranks, roll rule) tuples the
//! system builds, and which series is canonical per root. Both are TOML
//! files: an enumerated mapping, not free-form code.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::series::{validate_bijective, ContractSeries, RollRule, SeriesError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid toml in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("root {root}: unsupported roll rule {rule:?} (expected e.g. \"calendar-2d\" or \"volume\")")]
    BadRollRule { root: String, rule: String },
    #[error("root {root}: invalid ranks spec {spec:?}")]
    BadRanks { root: String, spec: String },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Ranks accept an integer, a list, or a compact range string ("0-3,5").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RanksSpec {
    One(u32),
    Many(Vec<u32>),
    Text(String),
}

impl RanksSpec {
    fn expand(&self, root: &str) -> Result<Vec<u32>, ConfigError> {
        let bad = |spec: &str| ConfigError::BadRanks { root: root.to_string(), spec: spec.to_string() };
        let mut ranks = match self {
            RanksSpec::One(r) => vec![*r],
            RanksSpec::Many(rs) => rs.clone(),
            RanksSpec::Text(s) => {
                let mut out = Vec::new();
                for part in s.split(',') {
                    let part = part.trim();
                    if part.is_empty() {
                        continue;
                    }
                    if let Some((lo, hi)) = part.split_once('-') {
                        let lo: u32 = lo.trim().parse().map_err(|_| bad(s))?;
                        let hi: u32 = hi.trim().parse().map_err(|_| bad(s))?;
                        if lo > hi {
                            return Err(bad(s));
                        }
                        out.extend(lo..=hi);
                    } else {
                        out.push(part.parse().map_err(|_| bad(s))?);
                    }
                }
                out
            }
        };
        ranks.sort_unstable();
        ranks.dedup();
        if ranks.is_empty() {
            return Err(bad("<empty>"));
        }
        Ok(ranks)
    }
}

/// Roll-rule slugs as written in config: "calendar-2d", "volume".
fn parse_rule_slug(root: &str, slug: &str) -> Result<RollRule, ConfigError> {
    let lower = slug.to_ascii_lowercase();
    if lower == "volume" {
        return Ok(RollRule::VolumeCrossover);
    }
    if let Some(rest) = lower.strip_prefix("calendar-") {
        if let Some(days) = rest.strip_suffix('d').and_then(|d| d.parse().ok()) {
            return Ok(RollRule::CalendarPreExpiry { days });
        }
    }
    Err(ConfigError::BadRollRule { root: root.to_string(), rule: slug.to_string() })
}

#[derive(Debug, Clone, Deserialize)]
struct RawRoot {
    roll_rule: String,
    ranks: RanksSpec,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUniverse {
    #[serde(default)]
    default_start: Option<chrono::NaiveDate>,
    #[serde(default)]
    default_end: Option<chrono::NaiveDate>,
    roots: BTreeMap<String, RawRoot>,
}

/// One configured root: its rule and the ranks to build.
#[derive(Debug, Clone)]
pub struct RootUniverse {
    pub root: String,
    pub rule: RollRule,
    pub ranks: Vec<u32>,
    pub optional: bool,
    pub comment: Option<String>,
}

impl RootUniverse {
    pub fn series(&self) -> Result<Vec<ContractSeries>, SeriesError> {
        self.ranks
            .iter()
            .map(|&rank| ContractSeries::new(self.root.clone(), rank, self.rule))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub default_start: Option<chrono::NaiveDate>,
    pub default_end: Option<chrono::NaiveDate>,
    pub roots: Vec<RootUniverse>,
}

impl UniverseConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: RawUniverse = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: origin.to_string(),
            source,
        })?;
        let mut roots = Vec::with_capacity(raw.roots.len());
        for (root, cfg) in raw.roots {
            let rule = parse_rule_slug(&root, &cfg.roll_rule)?;
            let ranks = cfg.ranks.expand(&root)?;
            roots.push(RootUniverse { root, rule, ranks, optional: cfg.optional, comment: cfg.comment });
        }
        let config = Self {
            default_start: raw.default_start,
            default_end: raw.default_end,
            roots,
        };
        // Startup bijectivity check: a colliding configuration never ingests.
        let all = config.all_series()?;
        validate_bijective(all.iter())?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Every configured series, expanded from rank lists.
    pub fn all_series(&self) -> Result<Vec<ContractSeries>, SeriesError> {
        let mut out = Vec::new();
        for root in &self.roots {
            out.extend(root.series()?);
        }
        Ok(out)
    }

    pub fn selected(&self, include_optionals: bool, filter: Option<&[String]>) -> Vec<&RootUniverse> {
        self.roots
            .iter()
            .filter(|r| include_optionals || !r.optional)
            .filter(|r| match filter {
                Some(wanted) => wanted.iter().any(|w| w.eq_ignore_ascii_case(&r.root)),
                None => true,
            })
            .collect()
    }
}

/// Operator-maintained canonical mapping: root -> contract_series key.
#[derive(Debug, Clone, Deserialize)]
pub struct CanonicalEntry {
    pub contract_series: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanonicalConfig {
    pub roots: BTreeMap<String, CanonicalEntry>,
}

impl CanonicalConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_start = "2024-01-01"

[roots.ES]
roll_rule = "calendar-2d"
ranks = "0-1"

[roots.SR3]
roll_rule = "volume"
ranks = [0, 1, 2]
optional = true
comment = "quarterly SOFR strip"
"#;

    #[test]
    fn parses_roots_ranks_and_rules() {
        let cfg = UniverseConfig::from_toml_str(SAMPLE, "test").unwrap();
        assert_eq!(cfg.default_start, chrono::NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(cfg.roots.len(), 2);

        let es = cfg.roots.iter().find(|r| r.root == "ES").unwrap();
        assert_eq!(es.rule, RollRule::CalendarPreExpiry { days: 2 });
        assert_eq!(es.ranks, vec![0, 1]);
        assert!(!es.optional);

        let sr3 = cfg.roots.iter().find(|r| r.root == "SR3").unwrap();
        assert_eq!(sr3.rule, RollRule::VolumeCrossover);
        assert_eq!(sr3.ranks, vec![0, 1, 2]);
        assert!(sr3.optional);
    }

    #[test]
    fn expands_to_series_keys() {
        let cfg = UniverseConfig::from_toml_str(SAMPLE, "test").unwrap();
        let keys: Vec<String> = cfg.all_series().unwrap().iter().map(|s| s.key()).collect();
        assert!(keys.contains(&"ES_FRONT_CALENDAR_2D".to_string()));
        assert!(keys.contains(&"ES_RANK_1_CALENDAR_2D".to_string()));
        assert!(keys.contains(&"SR3_RANK_2_VOLUME".to_string()));
    }

    #[test]
    fn range_strings_with_holes() {
        let spec = RanksSpec::Text("0-2, 5".into());
        assert_eq!(spec.expand("ES").unwrap(), vec![0, 1, 2, 5]);
        assert!(RanksSpec::Text("3-1".into()).expand("ES").is_err());
        assert!(RanksSpec::Text("x".into()).expand("ES").is_err());
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let text = r#"
[roots.ES]
roll_rule = "open-interest"
ranks = 0
"#;
        assert!(matches!(
            UniverseConfig::from_toml_str(text, "test"),
            Err(ConfigError::BadRollRule { .. })
        ));
    }

    #[test]
    fn optional_roots_can_be_excluded() {
        let cfg = UniverseConfig::from_toml_str(SAMPLE, "test").unwrap();
        let required = cfg.selected(false, None);
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].root, "ES");
    }

    #[test]
    fn canonical_config_parses() {
        let text = r#"
[roots.ES]
contract_series = "ES_FRONT_CALENDAR_2D"
description = "primary ES daily series"

[roots.VX]
contract_series = "VX_FRONT_VOLUME"
optional = true
"#;
        let cfg = CanonicalConfig::from_toml_str(text, "test").unwrap();
        assert_eq!(cfg.roots["ES"].contract_series, "ES_FRONT_CALENDAR_2D");
        assert!(cfg.roots["VX"].optional);
    }
}
