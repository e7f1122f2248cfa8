//! Thin orchestration shell around the warehouse core. All logic lives in
//! the `continuous` and `warehouse` crates; this binary only parses
//! arguments, opens the store, and prints results.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use continuous::{month_chunks, RollResolver, SeriesBuilder, UniverseConfig};
use warehouse::Warehouse;

#[derive(Parser)]
#[command(name = "marketdb", about = "Market DB orchestrator (DuckDB)")]
struct Cli {
    /// Warehouse database path; falls back to $MARKETDB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Load instrument definitions from a JSON array file.
    IngestDefinitions { file: PathBuf },
    /// Load raw per-expiry daily bars from a JSON array file.
    IngestDailyBars { file: PathBuf },
    /// Build and merge continuous series for a configured universe.
    BuildContinuous {
        /// Universe TOML ({root -> roll_rule, ranks}).
        #[arg(long)]
        universe: PathBuf,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Restrict to these roots.
        #[arg(long, value_delimiter = ',')]
        roots: Vec<String>,
        /// Include roots marked optional in the config.
        #[arg(long)]
        include_optionals: bool,
    },
    /// Build 1-minute gold bars from quotes and trades.
    Gold,
    /// Coverage audit per contract series, with a canonical recommendation.
    Audit {
        #[arg(long)]
        root: Option<String>,
    },
    /// Point a root at a canonical series (full replace).
    SetCanonical {
        root: String,
        contract_series: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Apply a canonical-mapping TOML wholesale.
    ApplyCanonical { config: PathBuf },
    /// Read the canonical daily view.
    Canonical {
        #[arg(long)]
        root: Option<String>,
    },
    /// Run read-only integrity checks.
    Validate,
    /// Sync dim_session from ingested continuous bars.
    Sessions,
    /// Per-table row counts.
    Summary,
}

fn db_path(cli_db: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = cli_db {
        return Ok(p);
    }
    std::env::var("MARKETDB_PATH")
        .map(PathBuf::from)
        .context("no --db given and MARKETDB_PATH is unset")
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let wh = Warehouse::open(&db_path(cli.db)?)?;

    match cli.command {
        Command::Migrate => {
            // Warehouse::open already migrated; this just confirms.
            println!("migrations applied");
        }
        Command::IngestDefinitions { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let defs: Vec<continuous::InstrumentDef> =
                serde_json::from_str(&text).context("parsing instrument definitions")?;
            let mut resolved = Vec::with_capacity(defs.len());
            for def in &defs {
                match def.resolve() {
                    Some(inst) => resolved.push(inst),
                    None => warn!(
                        instrument_id = def.instrument_id,
                        native_symbol = %def.native_symbol,
                        "definition has no resolvable expiry; skipped"
                    ),
                }
            }
            let n = wh.upsert_instruments(&resolved)?;
            println!("upserted {n} instrument definitions ({} skipped)", defs.len() - n);
        }
        Command::IngestDailyBars { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let rows: Vec<warehouse::FutDailyBarRow> =
                serde_json::from_str(&text).context("parsing daily bars")?;
            let out = wh.merge_daily_bars(&rows)?;
            println!("daily bars: {} inserted, {} replaced", out.inserted, out.replaced);
        }
        Command::BuildContinuous { universe, start, end, roots, include_optionals } => {
            let config = UniverseConfig::load(&universe)?;
            let start = start
                .or(config.default_start)
                .context("no --start and no default_start in config")?;
            let end = end
                .or(config.default_end)
                .context("no --end and no default_end in config")?;
            let filter = (!roots.is_empty()).then_some(roots);

            let catalog = wh.load_catalog()?;
            let calendar = wh.calendar_from_raw()?;
            let builder = SeriesBuilder::new(&catalog, &calendar, &wh);
            let resolver = RollResolver::new(&catalog, &calendar, &wh);

            let mut total = warehouse::MergeOutcome::default();
            for root_cfg in config.selected(include_optionals, filter.as_deref()) {
                for series in root_cfg.series()? {
                    wh.register_series(&series, "unadjusted", root_cfg.comment.as_deref())?;
                    for (lo, hi) in month_chunks(start, end) {
                        let bars = builder.build(&series, lo, hi);
                        let out = wh.merge_continuous_bars(&bars)?;
                        total.add(out);
                    }
                    match resolver.roll_events(&series, start, end) {
                        Ok(events) => {
                            wh.record_roll_events(&events, &catalog)?;
                        }
                        Err(e) => warn!(series = %series, error = %e, "roll detection skipped"),
                    }
                }
            }
            let sessions = wh.sync_sessions()?;
            info!(
                inserted = total.inserted,
                replaced = total.replaced,
                sessions,
                "continuous build complete"
            );
            println!(
                "continuous bars: {} inserted, {} replaced; {sessions} new sessions",
                total.inserted, total.replaced
            );
        }
        Command::Gold => {
            let out = wh.build_gold_1m()?;
            println!("g_bar_1m: {} inserted, {} replaced", out.inserted, out.replaced);
        }
        Command::Audit { root } => {
            let coverage = wh.audit_coverage(root.as_deref())?;
            println!(
                "{:<6} {:<28} {:>10} {:>12} {:>12} {:>8}",
                "root", "contract_series", "rows", "first", "last", "years"
            );
            for c in &coverage {
                println!(
                    "{:<6} {:<28} {:>10} {:>12} {:>12} {:>8.1}",
                    c.root, c.contract_series, c.row_count, c.first_date, c.last_date,
                    c.coverage_years
                );
            }
            println!("\nrecommended canonical (best coverage; not applied):");
            for c in wh.recommend_canonical(root.as_deref())? {
                println!("  {} -> {}", c.root, c.contract_series);
            }
        }
        Command::SetCanonical { root, contract_series, description } => {
            wh.set_canonical(&root, &contract_series, description.as_deref(), false)?;
            println!("canonical[{root}] = {contract_series}");
        }
        Command::ApplyCanonical { config } => {
            let cfg = continuous::CanonicalConfig::load(&config)?;
            let n = wh.apply_canonical_config(&cfg)?;
            println!("applied {n} canonical mappings");
        }
        Command::Canonical { root } => {
            let rows = wh.canonical_bars(root.as_deref())?;
            for r in &rows {
                println!(
                    "{} {} {} o={} h={} l={} c={} v={}",
                    r.root, r.trading_date, r.contract_series, r.open, r.high, r.low, r.close,
                    r.volume
                );
            }
            println!("{} canonical rows", rows.len());
        }
        Command::Validate => {
            let mut dirty = false;
            for (name, count) in wh.integrity_checks()? {
                println!("[{name}] -> {count}");
                dirty |= count > 0;
            }
            if dirty {
                warn!("integrity checks found offenders; see dedupe repair");
            }
        }
        Command::Sessions => {
            let n = wh.sync_sessions()?;
            println!("{n} sessions added");
        }
        Command::Summary => {
            for (table, count) in wh.table_counts()? {
                println!("{table:<26} {count:>12}");
            }
        }
    }
    Ok(())
}
