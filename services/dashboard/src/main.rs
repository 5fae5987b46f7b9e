//! Dashboard - Normalizes periodic spreadsheet exports and reports trends
//!
//! Responsibilities:
//! - Load configuration (env + JSON file)
//! - Read export files (CSV, XLS/XLSX/ODS) from disk
//! - Normalize each sheet on a blocking worker (sheets share no state)
//! - Serve unchanged files from the snapshot cache while its TTL holds
//! - Print a per-sheet summary (text or JSON)
//!
//! Usage:
//!   # One-shot text report:
//!   cargo run --bin dashboard -- exports/outstanding.csv exports/collections.xlsx
//!
//!   # JSON, re-run every 10 minutes:
//!   cargo run --bin dashboard -- --json --interval 600 exports/outstanding.csv

mod config;
mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use parser::{ingest, SheetConfig, SourceFile, TtlCache};
use tokio::fs;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{load_config, DashboardConfig, EnvConfig};
use crate::report::{render_text, SheetReport};

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Normalizes spreadsheet exports and reports period comparisons")]
struct Args {
    /// Path to the dashboard config file (overrides DASHBOARD_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Date for metric columns that carry no date (YYYY-MM-DD)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Number of entities listed per metric
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Print JSON instead of text
    #[arg(long, default_value = "false")]
    json: bool,

    /// Re-run every N seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Export files to process
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// Outcome of one ingestion cycle
struct Cycle {
    reports: Vec<SheetReport>,
    failed: usize,
}

/// Read and normalize every file concurrently; results keep argument order
async fn run_cycle(
    args: &Args,
    config: &Arc<DashboardConfig>,
    sheet_config: &Arc<SheetConfig>,
    cache: &Arc<TtlCache>,
) -> Cycle {
    let mut tasks = JoinSet::new();
    let mut failed = 0;

    for (idx, path) in args.files.iter().enumerate() {
        let bytes = match fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
        {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("  ✗ {:#}", e);
                failed += 1;
                continue;
            }
        };

        let source = SourceFile::new(path.display().to_string(), bytes);
        let sheet_config = Arc::clone(sheet_config);
        let cache = Arc::clone(cache);
        let as_of = args.as_of;
        tasks.spawn_blocking(move || {
            let result = ingest(&source, &sheet_config, as_of, &*cache);
            (idx, source.name, result)
        });
    }

    let mut done = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => done.push(outcome),
            Err(e) => {
                error!(error = %e, "ingestion task panicked");
                failed += 1;
            }
        }
    }
    done.sort_by_key(|(idx, _, _)| *idx);

    let mut reports = Vec::new();
    for (_, name, result) in done {
        match result {
            Ok(snapshot) => reports.push(SheetReport::build(&snapshot, config, args.top)),
            Err(e) => {
                eprintln!("  ✗ {}: {}", name, e);
                failed += 1;
            }
        }
    }

    Cycle { reports, failed }
}

fn print_cycle(cycle: &Cycle, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(&cycle.reports).context("Failed to encode report")?;
        println!("{}", out);
        return Ok(());
    }

    for report in &cycle.reports {
        print!("{}", render_text(report));
    }
    println!("\n=== Dashboard Summary ===");
    println!("Loaded: {}", cycle.reports.len());
    println!("Failed: {}", cycle.failed);
    Ok(())
}

/// A one-shot run fails when no sheet loaded
fn ensure_loaded(cycle: &Cycle) -> Result<()> {
    if cycle.reports.is_empty() {
        anyhow::bail!("All {} sheet(s) failed", cycle.failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let env = EnvConfig::from_env();

    let config_path = args.config.clone().unwrap_or_else(|| env.config_path.clone());
    let config = load_config(&config_path, args.config.is_some()).await?;
    let sheet_config = Arc::new(config.sheet_config());
    let config = Arc::new(config);
    let cache = Arc::new(TtlCache::new(env.cache_ttl));

    if !args.json {
        println!("=== Dashboard ===");
        println!("Config: {}", config_path.display());
        if !config.version.is_empty() {
            println!("Config version: {}", config.version);
        }
        println!("Cache TTL: {}s", env.cache_ttl.as_secs());
        println!("\nProcessing {} file(s)...", args.files.len());
    }

    loop {
        let cycle = run_cycle(&args, &config, &sheet_config, &cache).await;
        print_cycle(&cycle, args.json)?;

        match args.interval {
            Some(secs) => {
                if cycle.reports.is_empty() {
                    eprintln!("  ⚠ No sheet loaded this cycle; retrying in {}s", secs);
                }
                debug!(cached = cache.len(), "cycle complete");
                sleep(Duration::from_secs(secs)).await;
                cache.purge_expired();
            }
            None => {
                ensure_loaded(&cycle)?;
                break;
            }
        }
    }

    Ok(())
}
