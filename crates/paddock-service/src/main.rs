//! Paddock Service - rollup aggregation for environmental sensors.
//!
//! Run with: `cargo run -p paddock-service -- <command>`

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paddock_core::{RunMode, RunReport};
use paddock_service::{App, Config, LoggingConfig, Status};
use paddock_store::RollupQuery;
use paddock_types::{Granularity, Quantity};

/// Paddock Service - rollup aggregation for environmental sensors.
#[derive(Parser, Debug)]
#[command(name = "paddock-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Worker pool size (overrides config).
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Granularities to maintain, comma separated (overrides config).
    #[arg(short, long, global = true, value_delimiter = ',')]
    granularities: Vec<Granularity>,

    /// Emit JSON log lines (overrides config).
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run incremental aggregation periodically until interrupted.
    Run {
        /// Seconds between runs (overrides config).
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Recompute every bucket that holds a reading.
    Backfill {
        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Recompute buckets touched by readings ingested since the last run.
    Incremental {
        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import readings from a CSV file with a `sensor,quantity,timestamp,value,unit` header.
    Import {
        file: PathBuf,

        /// Run an incremental aggregation after importing.
        #[arg(long)]
        aggregate: bool,
    },

    /// Query stored rollups.
    Rollups {
        #[arg(long)]
        sensor: Option<String>,

        #[arg(long)]
        quantity: Option<Quantity>,

        #[arg(long)]
        granularity: Option<Granularity>,

        /// Earliest bucket start (RFC 3339, inclusive).
        #[arg(long, value_parser = parse_time)]
        since: Option<OffsetDateTime>,

        /// Latest bucket start (RFC 3339, exclusive).
        #[arg(long, value_parser = parse_time)]
        until: Option<OffsetDateTime>,

        #[arg(long)]
        limit: Option<u32>,

        /// Newest buckets first.
        #[arg(long)]
        newest_first: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Show row counts and high-water marks.
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }
    if !args.granularities.is_empty() {
        config.engine.granularities = args.granularities;
    }
    if args.json_logs {
        config.logging.json = true;
    }
    if let Command::Run {
        interval: Some(interval),
    } = &args.command
    {
        config.engine.interval_secs = *interval;
    }

    config.validate()?;
    init_logging(&config.logging)?;

    let app = App::open(config)?;

    match args.command {
        Command::Run { .. } => run_daemon(&app).await,
        Command::Backfill { json } => run_once(&app, RunMode::Backfill, json).await,
        Command::Incremental { json } => run_once(&app, RunMode::Incremental, json).await,
        Command::Import { file, aggregate } => {
            let result = app.import_csv(&file).await?;
            println!(
                "Imported {} readings from {} rows ({} duplicates, {} rejected)",
                result.inserted,
                result.rows,
                result.duplicates,
                result.rejected.len()
            );
            for rejected in &result.rejected {
                eprintln!("  {}", rejected);
            }
            if aggregate {
                run_once(&app, RunMode::Incremental, false).await?;
            }
            Ok(())
        }
        Command::Rollups {
            sensor,
            quantity,
            granularity,
            since,
            until,
            limit,
            newest_first,
            format,
        } => {
            let mut query = RollupQuery::new();
            query.sensor = sensor;
            query.quantity = quantity;
            query.granularity = granularity;
            query.since = since;
            query.until = until;
            query.limit = limit;
            query.newest_first = newest_first;

            match format {
                OutputFormat::Json => {
                    let records = app.rollups(&query).await?;
                    println!("{}", serde_json::to_string_pretty(&records)?);
                }
                OutputFormat::Csv => {
                    app.export_rollups_csv(&query, std::io::stdout()).await?;
                }
            }
            Ok(())
        }
        Command::Status { json } => {
            let status = app.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status)?;
            }
            Ok(())
        }
    }
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = &config.level;
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("paddock_service={level}").parse()?)
        .add_directive(format!("paddock_core={level}").parse()?)
        .add_directive(format!("paddock_store={level}").parse()?);

    // Logs go to stderr so stdout carries command output only
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run_daemon(app: &App) -> anyhow::Result<()> {
    let runner = app.runner();
    let cancel = runner.cancellation_token();
    let handle = runner.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, waiting for the current run to finish");
    cancel.cancel();
    handle.await?;
    Ok(())
}

async fn run_once(app: &App, mode: RunMode, json: bool) -> anyhow::Result<()> {
    let report = app.run_once(mode).await?;
    print_report(&report, json)?;

    if !report.is_success() {
        bail!(
            "{} of {} work units failed, marks held for their granularities",
            report.failed(),
            report.units()
        );
    }
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match report.as_of {
        Some(as_of) => println!("{} run as of {}", report.mode, as_of.format(&Rfc3339)?),
        None => {
            println!("No readings stored");
            return Ok(());
        }
    }
    for g in &report.granularities {
        println!(
            "  {:<8} {:>6} units {:>6} written {:>6} empty {:>4} skipped {:>4} failed{}",
            g.granularity.as_str(),
            g.units,
            g.written,
            g.empty,
            g.skipped,
            g.failed,
            if g.mark_advanced { "  (mark advanced)" } else { "" }
        );
    }
    println!("Finished in {:?}", report.duration);
    Ok(())
}

fn print_status(status: &Status) -> anyhow::Result<()> {
    let fmt_time = |t: Option<OffsetDateTime>| -> anyhow::Result<String> {
        Ok(match t {
            Some(t) => t.format(&Rfc3339)?,
            None => "-".to_string(),
        })
    };

    println!("Database: {}", status.database.display());
    println!("Readings: {} from {} sensors", status.stats.readings, status.stats.sensors);
    println!(
        "  Span:   {} .. {}",
        fmt_time(status.stats.oldest_reading)?,
        fmt_time(status.stats.newest_reading)?
    );
    println!("  Latest ingest: {}", fmt_time(status.stats.latest_recorded_at)?);
    println!("Rollups: {}", status.stats.rollups);
    for (granularity, count) in &status.rollups {
        println!("  {:<8} {}", granularity.as_str(), count);
    }
    println!("High-water marks:");
    for mark in &status.marks {
        println!("  {:<8} {}", mark.granularity.as_str(), fmt_time(mark.mark)?);
    }
    Ok(())
}

fn parse_time(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("invalid RFC 3339 time '{s}': {e}"))
}
