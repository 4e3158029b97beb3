//! linematch CLI - Debug tool for line matching and fuel analysis
//!
//! Usage:
//!   linematch-cli match <bundle.json> [--config <file>]
//!   linematch-cli analyze <bundle.json> [--config <file>] [--db <file>]
//!
//! A bundle holds one service day: the line shapes, the holiday list and
//! the telemetry of every vehicle. `match` prints the segments found per
//! trip; `analyze` runs the whole pipeline and prints the stored analyses
//! as JSON.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use linematch::{
    AnalysisConfig, AnalysisContext, AnalysisStore, GeometryCatalog, HolidayCalendar,
    InMemoryStore, LineShape, VehicleDay, VehicleDayReport,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "linematch-cli")]
#[command(about = "Debug tool for bus line matching and fuel analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Match every trip of the bundle against the line catalog
    Match {
        /// Day bundle (JSON)
        bundle: PathBuf,

        /// Configuration file (JSON, partial allowed)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run matching, fuel interpolation and classification
    Analyze {
        /// Day bundle (JSON)
        bundle: PathBuf,

        /// Configuration file (JSON, partial allowed)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// SQLite database for results (requires the `persistence` feature)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// One service day of input.
#[derive(Deserialize)]
struct DayBundle {
    day: NaiveDate,
    lines: Vec<LineShape>,
    #[serde(default)]
    holidays: Vec<NaiveDate>,
    vehicle_days: Vec<VehicleDay>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Match { bundle, config } => run_match(&bundle, config.as_deref()),
        Commands::Analyze { bundle, config, db } => {
            run_analyze(&bundle, config.as_deref(), db.as_deref())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(bundle: &Path, config: Option<&Path>) -> linematch::Result<(DayBundle, AnalysisContext)> {
    let config = match config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    println!("\n{}", "=".repeat(60));
    println!("Loading bundle: {}", bundle.display());
    println!("{}", "=".repeat(60));

    let reader = BufReader::new(File::open(bundle)?);
    let day: DayBundle = serde_json::from_reader(reader)?;

    let catalog = GeometryCatalog::build_for_day(&day.day.to_string(), &day.lines, &config.catalog)?;
    println!(
        "  {} line geometries, {} vehicle-days, {} holidays",
        catalog.len(),
        day.vehicle_days.len(),
        day.holidays.len()
    );

    let holidays = HolidayCalendar::new(day.holidays.iter().copied());
    let ctx = AnalysisContext::new(catalog, config, holidays)?;
    Ok((day, ctx))
}

fn run_match(bundle: &Path, config: Option<&Path>) -> linematch::Result<()> {
    let (day, ctx) = load(bundle, config)?;

    for vd in &day.vehicle_days {
        println!("\nVehicle {} ({}) - {}", vd.vehicle.num_id, vd.vehicle.asset_id, vd.vehicle.model);
        for trip in &vd.trips {
            let segments = ctx.match_trip(&trip.points);
            println!("  Trip {}: {} points, {} segments", trip.trip_id, trip.points.len(), segments.len());
            for s in &segments {
                println!(
                    "    [{:>4}..={:>4}] {}/{} {:<6} initial {:6.2}% final {:6.2}% end zone: {}",
                    s.start_index,
                    s.end_index,
                    s.line_number,
                    s.sub_line_id,
                    s.direction.map(|d| d.as_str()).unwrap_or("?"),
                    s.initial_overlap_pct,
                    s.final_overlap_pct,
                    s.reached_end_zone
                );
            }
        }
    }
    Ok(())
}

fn run_analyze(bundle: &Path, config: Option<&Path>, db: Option<&Path>) -> linematch::Result<()> {
    let (day, ctx) = load(bundle, config)?;

    match db {
        #[cfg(feature = "persistence")]
        Some(path) => {
            let store = linematch::SqliteStore::open(&path.to_string_lossy())?;
            let reports = run_batch(&ctx, &store, &day.vehicle_days);
            print_summary(&reports, store.count()?);
        }
        #[cfg(not(feature = "persistence"))]
        Some(_) => {
            return Err(linematch::LineMatchError::InvalidConfig(
                "--db requires the `persistence` feature".to_string(),
            ));
        }
        None => {
            let store = InMemoryStore::new();
            let reports = run_batch(&ctx, &store, &day.vehicle_days);
            println!("{}", serde_json::to_string_pretty(&store.all()?)?);
            print_summary(&reports, store.count()?);
        }
    }
    Ok(())
}

fn run_batch<S: AnalysisStore>(
    ctx: &AnalysisContext,
    store: &S,
    vehicle_days: &[VehicleDay],
) -> Vec<VehicleDayReport> {
    #[cfg(feature = "parallel")]
    {
        linematch::process_vehicle_days_parallel(ctx, store, vehicle_days)
    }
    #[cfg(not(feature = "parallel"))]
    {
        linematch::process_vehicle_days(ctx, store, vehicle_days)
    }
}

fn print_summary(reports: &[VehicleDayReport], stored: usize) {
    println!("\n{}", "=".repeat(60));
    println!("Summary");
    println!("{}", "=".repeat(60));
    for r in reports {
        println!(
            "  {:<12} segments: {:>3}  written: {:>3}  short: {:>3}  present: {:>3}  failed trips: {:>2}",
            r.asset_id, r.segments, r.written, r.skipped_short, r.already_present, r.failed_trips
        );
    }
    println!("\n{} analyses in store", stored);
}
