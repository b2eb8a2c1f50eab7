#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pothole hotspot ingestion and escalation CLI.
//!
//! ```text
//! road_intel ingest --file detections.json
//! road_intel ingest --lat 18.5204 --lng 73.8567 --severity severe
//! road_intel hotspots [--min-reports 10]
//! road_intel escalate [--threshold 10] [--dry-run]
//! road_intel outbox [--limit 100] [--dry-run]
//! road_intel bot [--dry-run]
//! road_intel nearby --lat 18.52 --lng 73.85 [--radius-km 2]
//! road_intel report <id>
//! road_intel status <id> in-repair [--note "crew dispatched"]
//! road_intel priority [--city pune] [--limit 20]
//! road_intel summary [--city pune]
//! road_intel heatmap [--city pune] [--min-severity moderate] [--output heatmap.geojson]
//! road_intel migrate
//! ```
//!
//! Running `road_intel` with no subcommand enters interactive mode.

mod app;
mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use road_intel_report_models::DetectionResult;

use crate::app::{App, Options};

#[derive(Parser)]
#[command(
    name = "road_intel",
    about = "Cluster pothole reports into hotspots and escalate them to municipalities"
)]
struct Cli {
    /// `DuckDB` store path (default: data/road_intel.duckdb or `ROAD_INTEL_DB`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: road_intel.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use local collaborators only: no embeddings, geocoding or LLM calls
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest detector results from a JSON file or flags
    Ingest {
        /// JSON file with one detection or an array of them (`-` for stdin)
        #[arg(long, conflicts_with_all = ["lat", "lng", "severity"])]
        file: Option<PathBuf>,
        /// Latitude of the photo
        #[arg(long, allow_hyphen_values = true, requires_all = ["lng", "severity"])]
        lat: Option<f64>,
        /// Longitude of the photo
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        /// Severity label (minor, moderate, severe)
        #[arg(long)]
        severity: Option<String>,
        /// Detector confidence
        #[arg(long, default_value = "1.0")]
        confidence: f64,
        /// Citizen description
        #[arg(long)]
        description: Option<String>,
        /// City label (default from config)
        #[arg(long)]
        city: Option<String>,
    },
    /// List unescalated hotspots in priority order
    Hotspots {
        /// Minimum member count (default: hotspot threshold)
        #[arg(long)]
        min_reports: Option<usize>,
    },
    /// Run one escalation cycle
    Escalate {
        /// Minimum member count (default: hotspot threshold)
        #[arg(long)]
        threshold: Option<usize>,
        /// Log messages instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Publish escalations queued when hotspots crossed the threshold
    Outbox {
        /// Maximum entries to process
        #[arg(long, default_value = "100")]
        limit: usize,
        /// Log messages instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the outbox and escalation cycle periodically until Ctrl-C
    Bot {
        /// Log messages instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },
    /// List reports near a point
    Nearby {
        /// Latitude of the search center
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude of the search center
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Search radius in kilometers (default from config)
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Show a report with its status history
    Report {
        /// Report ID
        id: String,
    },
    /// Move a report forward in its lifecycle
    Status {
        /// Report ID
        id: String,
        /// New status (reported, escalated, in-repair, resolved)
        status: String,
        /// Optional note recorded with the change
        #[arg(long)]
        note: Option<String>,
    },
    /// List hotspots in repair priority order
    Priority {
        /// Restrict to a city
        #[arg(long)]
        city: Option<String>,
        /// Maximum hotspots to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show dashboard counts
    Summary {
        /// Restrict to a city
        #[arg(long)]
        city: Option<String>,
    },
    /// Export report points as `GeoJSON`
    Heatmap {
        /// Restrict to a city
        #[arg(long)]
        city: Option<String>,
        /// Minimum severity to include
        #[arg(long)]
        min_severity: Option<String>,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Create or upgrade the store schema
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let options = Options {
        db: cli.db,
        config: cli.config,
        offline: cli.offline,
    };

    let Some(command) = cli.command else {
        return interactive::run(&options).await;
    };

    if matches!(command, Commands::Migrate) {
        app::open_store(options.db.as_deref())?;
        println!("Store schema is up to date.");
        return Ok(());
    }

    let app = App::open(&options)?;

    match command {
        Commands::Ingest {
            file,
            lat,
            lng,
            severity,
            confidence,
            description,
            city,
        } => {
            let detections = match (file, lat, lng, severity) {
                (Some(file), ..) => commands::read_detections(&file)?,
                (None, Some(latitude), Some(longitude), Some(severity)) => vec![DetectionResult {
                    severity,
                    confidence,
                    latitude,
                    longitude,
                    description,
                    city,
                    bounding_boxes: Vec::new(),
                }],
                _ => return Err("Provide --file, or --lat, --lng and --severity".into()),
            };
            commands::ingest(&app, &detections).await?;
        }
        Commands::Hotspots { min_reports } => commands::pending(&app, min_reports)?,
        Commands::Escalate { threshold, dry_run } => {
            let notifier = app::notifier(dry_run)?;
            commands::escalate(&app, threshold, notifier.as_ref()).await?;
        }
        Commands::Outbox { limit, dry_run } => {
            let notifier = app::notifier(dry_run)?;
            commands::drain_outbox(&app, limit, notifier.as_ref()).await?;
        }
        Commands::Bot { dry_run } => {
            let notifier = app::notifier(dry_run)?;
            commands::bot(&app, notifier.as_ref()).await?;
        }
        Commands::Nearby {
            lat,
            lng,
            radius_km,
        } => commands::nearby(&app, lat, lng, radius_km)?,
        Commands::Report { id } => commands::show_report(&app, &id)?,
        Commands::Status { id, status, note } => commands::set_status(&app, &id, &status, note)?,
        Commands::Priority { city, limit } => commands::priority(&app, city.as_deref(), limit)?,
        Commands::Summary { city } => commands::summary(&app, city.as_deref())?,
        Commands::Heatmap {
            city,
            min_severity,
            output,
        } => commands::heatmap(
            &app,
            city.as_deref(),
            min_severity.as_deref(),
            output.as_deref(),
        )?,
        Commands::Migrate => {}
    }

    Ok(())
}
