//! Interactive menu shown when no subcommand is given.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use road_intel_report_models::{ReportStatus, Severity};

use crate::app::{self, App, Options};
use crate::commands;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Top-level actions in the interactive menu.
enum Action {
    Ingest,
    Hotspots,
    Escalate,
    Outbox,
    Bot,
    Nearby,
    Report,
    Status,
    Priority,
    Summary,
    Heatmap,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Ingest,
        Self::Hotspots,
        Self::Escalate,
        Self::Outbox,
        Self::Bot,
        Self::Nearby,
        Self::Report,
        Self::Status,
        Self::Priority,
        Self::Summary,
        Self::Heatmap,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Ingest => "Ingest detections from a JSON file",
            Self::Hotspots => "List pending hotspots",
            Self::Escalate => "Run an escalation cycle",
            Self::Outbox => "Drain the escalation outbox",
            Self::Bot => "Start the escalation bot",
            Self::Nearby => "Find reports near a point",
            Self::Report => "Show a report",
            Self::Status => "Update a report's status",
            Self::Priority => "Show the repair priority list",
            Self::Summary => "Show dashboard summary",
            Self::Heatmap => "Export heatmap GeoJSON",
        }
    }
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if a prompt or the chosen operation fails.
pub async fn run(options: &Options) -> CmdResult {
    println!("Road Intel");
    println!();

    let app = App::open(options)?;

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Ingest => {
            let path: String = Input::new()
                .with_prompt("Detections file (- for stdin)")
                .interact_text()?;
            let detections = commands::read_detections(&PathBuf::from(path.trim()))?;
            commands::ingest(&app, &detections).await
        }
        Action::Hotspots => {
            let min = prompt_usize("Minimum reports", app.config.hotspot_threshold)?;
            commands::pending(&app, Some(min))
        }
        Action::Escalate => {
            let threshold = prompt_usize("Escalation threshold", app.config.hotspot_threshold)?;
            let notifier = app::notifier(prompt_dry_run()?)?;
            commands::escalate(&app, Some(threshold), notifier.as_ref()).await
        }
        Action::Outbox => {
            let notifier = app::notifier(prompt_dry_run()?)?;
            commands::drain_outbox(&app, 100, notifier.as_ref()).await
        }
        Action::Bot => {
            let notifier = app::notifier(prompt_dry_run()?)?;
            commands::bot(&app, notifier.as_ref()).await
        }
        Action::Nearby => {
            let lat = prompt_f64("Latitude", None)?;
            let lng = prompt_f64("Longitude", None)?;
            let radius = prompt_f64("Radius (km)", Some(app.config.nearby_radius_km))?;
            commands::nearby(&app, lat, lng, Some(radius))
        }
        Action::Report => {
            let id: String = Input::new().with_prompt("Report ID").interact_text()?;
            commands::show_report(&app, &id)
        }
        Action::Status => handle_status(&app),
        Action::Priority => {
            let city = prompt_city()?;
            let limit = prompt_usize("Max hotspots to show", 20)?;
            commands::priority(&app, city.as_deref(), limit)
        }
        Action::Summary => commands::summary(&app, prompt_city()?.as_deref()),
        Action::Heatmap => handle_heatmap(&app),
    }
}

/// Picks a report status and applies it.
fn handle_status(app: &App) -> CmdResult {
    let id: String = Input::new().with_prompt("Report ID").interact_text()?;

    let statuses = ReportStatus::all();
    let labels: Vec<String> = statuses.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt("New status")
        .items(&labels)
        .default(0)
        .interact()?;

    let note: String = Input::new()
        .with_prompt("Note (optional)")
        .allow_empty(true)
        .interact_text()?;
    let note = Some(note).filter(|n| !n.trim().is_empty());

    commands::set_status(app, &id, &labels[idx], note)
}

/// Prompts for heatmap filters and an output file.
fn handle_heatmap(app: &App) -> CmdResult {
    let city = prompt_city()?;

    let mut labels = vec!["any".to_string()];
    labels.extend(Severity::all().iter().map(ToString::to_string));
    let idx = Select::new()
        .with_prompt("Minimum severity")
        .items(&labels)
        .default(0)
        .interact()?;
    let min_severity = (idx > 0).then(|| labels[idx].as_str());

    let output: String = Input::new()
        .with_prompt("Output file")
        .default("heatmap.geojson".to_string())
        .interact_text()?;

    commands::heatmap(
        app,
        city.as_deref(),
        min_severity,
        Some(PathBuf::from(output.trim()).as_path()),
    )
}

fn prompt_dry_run() -> Result<bool, dialoguer::Error> {
    Confirm::new()
        .with_prompt("Dry run (log messages instead of publishing)?")
        .default(true)
        .interact()
}

fn prompt_city() -> Result<Option<String>, dialoguer::Error> {
    let city: String = Input::new()
        .with_prompt("City (blank for all)")
        .allow_empty(true)
        .interact_text()?;
    Ok(Some(city.trim().to_string()).filter(|c| !c.is_empty()))
}

fn prompt_usize(prompt: &str, default: usize) -> Result<usize, dialoguer::Error> {
    Input::new()
        .with_prompt(prompt)
        .default(default)
        .interact_text()
}

fn prompt_f64(prompt: &str, default: Option<f64>) -> Result<f64, dialoguer::Error> {
    let mut input = Input::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default);
    }
    input.interact_text()
}
