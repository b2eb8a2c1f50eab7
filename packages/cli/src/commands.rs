//! Command handlers shared by the subcommands and the interactive menu.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use road_intel_engine::collaborators::Notifier;
use road_intel_hotspot_models::{CycleReport, Hotspot, OutcomeStatus};
use road_intel_report_models::{Coordinates, DetectionResult, ReportId, ReportStatus, Severity};
use tokio::time::MissedTickBehavior;

use crate::app::App;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Reads detection results from a JSON file (`-` for stdin). The document
/// may hold one object or an array of them.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON.
pub fn read_detections(path: &Path) -> Result<Vec<DetectionResult>, Box<dyn std::error::Error>> {
    let contents = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };

    let value: serde_json::Value = serde_json::from_str(&contents)?;
    let detections = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(detections)
}

/// Ingests detections one by one; invalid ones are reported and skipped.
///
/// # Errors
///
/// Returns an error if any detection failed.
pub async fn ingest(app: &App, detections: &[DetectionResult]) -> CmdResult {
    let mut rejected = 0_usize;
    for detection in detections {
        match app.ingestor.ingest(detection).await {
            Ok(report) => println!(
                "Ingested {} ({}, {}) at {}",
                report.id, report.severity, report.city, report.coordinates
            ),
            Err(e) => {
                rejected += 1;
                eprintln!("Rejected detection at {}, {}: {e}", detection.latitude, detection.longitude);
            }
        }
    }

    println!(
        "\n{} ingested, {rejected} rejected",
        detections.len() - rejected
    );
    if rejected > 0 {
        return Err(format!("{rejected} detection(s) rejected").into());
    }
    Ok(())
}

fn print_hotspots(hotspots: &[Hotspot]) {
    if hotspots.is_empty() {
        println!("No hotspots found.");
        return;
    }

    println!(
        "{:<38} {:<9} {:>7} {:<12} {:<20} {:<9} CREATED",
        "ID", "SEVERITY", "REPORTS", "CITY", "CENTROID", "ESCALATED"
    );
    println!("{}", "-".repeat(120));
    for h in hotspots {
        println!(
            "{:<38} {:<9} {:>7} {:<12} {:<20} {:<9} {}",
            h.id,
            h.max_severity.as_ref(),
            h.report_count(),
            h.city,
            h.representative_coordinates.to_string(),
            if h.escalated { "yes" } else { "no" },
            h.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} hotspot(s)", hotspots.len());
}

/// Lists unescalated hotspots with at least `min_reports` members.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub fn pending(app: &App, min_reports: Option<usize>) -> CmdResult {
    let min = min_reports.unwrap_or(app.config.hotspot_threshold);
    print_hotspots(&app.aggregator.pending_hotspots(min, true)?);
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    for outcome in &report.outcomes {
        let handle = outcome.handle.as_deref().unwrap_or("-");
        match &outcome.status {
            OutcomeStatus::Escalated { message } => {
                println!("✓ {} {handle}\n    {message}", outcome.hotspot_id);
            }
            OutcomeStatus::Failed { reason, error } => {
                println!("✗ {} {handle}: {reason}: {error}", outcome.hotspot_id);
            }
            OutcomeStatus::Skipped { reason } => {
                println!("- {} skipped: {reason}", outcome.hotspot_id);
            }
        }
    }
    println!(
        "\nCycle finished in {} ms: {report}",
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

/// Runs one escalation cycle.
///
/// # Errors
///
/// Returns an error if pending hotspots cannot be listed.
pub async fn escalate(app: &App, threshold: Option<usize>, notifier: &dyn Notifier) -> CmdResult {
    let threshold = threshold.unwrap_or(app.config.hotspot_threshold);
    let report = app.engine.run_escalation_cycle(threshold, notifier).await?;
    print_cycle(&report);
    Ok(())
}

/// Drains the escalation outbox.
///
/// # Errors
///
/// Returns an error if the outbox cannot be read.
pub async fn drain_outbox(app: &App, limit: usize, notifier: &dyn Notifier) -> CmdResult {
    let report = app.engine.drain_outbox(notifier, limit).await?;
    print_cycle(&report);
    Ok(())
}

async fn bot_tick(app: &App, notifier: &dyn Notifier) {
    match app.engine.drain_outbox(notifier, 100).await {
        Ok(report) => log::info!("Outbox: {report}"),
        Err(e) => log::error!("Outbox drain failed: {e}"),
    }
    match app
        .engine
        .run_escalation_cycle(app.config.hotspot_threshold, notifier)
        .await
    {
        Ok(report) => print_cycle(&report),
        Err(e) => log::error!("Escalation cycle failed: {e}"),
    }
}

/// Runs the outbox worker and escalation cycle every
/// `bot_interval_hours` until interrupted.
///
/// # Errors
///
/// Returns an error if the shutdown signal cannot be installed.
pub async fn bot(app: &App, notifier: &dyn Notifier) -> CmdResult {
    let hours = app.config.bot_interval_hours.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(hours.saturating_mul(3600)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    println!("Escalation bot started (every {hours}h, Ctrl-C to stop)");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => bot_tick(app, notifier).await,
            result = &mut shutdown => {
                result?;
                log::info!("Shutting down escalation bot");
                break;
            }
        }
    }
    Ok(())
}

/// Lists reports near a point, nearest first.
///
/// # Errors
///
/// Returns an error for invalid coordinates or a failed query.
pub fn nearby(app: &App, lat: f64, lng: f64, radius_km: Option<f64>) -> CmdResult {
    let center = Coordinates::new(lat, lng)?;
    let reports = app.dashboard.nearby_reports(center, radius_km)?;
    if reports.is_empty() {
        println!("No reports near {center}.");
        return Ok(());
    }

    println!(
        "{:<38} {:>8} {:<9} {:<12} REPORTED",
        "ID", "KM", "SEVERITY", "STATUS"
    );
    println!("{}", "-".repeat(90));
    for n in &reports {
        println!(
            "{:<38} {:>8.3} {:<9} {:<12} {}",
            n.report.id,
            n.distance_km,
            n.report.severity.as_ref(),
            n.report.status.as_ref(),
            n.report.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} report(s)", reports.len());
    Ok(())
}

/// Prints a report and its status history as JSON.
///
/// # Errors
///
/// Returns an error for an unknown or malformed id.
pub fn show_report(app: &App, id: &str) -> CmdResult {
    let id: ReportId = id.trim().parse()?;
    let (report, history) = app.dashboard.report_with_history(id)?;
    let json = serde_json::json!({ "report": report, "history": history });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Moves a report forward in its lifecycle.
///
/// # Errors
///
/// Returns an error for an unknown id, an unknown status or a backward
/// transition.
pub fn set_status(app: &App, id: &str, status: &str, note: Option<String>) -> CmdResult {
    let id: ReportId = id.trim().parse()?;
    let status: ReportStatus = status.trim().parse().map_err(|_| {
        format!(
            "Unknown status '{status}'. Use one of: {}",
            ReportStatus::all()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    let change = app.dashboard.update_report_status(id, status, note)?;
    println!("Report {id}: {} -> {}", change.from, change.to);
    Ok(())
}

/// Prints the repair priority list.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub fn priority(app: &App, city: Option<&str>, limit: usize) -> CmdResult {
    print_hotspots(&app.dashboard.priority_list(city, limit)?);
    Ok(())
}

/// Prints dashboard counts as JSON.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn summary(app: &App, city: Option<&str>) -> CmdResult {
    let summary = app.dashboard.dashboard_summary(city)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Writes the heatmap `GeoJSON` to `output` or stdout.
///
/// # Errors
///
/// Returns an error for an unknown severity, a failed query or a failed
/// write.
pub fn heatmap(
    app: &App,
    city: Option<&str>,
    min_severity: Option<&str>,
    output: Option<&Path>,
) -> CmdResult {
    let min_severity = min_severity.map(Severity::parse_label).transpose()?;
    let collection = app.dashboard.heatmap(city, min_severity)?;
    let json = serde_json::to_string_pretty(&collection)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!(
                "Wrote {} feature(s) to {}",
                collection.features.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_single_and_batched_detections() {
        let dir = std::env::temp_dir().join(format!("road_intel_cli_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let single = dir.join("single.json");
        std::fs::write(
            &single,
            r#"{"severity":"severe","confidence":0.91,"latitude":18.5204,"longitude":73.8567}"#,
        )
        .unwrap();
        let batch = dir.join("batch.json");
        std::fs::write(
            &batch,
            r#"[{"severity":"minor","confidence":0.5,"latitude":18.52,"longitude":73.85,"city":"pune"},
                {"severity":"moderate","confidence":0.7,"latitude":19.07,"longitude":72.87,"description":"near the bus stop"}]"#,
        )
        .unwrap();

        let one = read_detections(&single).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].severity, "severe");
        assert!(one[0].bounding_boxes.is_empty());

        let two = read_detections(&batch).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].description.as_deref(), Some("near the bus stop"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_detection_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("road_intel_bad_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"severity":"minor"}"#).unwrap();
        assert!(read_detections(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
