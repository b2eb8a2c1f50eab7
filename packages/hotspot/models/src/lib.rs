#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Hotspot aggregation, escalation outcome and outbox types.
//!
//! A [`Hotspot`] groups reports judged to describe the same physical
//! defect. These types are shared by the aggregation engine, the
//! persistence layer and the CLI; they carry no behaviour beyond the
//! canonical [`priority_order`] used everywhere hotspots are ranked.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use road_intel_report_models::{Coordinates, Report, ReportId, ReportStatus, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique hotspot identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HotspotId(pub Uuid);

impl HotspotId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HotspotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HotspotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for HotspotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique outbox entry identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OutboxId(pub Uuid);

impl OutboxId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OutboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OutboxId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reports aggregated around one physical defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    /// Assigned when the first report founds the hotspot.
    pub id: HotspotId,
    /// Member reports. Never empty.
    pub member_report_ids: BTreeSet<ReportId>,
    /// Running centroid of the members' coordinates.
    pub representative_coordinates: Coordinates,
    /// Highest severity among members.
    pub max_severity: Severity,
    /// Set once a public escalation was published. Never reset.
    pub escalated: bool,
    /// When the escalation was published.
    pub escalated_at: Option<DateTime<Utc>>,
    /// City label used to pick the municipal handle.
    pub city: String,
    /// First non-blank description among members.
    pub representative_text: Option<String>,
    /// When the hotspot was founded.
    pub created_at: DateTime<Utc>,
    /// When the last member joined.
    pub updated_at: DateTime<Utc>,
}

impl Hotspot {
    /// Number of member reports, always derived from the membership set.
    #[must_use]
    pub fn report_count(&self) -> usize {
        self.member_report_ids.len()
    }
}

/// Canonical priority ranking: highest severity first, then most reports,
/// then oldest, then by id so the order is total.
#[must_use]
pub fn priority_order(a: &Hotspot, b: &Hotspot) -> Ordering {
    b.max_severity
        .cmp(&a.max_severity)
        .then_with(|| b.report_count().cmp(&a.report_count()))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Whether the point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, coordinates: Coordinates) -> bool {
        (self.south..=self.north).contains(&coordinates.latitude)
            && (self.west..=self.east).contains(&coordinates.longitude)
    }
}

/// Parameters for querying hotspots. Results are always returned in
/// [`priority_order`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotspotFilter {
    /// Only hotspots with at least this many members.
    pub min_report_count: usize,
    /// Drop hotspots that were already escalated.
    pub exclude_escalated: bool,
    /// Only hotspots routed to this city.
    pub city: Option<String>,
    /// Only hotspots founded at or after this instant.
    pub created_since: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl HotspotFilter {
    /// Whether a hotspot passes every predicate of the filter (ignores
    /// `limit`).
    #[must_use]
    pub fn matches(&self, hotspot: &Hotspot) -> bool {
        hotspot.report_count() >= self.min_report_count
            && !(self.exclude_escalated && hotspot.escalated)
            && self.city.as_ref().is_none_or(|c| *c == hotspot.city)
            && self.created_since.is_none_or(|t| hotspot.created_at >= t)
    }
}

/// Parameters for querying reports. Results are ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Spatial bounding box filter.
    pub bbox: Option<BoundingBox>,
    /// Only reports routed to this city.
    pub city: Option<String>,
    /// Minimum severity.
    pub min_severity: Option<Severity>,
}

impl ReportFilter {
    /// Whether a report passes every predicate of the filter.
    #[must_use]
    pub fn matches(&self, report: &Report) -> bool {
        self.bbox.is_none_or(|b| b.contains(report.coordinates))
            && self.city.as_ref().is_none_or(|c| *c == report.city)
            && self.min_severity.is_none_or(|s| report.severity >= s)
    }
}

/// A pending escalation request written together with the absorb that made
/// a hotspot cross the escalation threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Entry id.
    pub id: OutboxId,
    /// Hotspot to escalate.
    pub hotspot_id: HotspotId,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// Number of failed delivery attempts so far.
    pub attempts: u32,
    /// Error of the last failed attempt.
    pub last_error: Option<String>,
}

/// Why a single hotspot escalation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    /// The external notifier rejected or failed to publish the message.
    NotifierFailure,
    /// The message generator failed to produce text.
    MessageFailure,
    /// Reading or committing escalation state failed.
    PersistenceFailure,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotifierFailure => "notifier failure",
            Self::MessageFailure => "message generation failure",
            Self::PersistenceFailure => "persistence failure",
        })
    }
}

/// What happened to one hotspot during an escalation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutcomeStatus {
    /// Published and committed.
    Escalated {
        /// The message that was published.
        message: String,
    },
    /// Attempted but failed; the hotspot stays unescalated.
    Failed {
        /// Failure category.
        reason: FailureReason,
        /// Error detail.
        error: String,
    },
    /// Not attempted (already escalated or claimed by a concurrent run).
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

/// Result of processing one hotspot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationOutcome {
    /// The hotspot processed.
    pub hotspot_id: HotspotId,
    /// Municipal handle the message was addressed to, if resolved.
    pub handle: Option<String>,
    /// Outcome.
    pub status: OutcomeStatus,
}

/// Operator-visible summary of one escalation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,
    /// Per-hotspot outcomes in processing order.
    pub outcomes: Vec<EscalationOutcome>,
}

impl CycleReport {
    /// Hotspots for which a notification was attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded() + self.failures().count()
    }

    /// Hotspots escalated in this cycle.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Escalated { .. }))
            .count()
    }

    /// Hotspots skipped without an attempt.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Skipped { .. }))
            .count()
    }

    /// Failed hotspots with their reason and error detail.
    pub fn failures(&self) -> impl Iterator<Item = (HotspotId, FailureReason, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            OutcomeStatus::Failed { reason, error } => Some((o.hotspot_id, *reason, error.as_str())),
            _ => None,
        })
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attempted {}, succeeded {}, failed {}, skipped {}",
            self.attempted(),
            self.succeeded(),
            self.failures().count(),
            self.skipped()
        )
    }
}

/// A report returned by a radius search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyReport {
    /// The report.
    pub report: Report,
    /// Great-circle distance from the search center in kilometers.
    pub distance_km: f64,
}

/// Aggregate counts for the municipality dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// City the summary is restricted to, if any.
    pub city: Option<String>,
    /// Report counts keyed by status.
    pub reports_by_status: BTreeMap<ReportStatus, usize>,
    /// Total reports.
    pub total_reports: usize,
    /// Total hotspots.
    pub hotspots: usize,
    /// Hotspots already escalated.
    pub escalated_hotspots: usize,
    /// Unescalated hotspots at or above the escalation threshold.
    pub pending_hotspots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hotspot(severity: Severity, count: usize, minute: u32) -> Hotspot {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap();
        Hotspot {
            id: HotspotId::new(),
            member_report_ids: (0..count).map(|_| ReportId::new()).collect(),
            representative_coordinates: Coordinates::new(18.5204, 73.8567).unwrap(),
            max_severity: severity,
            escalated: false,
            escalated_at: None,
            city: "pune".to_string(),
            representative_text: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn priority_order_ranks_severity_then_count() {
        let mut hotspots = vec![
            hotspot(Severity::Severe, 2, 0),
            hotspot(Severity::Moderate, 5, 1),
            hotspot(Severity::Severe, 5, 2),
        ];
        hotspots.sort_by(priority_order);

        let ranked: Vec<(Severity, usize)> = hotspots
            .iter()
            .map(|h| (h.max_severity, h.report_count()))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (Severity::Severe, 5),
                (Severity::Severe, 2),
                (Severity::Moderate, 5)
            ]
        );
    }

    #[test]
    fn priority_order_breaks_ties_on_age() {
        let older = hotspot(Severity::Minor, 3, 0);
        let newer = hotspot(Severity::Minor, 3, 5);
        assert_eq!(priority_order(&older, &newer), Ordering::Less);
    }

    #[test]
    fn filter_excludes_escalated_and_small_hotspots() {
        let mut escalated = hotspot(Severity::Severe, 4, 0);
        escalated.escalated = true;
        let small = hotspot(Severity::Severe, 1, 0);
        let eligible = hotspot(Severity::Minor, 2, 0);

        let filter = HotspotFilter {
            min_report_count: 2,
            exclude_escalated: true,
            ..HotspotFilter::default()
        };

        assert!(!filter.matches(&escalated));
        assert!(!filter.matches(&small));
        assert!(filter.matches(&eligible));
    }

    #[test]
    fn cycle_report_counts() {
        let id = HotspotId::new();
        let report = CycleReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![
                EscalationOutcome {
                    hotspot_id: id,
                    handle: Some("@PuneMunicipal".to_string()),
                    status: OutcomeStatus::Escalated {
                        message: "hi".to_string(),
                    },
                },
                EscalationOutcome {
                    hotspot_id: HotspotId::new(),
                    handle: Some("@mybmc".to_string()),
                    status: OutcomeStatus::Failed {
                        reason: FailureReason::NotifierFailure,
                        error: "503".to_string(),
                    },
                },
                EscalationOutcome {
                    hotspot_id: HotspotId::new(),
                    handle: None,
                    status: OutcomeStatus::Skipped {
                        reason: "claimed".to_string(),
                    },
                },
            ],
        };

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, FailureReason::NotifierFailure);
        assert_eq!(
            report.to_string(),
            "attempted 2, succeeded 1, failed 1, skipped 1"
        );
    }
}
