#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Pothole report types, severity labels and status transitions.
//!
//! A [`Report`] is one citizen submission: a detector-assigned
//! [`Severity`], a confidence score, validated [`Coordinates`] and an
//! optional free-text description. Reports are immutable apart from their
//! [`ReportStatus`], which only moves forward.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Ordinal defect severity assigned by the external detector.
///
/// Ordering follows the numeric value, so `Severe > Moderate > Minor`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    /// Surface wear, no immediate hazard
    Minor = 1,
    /// Noticeable pothole, should be queued for repair
    Moderate = 2,
    /// Hazardous defect, vehicle damage likely
    Severe = 3,
}

impl Severity {
    /// Returns the numeric rank of this severity (1-3).
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Heatmap weight for this severity.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Minor => 1.0,
            Self::Moderate => 2.0,
            Self::Severe => 3.0,
        }
    }

    /// Creates a severity from its numeric rank.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownSeverity`] if the rank is not 1-3.
    pub fn from_rank(rank: u8) -> Result<Self, ReportError> {
        match rank {
            1 => Ok(Self::Minor),
            2 => Ok(Self::Moderate),
            3 => Ok(Self::Severe),
            _ => Err(ReportError::UnknownSeverity {
                label: rank.to_string(),
            }),
        }
    }

    /// Maps a detector class id to a severity.
    ///
    /// The pothole detector is trained with class `0` = minor,
    /// `1` = moderate and `2` = severe.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownSeverity`] for any other class id.
    pub fn from_class_id(class_id: u32) -> Result<Self, ReportError> {
        match class_id {
            0 => Ok(Self::Minor),
            1 => Ok(Self::Moderate),
            2 => Ok(Self::Severe),
            other => Err(ReportError::UnknownSeverity {
                label: format!("class {other}"),
            }),
        }
    }

    /// Parses a detector severity label (`minor`, `moderate`, `severe`),
    /// ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownSeverity`] for any other label.
    pub fn parse_label(label: &str) -> Result<Self, ReportError> {
        Self::from_str(label.trim()).map_err(|_| ReportError::UnknownSeverity {
            label: label.to_string(),
        })
    }

    /// Returns all variants, lowest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Minor, Self::Moderate, Self::Severe]
    }
}

/// Lifecycle of a report as seen by the municipality.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ReportStatus {
    /// Submitted, nothing done yet
    Reported,
    /// Publicly escalated to the municipality
    Escalated,
    /// Repair crew assigned
    InRepair,
    /// Fixed
    Resolved,
}

impl ReportStatus {
    /// Whether a report may move from `self` to `next`.
    ///
    /// Transitions only move forward through
    /// `reported → escalated → in-repair → resolved`; skipping a step is
    /// allowed, staying put or going back is not.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next > self
    }

    /// Returns all variants in lifecycle order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Reported, Self::Escalated, Self::InRepair, Self::Resolved]
    }
}

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates validated coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidCoordinates`] if either value is not
    /// finite or is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ReportError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if valid {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(ReportError::InvalidCoordinates {
                latitude,
                longitude,
            })
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Unique report identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One citizen pothole submission in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Assigned at ingestion.
    pub id: ReportId,
    /// Where the photo was taken.
    pub coordinates: Coordinates,
    /// Detector-assigned severity.
    pub severity: Severity,
    /// Detector confidence, `0.0..=1.0`.
    pub confidence: f64,
    /// Optional free text from the citizen.
    pub description: Option<String>,
    /// Lower-case city label used to route escalations.
    pub city: String,
    /// Current lifecycle status.
    pub status: ReportStatus,
    /// Ingestion time.
    pub created_at: DateTime<Utc>,
}

/// Raw output of the external pothole detector for one image, plus the
/// metadata submitted alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// Severity label (`minor`, `moderate` or `severe`).
    pub severity: String,
    /// Detector confidence for the winning box.
    pub confidence: f64,
    /// Latitude of the submission.
    pub latitude: f64,
    /// Longitude of the submission.
    pub longitude: f64,
    /// Optional free text.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional city label; the configured default city is used when absent.
    #[serde(default)]
    pub city: Option<String>,
    /// Detected boxes as `[x1, y1, x2, y2]` pixel coordinates.
    #[serde(default)]
    pub bounding_boxes: Vec<[f64; 4]>,
}

/// One box emitted by the object detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    /// Model class id.
    pub class_id: u32,
    /// Box confidence.
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` pixel coordinates.
    pub bbox: [f64; 4],
}

impl DetectionResult {
    /// Builds a detection result from raw detector boxes.
    ///
    /// The highest-confidence box decides the severity, and its confidence
    /// is rounded to three decimals. A class id outside the trained classes
    /// is reported as `minor`. An image without any boxes is reported as
    /// `minor` with zero confidence.
    #[must_use]
    pub fn from_detections(
        detections: &[Detection],
        latitude: f64,
        longitude: f64,
        description: Option<String>,
    ) -> Self {
        let best = detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        let (severity, confidence) = best.map_or((Severity::Minor, 0.0), |d| {
            let severity = Severity::from_class_id(d.class_id).unwrap_or_else(|e| {
                log::warn!("{e}, reporting as minor");
                Severity::Minor
            });
            (severity, round_confidence(d.confidence))
        });

        Self {
            severity: severity.to_string(),
            confidence,
            latitude,
            longitude,
            description,
            city: None,
            bounding_boxes: detections.iter().map(|d| d.bbox).collect(),
        }
    }
}

fn round_confidence(confidence: f64) -> f64 {
    (confidence * 1000.0).round() / 1000.0
}

/// One entry of a report's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// The report that changed.
    pub report_id: ReportId,
    /// Status before the change.
    pub from: ReportStatus,
    /// Status after the change.
    pub to: ReportStatus,
    /// Optional note from the municipality.
    pub note: Option<String>,
    /// When the change was recorded.
    pub changed_at: DateTime<Utc>,
}

/// Validation failures for report data.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportError {
    /// Latitude/longitude out of range or not finite.
    InvalidCoordinates {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },
    /// Severity label is not one of the recognized labels.
    UnknownSeverity {
        /// The rejected label.
        label: String,
    },
    /// Confidence outside `0.0..=1.0`.
    InvalidConfidence {
        /// The rejected confidence.
        confidence: f64,
    },
    /// Status change that does not move forward.
    InvalidTransition {
        /// Current status.
        from: ReportStatus,
        /// Requested status.
        to: ReportStatus,
    },
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCoordinates {
                latitude,
                longitude,
            } => write!(
                f,
                "invalid coordinates ({latitude}, {longitude}): expected latitude -90..=90 and longitude -180..=180"
            ),
            Self::UnknownSeverity { label } => write!(
                f,
                "unknown severity '{label}': expected minor, moderate or severe"
            ),
            Self::InvalidConfidence { confidence } => {
                write!(f, "invalid confidence {confidence}: expected 0.0-1.0")
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid status transition {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for ReportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_rank() {
        assert!(Severity::Severe > Severity::Moderate);
        assert!(Severity::Moderate > Severity::Minor);
        for s in Severity::all() {
            assert_eq!(Severity::from_rank(s.rank()).unwrap(), *s);
        }
        assert!(Severity::from_rank(0).is_err());
        assert!(Severity::from_rank(4).is_err());
    }

    #[test]
    fn severity_labels_parse_case_insensitively() {
        assert_eq!(Severity::parse_label("severe").unwrap(), Severity::Severe);
        assert_eq!(Severity::parse_label(" Moderate ").unwrap(), Severity::Moderate);
        assert_eq!(Severity::parse_label("MINOR").unwrap(), Severity::Minor);
        assert_eq!(
            Severity::parse_label("critical"),
            Err(ReportError::UnknownSeverity {
                label: "critical".to_string()
            })
        );
    }

    #[test]
    fn class_ids_map_to_severity() {
        assert_eq!(Severity::from_class_id(0).unwrap(), Severity::Minor);
        assert_eq!(Severity::from_class_id(1).unwrap(), Severity::Moderate);
        assert_eq!(Severity::from_class_id(2).unwrap(), Severity::Severe);
        assert!(Severity::from_class_id(3).is_err());
    }

    #[test]
    fn status_only_moves_forward() {
        use ReportStatus::{Escalated, InRepair, Reported, Resolved};

        assert!(Reported.can_transition_to(Escalated));
        assert!(Reported.can_transition_to(Resolved));
        assert!(Escalated.can_transition_to(InRepair));
        assert!(InRepair.can_transition_to(Resolved));

        assert!(!Reported.can_transition_to(Reported));
        assert!(!InRepair.can_transition_to(Escalated));
        for status in ReportStatus::all() {
            assert!(!Resolved.can_transition_to(*status));
        }
    }

    #[test]
    fn status_serializes_kebab_case() {
        assert_eq!(ReportStatus::InRepair.to_string(), "in-repair");
        assert_eq!(
            serde_json::to_string(&ReportStatus::InRepair).unwrap(),
            "\"in-repair\""
        );
        assert_eq!(
            "in-repair".parse::<ReportStatus>().unwrap(),
            ReportStatus::InRepair
        );
    }

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(Coordinates::new(18.5204, 73.8567).is_ok());
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
        assert_eq!(
            Coordinates::new(91.0, 0.0),
            Err(ReportError::InvalidCoordinates {
                latitude: 91.0,
                longitude: 0.0
            })
        );
        assert!(Coordinates::new(0.0, 180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn highest_confidence_detection_wins() {
        let detections = [
            Detection {
                class_id: 0,
                confidence: 0.41,
                bbox: [0.0, 0.0, 10.0, 10.0],
            },
            Detection {
                class_id: 2,
                confidence: 0.87,
                bbox: [100.0, 200.0, 300.0, 400.0],
            },
        ];

        let result = DetectionResult::from_detections(&detections, 18.52, 73.85, None);
        assert_eq!(result.severity, "severe");
        assert!((result.confidence - 0.87).abs() < f64::EPSILON);
        assert_eq!(result.bounding_boxes.len(), 2);
    }

    #[test]
    fn unknown_class_id_is_reported_as_minor() {
        let detections = [
            Detection {
                class_id: 1,
                confidence: 0.3,
                bbox: [0.0, 0.0, 10.0, 10.0],
            },
            Detection {
                class_id: 7,
                confidence: 0.912_345,
                bbox: [5.0, 5.0, 50.0, 50.0],
            },
        ];

        let result = DetectionResult::from_detections(&detections, 18.52, 73.85, None);
        assert_eq!(result.severity, "minor");
        assert!((result.confidence - 0.912).abs() < 1e-9);
    }

    #[test]
    fn no_detections_is_minor() {
        let result = DetectionResult::from_detections(&[], 18.52, 73.85, None);
        assert_eq!(result.severity, "minor");
        assert!(result.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn detection_result_accepts_minimal_json() {
        let json = r#"{"severity":"moderate","confidence":0.9,"latitude":18.5,"longitude":73.8}"#;
        let result: DetectionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.description, None);
        assert_eq!(result.city, None);
        assert!(result.bounding_boxes.is_empty());
    }
}
