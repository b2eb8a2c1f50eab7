//! Report ingestion: detector output in, canonical report out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use road_intel_report_models::{
    Coordinates, DetectionResult, Report, ReportError, ReportId, ReportStatus, Severity,
};

use crate::{Aggregator, EngineError};

/// Normalizes a detection result into a new [`Report`].
///
/// Blank descriptions and city labels are treated as absent; the city is
/// lower-cased and falls back to `default_city`.
///
/// # Errors
///
/// Returns [`ReportError`] for invalid coordinates, an unknown severity
/// label or a confidence outside `0.0..=1.0`.
pub fn normalize(
    detection: &DetectionResult,
    default_city: &str,
    now: DateTime<Utc>,
) -> Result<Report, ReportError> {
    let coordinates = Coordinates::new(detection.latitude, detection.longitude)?;
    let severity = Severity::parse_label(&detection.severity)?;

    if !(0.0..=1.0).contains(&detection.confidence) {
        return Err(ReportError::InvalidConfidence {
            confidence: detection.confidence,
        });
    }

    let description = detection
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(ToString::to_string);

    let city = detection
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default_city)
        .to_lowercase();

    Ok(Report {
        id: ReportId::new(),
        coordinates,
        severity,
        confidence: detection.confidence,
        description,
        city,
        status: ReportStatus::Reported,
        created_at: now,
    })
}

/// Entry point for detector results.
pub struct Ingestor {
    aggregator: Arc<Aggregator>,
}

impl Ingestor {
    /// Creates an ingestor feeding `aggregator`.
    #[must_use]
    pub const fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    /// Validates a detection result, stores it as a report and absorbs it
    /// into a hotspot.
    ///
    /// Rejected detections leave no trace in the store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Report`] if the detection is invalid, or
    /// [`EngineError::Persistence`] if the absorb could not be committed.
    pub async fn ingest(&self, detection: &DetectionResult) -> Result<Report, EngineError> {
        let report = normalize(
            detection,
            &self.aggregator.config().default_city,
            Utc::now(),
        )
        .inspect_err(|e| log::warn!("Rejected detection: {e}"))?;

        let hotspot = self.aggregator.absorb(report.clone()).await?;
        log::info!(
            "Ingested report {} ({}) into hotspot {} ({} reports)",
            report.id,
            report.severity,
            hotspot.id,
            hotspot.report_count()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use crate::collaborators::NoTextSimilarity;
    use road_intel_database::{MemoryStore, Store};
    use road_intel_hotspot_models::{HotspotFilter, ReportFilter};

    fn detection(severity: &str, lat: f64, lng: f64) -> DetectionResult {
        DetectionResult {
            severity: severity.to_string(),
            confidence: 0.87,
            latitude: lat,
            longitude: lng,
            description: None,
            city: None,
            bounding_boxes: vec![[100.0, 200.0, 300.0, 400.0]],
        }
    }

    fn ingestor(store: Arc<MemoryStore>) -> Ingestor {
        let aggregator = Aggregator::new(
            store,
            Arc::new(NoTextSimilarity),
            Arc::new(EngineConfig::default()),
        );
        Ingestor::new(Arc::new(aggregator))
    }

    #[test]
    fn normalizes_labels_text_and_city() {
        let mut d = detection("  SEVERE ", 18.5204, 73.8567);
        d.description = Some("   ".to_string());
        d.city = Some(" Mumbai ".to_string());

        let report = normalize(&d, "pune", Utc::now()).unwrap();
        assert_eq!(report.severity, Severity::Severe);
        assert_eq!(report.description, None);
        assert_eq!(report.city, "mumbai");
        assert_eq!(report.status, ReportStatus::Reported);

        let report = normalize(&detection("minor", 0.0, 0.0), "pune", Utc::now()).unwrap();
        assert_eq!(report.city, "pune");
    }

    #[test]
    fn rejects_invalid_coordinates() {
        let err = normalize(&detection("minor", 91.0, 0.0), "pune", Utc::now()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidCoordinates { .. }));

        let err = normalize(&detection("minor", 0.0, -180.5), "pune", Utc::now()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidCoordinates { .. }));

        let err = normalize(&detection("minor", f64::NAN, 0.0), "pune", Utc::now()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidCoordinates { .. }));
    }

    #[test]
    fn accepts_range_edges() {
        assert!(normalize(&detection("minor", 90.0, 180.0), "pune", Utc::now()).is_ok());
        assert!(normalize(&detection("minor", -90.0, -180.0), "pune", Utc::now()).is_ok());
    }

    #[test]
    fn rejects_unknown_severity_and_confidence() {
        let err = normalize(&detection("critical", 18.5, 73.8), "pune", Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ReportError::UnknownSeverity {
                label: "critical".to_string()
            }
        );

        let mut d = detection("minor", 18.5, 73.8);
        d.confidence = 1.2;
        assert!(matches!(
            normalize(&d, "pune", Utc::now()),
            Err(ReportError::InvalidConfidence { .. })
        ));
        d.confidence = f64::NAN;
        assert!(matches!(
            normalize(&d, "pune", Utc::now()),
            Err(ReportError::InvalidConfidence { .. })
        ));
    }

    #[tokio::test]
    async fn ingest_persists_report_and_hotspot() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        let report = ingestor
            .ingest(&detection("moderate", 18.5204, 73.8567))
            .await
            .unwrap();

        assert_eq!(store.report(report.id).unwrap(), Some(report.clone()));
        let hotspots = store.query_hotspots(&HotspotFilter::default()).unwrap();
        assert_eq!(hotspots.len(), 1);
        assert!(hotspots[0].member_report_ids.contains(&report.id));
    }

    #[tokio::test]
    async fn rejected_detection_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        let err = ingestor
            .ingest(&detection("minor", 91.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Report(ReportError::InvalidCoordinates { .. })
        ));
        assert!(store.query_reports(&ReportFilter::default()).unwrap().is_empty());
        assert!(store.query_hotspots(&HotspotFilter::default()).unwrap().is_empty());
    }
}
