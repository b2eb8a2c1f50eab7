//! Read-side queries and status updates for the municipality dashboard.

use std::sync::Arc;

use chrono::Utc;
use geojson::FeatureCollection;
use road_intel_database::{DbError, Store, Write, WriteBatch};
use road_intel_hotspot_models::{
    DashboardSummary, Hotspot, HotspotFilter, NearbyReport, ReportFilter,
};
use road_intel_report_models::{
    Coordinates, Report, ReportError, ReportId, ReportStatus, Severity, StatusChange,
};
use road_intel_spatial::{bbox_around, haversine_km, heatmap};

use crate::{EngineConfig, EngineError};

/// Dashboard query facade over a [`Store`].
pub struct Dashboard {
    store: Arc<dyn Store>,
    config: Arc<EngineConfig>,
}

impl Dashboard {
    /// Creates a dashboard over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    /// Reports within `radius_km` of `center` (default from config),
    /// nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the query fails.
    pub fn nearby_reports(
        &self,
        center: Coordinates,
        radius_km: Option<f64>,
    ) -> Result<Vec<NearbyReport>, EngineError> {
        let radius_km = radius_km.unwrap_or(self.config.nearby_radius_km);
        let reports = self.store.query_reports(&ReportFilter {
            bbox: Some(bbox_around(center, radius_km * 1000.0)),
            ..ReportFilter::default()
        })?;

        let mut nearby: Vec<NearbyReport> = reports
            .into_iter()
            .filter_map(|report| {
                let distance_km = haversine_km(center, report.coordinates);
                (distance_km <= radius_km).then_some(NearbyReport {
                    report,
                    distance_km,
                })
            })
            .collect();
        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.report.created_at.cmp(&b.report.created_at))
        });
        Ok(nearby)
    }

    /// A report and its status history, oldest change first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReportNotFound`] for unknown ids.
    pub fn report_with_history(
        &self,
        id: ReportId,
    ) -> Result<(Report, Vec<StatusChange>), EngineError> {
        let report = self
            .store
            .report(id)?
            .ok_or(EngineError::ReportNotFound(id))?;
        let history = self.store.status_history(id)?;
        Ok((report, history))
    }

    /// Moves a report forward in its lifecycle and records the change.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReportNotFound`] for unknown ids and
    /// [`ReportError::InvalidTransition`] for backward or no-op moves,
    /// including when another update won the race.
    pub fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
        note: Option<String>,
    ) -> Result<StatusChange, EngineError> {
        let report = self
            .store
            .report(id)?
            .ok_or(EngineError::ReportNotFound(id))?;

        let invalid = |from| ReportError::InvalidTransition { from, to: status };
        if !report.status.can_transition_to(status) {
            return Err(invalid(report.status).into());
        }

        let change = StatusChange {
            report_id: id,
            from: report.status,
            to: status,
            note: note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            changed_at: Utc::now(),
        };

        match self
            .store
            .commit(WriteBatch::new().with(Write::ChangeReportStatus(change.clone())))
        {
            Ok(()) => {
                log::info!("Report {id}: {} -> {status}", change.from);
                Ok(change)
            }
            Err(DbError::Conflict { message }) => {
                log::warn!("Concurrent status update on report {id}: {message}");
                let current = self.store.report(id)?.map_or(report.status, |r| r.status);
                Err(invalid(current).into())
            }
            Err(DbError::NotFound { .. }) => Err(EngineError::ReportNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Hotspots in priority order, escalated ones included.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the query fails.
    pub fn priority_list(
        &self,
        city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Hotspot>, EngineError> {
        Ok(self.store.query_hotspots(&HotspotFilter {
            city: city.map(str::to_lowercase),
            limit: Some(limit),
            ..HotspotFilter::default()
        })?)
    }

    /// Report and hotspot counts, optionally for one city.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if a query fails.
    pub fn dashboard_summary(&self, city: Option<&str>) -> Result<DashboardSummary, EngineError> {
        let city = city.map(str::to_lowercase);
        let reports = self.store.query_reports(&ReportFilter {
            city: city.clone(),
            ..ReportFilter::default()
        })?;
        let hotspots = self.store.query_hotspots(&HotspotFilter {
            city: city.clone(),
            ..HotspotFilter::default()
        })?;

        let mut reports_by_status = ReportStatus::all()
            .iter()
            .map(|s| (*s, 0))
            .collect::<std::collections::BTreeMap<_, _>>();
        for report in &reports {
            *reports_by_status.entry(report.status).or_default() += 1;
        }

        let threshold = self.config.hotspot_threshold;
        Ok(DashboardSummary {
            city,
            reports_by_status,
            total_reports: reports.len(),
            hotspots: hotspots.len(),
            escalated_hotspots: hotspots.iter().filter(|h| h.escalated).count(),
            pending_hotspots: hotspots
                .iter()
                .filter(|h| !h.escalated && h.report_count() >= threshold)
                .count(),
        })
    }

    /// Weighted GeoJSON points for a heatmap layer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the query fails.
    pub fn heatmap(
        &self,
        city: Option<&str>,
        min_severity: Option<Severity>,
    ) -> Result<FeatureCollection, EngineError> {
        let reports = self.store.query_reports(&ReportFilter {
            city: city.map(str::to_lowercase),
            min_severity,
            ..ReportFilter::default()
        })?;
        Ok(heatmap::feature_collection(&reports))
    }
}
