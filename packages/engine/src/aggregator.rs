//! Hotspot aggregation.
//!
//! Each report joins the nearest open hotspot whose centroid lies within
//! `radius_m`, or whose representative text scores at least
//! `similarity_threshold` against the report's description. Open hotspots
//! are those founded within the recency window. A report without a match
//! founds a new hotspot. Hotspots are never merged.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use road_intel_database::{Store, Write, WriteBatch};
use road_intel_hotspot_models::{Hotspot, HotspotFilter, HotspotId, OutboxEntry, OutboxId};
use road_intel_report_models::{Coordinates, Report};
use road_intel_spatial::{PointIndex, haversine_m};
use tokio::sync::Mutex;

use crate::collaborators::TextSimilarity;
use crate::{EngineConfig, EngineError};

/// Groups reports into hotspots and owns hotspot lifecycle.
pub struct Aggregator {
    store: Arc<dyn Store>,
    similarity: Arc<dyn TextSimilarity>,
    config: Arc<EngineConfig>,
    /// Serializes absorbs so concurrent reports of one defect cannot both
    /// found a hotspot.
    gate: Mutex<()>,
}

/// A candidate hotspot and its distance from the report.
struct Candidate<'a> {
    hotspot: &'a Hotspot,
    distance_m: f64,
}

impl Candidate<'_> {
    /// Nearest first; ties go to the older hotspot, then the smaller id.
    fn cmp_preference(&self, other: &Self) -> Ordering {
        self.distance_m
            .total_cmp(&other.distance_m)
            .then_with(|| self.hotspot.created_at.cmp(&other.hotspot.created_at))
            .then_with(|| self.hotspot.id.cmp(&other.hotspot.id))
    }
}

impl Aggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        similarity: Arc<dyn TextSimilarity>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            similarity,
            config,
            gate: Mutex::new(()),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stores `report` and adds it to the best matching open hotspot, or to
    /// a new one.
    ///
    /// The report, the updated hotspot and (when this report makes the
    /// hotspot reach the escalation threshold) an outbox entry are
    /// committed as one batch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if reading or committing fails;
    /// nothing is stored in that case.
    pub async fn absorb(&self, report: Report) -> Result<Hotspot, EngineError> {
        let _gate = self.gate.lock().await;

        let open = self.store.query_hotspots(&HotspotFilter {
            created_since: Some(
                report
                    .created_at
                    .checked_sub_signed(self.config.recency_window())
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            ..HotspotFilter::default()
        })?;

        let mut candidates = self.spatial_candidates(&report, &open);
        for candidate in self.text_candidates(&report, &open).await {
            if !candidates.iter().any(|c| c.hotspot.id == candidate.hotspot.id) {
                candidates.push(candidate);
            }
        }

        let best = candidates.into_iter().min_by(Candidate::cmp_preference);

        let (hotspot, joined) = match best {
            Some(candidate) => {
                log::debug!(
                    "Report {} matches hotspot {} at {:.1}m",
                    report.id,
                    candidate.hotspot.id,
                    candidate.distance_m
                );
                (join(candidate.hotspot.clone(), &report), true)
            }
            None => (found(&report), false),
        };

        let mut batch = WriteBatch::new()
            .with(Write::InsertReport(report.clone()))
            .with(Write::PutHotspot(hotspot.clone()));

        if !hotspot.escalated && hotspot.report_count() == self.config.hotspot_threshold {
            log::info!(
                "Hotspot {} reached {} reports, queueing escalation",
                hotspot.id,
                hotspot.report_count()
            );
            batch.push(Write::PutOutbox(OutboxEntry {
                id: OutboxId::new(),
                hotspot_id: hotspot.id,
                created_at: report.created_at,
                attempts: 0,
                last_error: None,
            }));
        }

        self.store.commit(batch)?;

        if joined {
            log::debug!(
                "Report {} joined hotspot {} ({} reports, max {})",
                report.id,
                hotspot.id,
                hotspot.report_count(),
                hotspot.max_severity
            );
        } else {
            log::debug!("Report {} founded hotspot {}", report.id, hotspot.id);
        }
        Ok(hotspot)
    }

    /// Open hotspots whose centroid lies within the clustering radius.
    fn spatial_candidates<'a>(&self, report: &Report, open: &'a [Hotspot]) -> Vec<Candidate<'a>> {
        let index = PointIndex::new(
            open.iter()
                .map(|hotspot| (hotspot.representative_coordinates, hotspot)),
        );

        index
            .within_radius(report.coordinates, self.config.radius_m)
            .into_iter()
            .map(|(hotspot, distance_m)| Candidate {
                hotspot: *hotspot,
                distance_m,
            })
            .collect()
    }

    /// Open hotspots whose text is similar enough to the report's.
    ///
    /// A failing similarity service degrades to distance-only matching.
    async fn text_candidates<'a>(&self, report: &Report, open: &'a [Hotspot]) -> Vec<Candidate<'a>> {
        let Some(text) = report.description.as_deref() else {
            return Vec::new();
        };

        let with_text: Vec<(&Hotspot, String)> = open
            .iter()
            .filter_map(|h| {
                h.representative_text
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| (h, t.to_string()))
            })
            .collect();
        if with_text.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = with_text.iter().map(|(_, t)| t.clone()).collect();
        let scores = match self.similarity.scores(text, &texts).await {
            Ok(scores) if scores.len() == texts.len() => scores,
            Ok(scores) => {
                log::warn!(
                    "Similarity returned {} scores for {} texts, matching by distance only",
                    scores.len(),
                    texts.len()
                );
                return Vec::new();
            }
            Err(e) => {
                log::warn!("Similarity unavailable, matching by distance only: {e}");
                return Vec::new();
            }
        };

        with_text
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.config.similarity_threshold)
            .map(|((hotspot, _), _)| Candidate {
                hotspot,
                distance_m: haversine_m(report.coordinates, hotspot.representative_coordinates),
            })
            .collect()
    }

    /// Hotspots with at least `min_report_count` members, in priority
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the query fails.
    pub fn pending_hotspots(
        &self,
        min_report_count: usize,
        exclude_escalated: bool,
    ) -> Result<Vec<Hotspot>, EngineError> {
        Ok(self.store.query_hotspots(&HotspotFilter {
            min_report_count,
            exclude_escalated,
            ..HotspotFilter::default()
        })?)
    }

    /// Loads a hotspot by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::HotspotNotFound`] for unknown ids.
    pub fn hotspot(&self, id: HotspotId) -> Result<Hotspot, EngineError> {
        self.store
            .hotspot(id)?
            .ok_or(EngineError::HotspotNotFound(id))
    }
}

/// A new hotspot with `report` as its only member.
fn found(report: &Report) -> Hotspot {
    Hotspot {
        id: HotspotId::new(),
        member_report_ids: std::iter::once(report.id).collect(),
        representative_coordinates: report.coordinates,
        max_severity: report.severity,
        escalated: false,
        escalated_at: None,
        city: report.city.clone(),
        representative_text: report.description.clone(),
        created_at: report.created_at,
        updated_at: report.created_at,
    }
}

/// Adds `report` to `hotspot`, moving the centroid and raising severity.
fn join(mut hotspot: Hotspot, report: &Report) -> Hotspot {
    hotspot.member_report_ids.insert(report.id);

    #[allow(clippy::cast_precision_loss)]
    let n = hotspot.report_count() as f64;
    let centroid = hotspot.representative_coordinates;
    hotspot.representative_coordinates = Coordinates {
        latitude: centroid.latitude + (report.coordinates.latitude - centroid.latitude) / n,
        longitude: centroid.longitude + (report.coordinates.longitude - centroid.longitude) / n,
    };

    hotspot.max_severity = hotspot.max_severity.max(report.severity);
    if hotspot.representative_text.is_none() {
        hotspot.representative_text.clone_from(&report.description);
    }
    hotspot.updated_at = hotspot.updated_at.max(report.created_at);
    hotspot
}
