//! Escalation of pending hotspots to municipal accounts.
//!
//! A hotspot moves `unescalated → claimed → escalated`. The claim is a
//! compare-and-set in the store, so overlapping cycles (or a cycle racing
//! the outbox worker) never notify twice for one hotspot. A failed
//! notification releases the claim and the hotspot resurfaces next cycle.

use std::sync::Arc;

use chrono::Utc;
use road_intel_database::Store;
use road_intel_hotspot_models::{
    CycleReport, EscalationOutcome, FailureReason, Hotspot, HotspotFilter, HotspotId,
    OutcomeStatus,
};

use crate::collaborators::{
    LocationExtractor, LocationNamer, MessageGenerator, MessageRequest, Notifier,
};
use crate::{EngineConfig, EngineError};

/// Builds the published message: `"{handle} {text}"`, cut to `max_chars`
/// characters.
#[must_use]
pub fn compose_message(handle: &str, text: &str, max_chars: usize) -> String {
    let full = format!("{handle} {}", text.trim());
    if full.chars().count() <= max_chars {
        return full;
    }
    full.chars().take(max_chars).collect()
}

/// Publishes eligible hotspots through a [`Notifier`].
pub struct EscalationEngine {
    pub(crate) store: Arc<dyn Store>,
    namer: Arc<dyn LocationNamer>,
    extractor: Option<Arc<dyn LocationExtractor>>,
    generator: Arc<dyn MessageGenerator>,
    config: Arc<EngineConfig>,
}

impl EscalationEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        namer: Arc<dyn LocationNamer>,
        generator: Arc<dyn MessageGenerator>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            namer,
            extractor: None,
            generator,
            config,
        }
    }

    /// Names hotspots from their report text when the [`LocationNamer`]
    /// fails.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn LocationExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Escalates every unescalated hotspot with at least `threshold`
    /// reports, in priority order.
    ///
    /// Failures are recorded per hotspot and never stop the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] only if the pending hotspots
    /// cannot be listed.
    pub async fn run_escalation_cycle(
        &self,
        threshold: usize,
        notifier: &dyn Notifier,
    ) -> Result<CycleReport, EngineError> {
        let started_at = Utc::now();
        let pending = self.store.query_hotspots(&HotspotFilter {
            min_report_count: threshold,
            exclude_escalated: true,
            ..HotspotFilter::default()
        })?;
        log::info!(
            "Escalation cycle: {} pending hotspots at threshold {threshold}",
            pending.len()
        );

        let mut outcomes = Vec::with_capacity(pending.len());
        for hotspot in &pending {
            outcomes.push(self.escalate(hotspot.id, notifier).await);
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        log::info!("Escalation cycle finished: {report}");
        Ok(report)
    }

    /// Claims, notifies and commits a single hotspot.
    pub(crate) async fn escalate(&self, id: HotspotId, notifier: &dyn Notifier) -> EscalationOutcome {
        match self
            .store
            .try_claim_escalation(id, Utc::now(), self.config.claim_lease())
        {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Hotspot {id} already escalated or claimed, skipping");
                return outcome(
                    id,
                    None,
                    OutcomeStatus::Skipped {
                        reason: "already escalated or claimed".to_string(),
                    },
                );
            }
            Err(e) => {
                log::error!("Failed to claim hotspot {id}: {e}");
                return failed(id, None, FailureReason::PersistenceFailure, &e);
            }
        }

        // Re-read after claiming so the message reflects current membership.
        let hotspot = match self.store.hotspot(id) {
            Ok(Some(hotspot)) => hotspot,
            Ok(None) => {
                self.release(id);
                return outcome(
                    id,
                    None,
                    OutcomeStatus::Skipped {
                        reason: "hotspot no longer exists".to_string(),
                    },
                );
            }
            Err(e) => {
                self.release(id);
                return failed(id, None, FailureReason::PersistenceFailure, &e);
            }
        };

        let handle = self.config.handle_for(&hotspot.city).to_string();
        let text = match self.draft(&hotspot).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Message generation failed for hotspot {id}: {e}");
                self.release(id);
                return failed(id, Some(handle), FailureReason::MessageFailure, &e);
            }
        };

        let message = compose_message(&handle, &text, self.config.message_max_chars);
        if let Err(e) = notifier.publish(&message).await {
            log::warn!("Notifier failed for hotspot {id}: {e}");
            self.release(id);
            return failed(id, Some(handle), FailureReason::NotifierFailure, &e);
        }

        match self.store.complete_escalation(id, Utc::now()) {
            Ok(true) => {
                log::info!(
                    "Escalated hotspot {id} ({} reports, {}) to {handle}",
                    hotspot.report_count(),
                    hotspot.max_severity
                );
            }
            Ok(false) => {
                log::warn!("Hotspot {id} was escalated concurrently after its claim expired");
            }
            Err(e) => {
                // The claim stays until its lease expires.
                log::error!("Published for hotspot {id} but failed to record it: {e}");
                return failed(id, Some(handle), FailureReason::PersistenceFailure, &e);
            }
        }

        outcome(id, Some(handle), OutcomeStatus::Escalated { message })
    }

    /// Names the location and asks the generator for message text.
    async fn draft(
        &self,
        hotspot: &Hotspot,
    ) -> Result<String, crate::collaborators::CollaboratorError> {
        let location = self.location(hotspot).await;

        let text = self
            .generator
            .generate(&MessageRequest {
                location,
                report_count: hotspot.report_count(),
                severity: hotspot.max_severity,
            })
            .await?;

        if text.trim().is_empty() {
            return Err(crate::collaborators::CollaboratorError::InvalidResponse {
                service: "message generator".to_string(),
                message: "empty message".to_string(),
            });
        }
        Ok(text)
    }

    /// Reverse-geocoded name, then place names mentioned in the report
    /// text, then the coordinates.
    async fn location(&self, hotspot: &Hotspot) -> String {
        let coordinates = hotspot.representative_coordinates;
        match self.namer.name(coordinates).await {
            Ok(name) if !name.trim().is_empty() => return name.trim().to_string(),
            Ok(_) => log::debug!("Empty location name for hotspot {}", hotspot.id),
            Err(e) => log::warn!("Location lookup failed for hotspot {}: {e}", hotspot.id),
        }

        if let (Some(extractor), Some(text)) = (&self.extractor, &hotspot.representative_text) {
            match extractor.extract(text).await {
                Ok(tags) if !tags.is_empty() => return tags.join(", "),
                Ok(_) => {}
                Err(e) => log::warn!(
                    "Location extraction failed for hotspot {}: {e}",
                    hotspot.id
                ),
            }
        }

        coordinates.to_string()
    }

    fn release(&self, id: HotspotId) {
        if let Err(e) = self.store.release_escalation_claim(id) {
            log::warn!("Failed to release claim on hotspot {id}: {e}");
        }
    }
}

const fn outcome(
    hotspot_id: HotspotId,
    handle: Option<String>,
    status: OutcomeStatus,
) -> EscalationOutcome {
    EscalationOutcome {
        hotspot_id,
        handle,
        status,
    }
}

fn failed(
    hotspot_id: HotspotId,
    handle: Option<String>,
    reason: FailureReason,
    error: &dyn std::fmt::Display,
) -> EscalationOutcome {
    outcome(
        hotspot_id,
        handle,
        OutcomeStatus::Failed {
            reason,
            error: error.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Aggregator;
    use crate::collaborators::fakes::{
        FailingNamer, FixedExtractor, FixedGenerator, RecordingNotifier,
    };
    use crate::collaborators::{CoordinateNamer, NoTextSimilarity, TemplateMessageGenerator};
    use crate::test_support::{PUNE, report_at};
    use road_intel_database::MemoryStore;
    use road_intel_report_models::{Report, Severity};

    struct Fixture {
        store: Arc<MemoryStore>,
        aggregator: Aggregator,
        engine: EscalationEngine,
    }

    fn fixture_with(
        namer: Arc<dyn LocationNamer>,
        generator: Arc<dyn MessageGenerator>,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(EngineConfig::default());
        let aggregator = Aggregator::new(store.clone(), Arc::new(NoTextSimilarity), config.clone());
        let engine = EscalationEngine::new(store.clone(), namer, generator, config);
        Fixture {
            store,
            aggregator,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(CoordinateNamer), Arc::new(TemplateMessageGenerator))
    }

    async fn seed(aggregator: &Aggregator, lat: f64, lng: f64, severities: &[Severity], city: &str) -> HotspotId {
        let mut id = None;
        for (i, severity) in severities.iter().enumerate() {
            let report = Report {
                city: city.to_string(),
                ..report_at(lat, lng, *severity, i64::try_from(i).unwrap())
            };
            id = Some(aggregator.absorb(report).await.unwrap().id);
        }
        id.unwrap()
    }

    #[test]
    fn compose_counts_characters_including_handle() {
        let text = "ä".repeat(400);
        let message = compose_message("@PuneMunicipal", &text, 280);
        assert_eq!(message.chars().count(), 280);
        assert!(message.starts_with("@PuneMunicipal ä"));

        let short = compose_message("@mybmc", "  Fix the road  ", 280);
        assert_eq!(short, "@mybmc Fix the road");
    }

    #[tokio::test]
    async fn escalates_eligible_hotspot_once() {
        let f = fixture();
        let id = seed(
            &f.aggregator,
            PUNE.0,
            PUNE.1,
            &[Severity::Minor, Severity::Severe, Severity::Moderate],
            "pune",
        )
        .await;

        let notifier = RecordingNotifier::default();
        let first = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        assert_eq!(first.succeeded(), 1);
        assert_eq!(first.outcomes[0].hotspot_id, id);
        assert_eq!(first.outcomes[0].handle.as_deref(), Some("@PuneMunicipal"));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("@PuneMunicipal URGENT"), "{}", messages[0]);
        assert!(messages[0].contains("18.5204, 73.8567"));
        assert!(messages[0].chars().count() <= 280);

        let second = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        assert_eq!(second.attempted(), 0);
        assert_eq!(notifier.messages().len(), 1);

        let hotspot = f.store.hotspot(id).unwrap().unwrap();
        assert!(hotspot.escalated);
        assert!(hotspot.escalated_at.is_some());
        assert!(f.aggregator.pending_hotspots(2, true).unwrap().is_empty());
    }

    #[tokio::test]
    async fn below_threshold_is_not_escalated() {
        let f = fixture();
        seed(&f.aggregator, PUNE.0, PUNE.1, &[Severity::Severe], "pune").await;

        let notifier = RecordingNotifier::default();
        let report = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_is_isolated() {
        let f = fixture();
        let mumbai = seed(
            &f.aggregator,
            19.0760,
            72.8777,
            &[Severity::Severe, Severity::Severe],
            "mumbai",
        )
        .await;
        let pune = seed(
            &f.aggregator,
            PUNE.0,
            PUNE.1,
            &[Severity::Moderate, Severity::Moderate],
            "pune",
        )
        .await;

        let notifier = RecordingNotifier::failing_when("@mybmc");
        let report = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, mumbai);
        assert_eq!(failures[0].1, FailureReason::NotifierFailure);

        assert!(!f.store.hotspot(mumbai).unwrap().unwrap().escalated);
        assert!(f.store.hotspot(pune).unwrap().unwrap().escalated);

        // The failed hotspot is retried next cycle.
        let healthy = RecordingNotifier::default();
        let retry = f.engine.run_escalation_cycle(2, &healthy).await.unwrap();
        assert_eq!(retry.succeeded(), 1);
        assert_eq!(retry.outcomes[0].hotspot_id, mumbai);
    }

    #[tokio::test]
    async fn generator_failure_leaves_hotspot_pending() {
        let f = fixture_with(
            Arc::new(CoordinateNamer),
            Arc::new(FixedGenerator {
                text: "Please fix".to_string(),
                fail_for: Some(Severity::Severe),
            }),
        );
        let id = seed(&f.aggregator, PUNE.0, PUNE.1, &[Severity::Severe, Severity::Minor], "pune").await;

        let notifier = RecordingNotifier::default();
        let report = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures[0].1, FailureReason::MessageFailure);
        assert!(notifier.messages().is_empty());
        assert_eq!(f.aggregator.pending_hotspots(2, true).unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn namer_failure_falls_back_to_coordinates() {
        let f = fixture_with(
            Arc::new(FailingNamer),
            Arc::new(TemplateMessageGenerator),
        );
        seed(&f.aggregator, PUNE.0, PUNE.1, &[Severity::Moderate, Severity::Moderate], "nagpur").await;

        let notifier = RecordingNotifier::default();
        let report = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        assert_eq!(report.succeeded(), 1);
        let message = &notifier.messages()[0];
        assert!(message.starts_with("@MunicipalCorp "), "{message}");
        assert!(message.contains("18.5204, 73.8567"), "{message}");
    }

    #[tokio::test]
    async fn namer_failure_uses_places_from_report_text() {
        let mut f = fixture_with(Arc::new(FailingNamer), Arc::new(TemplateMessageGenerator));
        f.engine = f.engine.with_extractor(Arc::new(FixedExtractor {
            tags: vec!["FC Road".to_string(), "Deccan".to_string()],
        }));
        for i in 0..2 {
            let report = Report {
                description: Some("Deep pothole on FC Road near Deccan".to_string()),
                ..report_at(PUNE.0, PUNE.1, Severity::Severe, i)
            };
            f.aggregator.absorb(report).await.unwrap();
        }

        let notifier = RecordingNotifier::default();
        let report = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        assert_eq!(report.succeeded(), 1);
        let message = &notifier.messages()[0];
        assert!(message.contains("near FC Road, Deccan"), "{message}");
    }

    #[tokio::test]
    async fn no_extracted_places_falls_back_to_coordinates() {
        let mut f = fixture_with(Arc::new(FailingNamer), Arc::new(TemplateMessageGenerator));
        f.engine = f.engine.with_extractor(Arc::new(FixedExtractor { tags: Vec::new() }));
        for i in 0..2 {
            let report = Report {
                description: Some("Huge crater".to_string()),
                ..report_at(PUNE.0, PUNE.1, Severity::Minor, i)
            };
            f.aggregator.absorb(report).await.unwrap();
        }

        let notifier = RecordingNotifier::default();
        f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        assert!(notifier.messages()[0].contains("18.5204, 73.8567"));
    }

    #[tokio::test]
    async fn long_messages_are_truncated() {
        let f = fixture_with(
            Arc::new(CoordinateNamer),
            Arc::new(FixedGenerator {
                text: "x".repeat(500),
                fail_for: None,
            }),
        );
        seed(&f.aggregator, PUNE.0, PUNE.1, &[Severity::Minor, Severity::Minor], "pune").await;

        let notifier = RecordingNotifier::default();
        f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        let message = &notifier.messages()[0];
        assert_eq!(message.chars().count(), 280);
        assert!(message.starts_with("@PuneMunicipal x"));
    }

    #[tokio::test]
    async fn pending_order_drives_processing_order() {
        let f = fixture();
        let severe_two = seed(&f.aggregator, 18.50, 73.80, &[Severity::Severe; 2], "pune").await;
        let moderate_five = seed(&f.aggregator, 18.52, 73.82, &[Severity::Moderate; 5], "pune").await;
        let severe_five = seed(&f.aggregator, 18.54, 73.84, &[Severity::Severe; 5], "pune").await;

        let notifier = RecordingNotifier::default();
        let report = f.engine.run_escalation_cycle(2, &notifier).await.unwrap();
        let order: Vec<HotspotId> = report.outcomes.iter().map(|o| o.hotspot_id).collect();
        assert_eq!(order, vec![severe_five, severe_two, moderate_five]);
    }

    #[tokio::test]
    async fn concurrent_cycles_notify_at_most_once() {
        let f = fixture();
        seed(&f.aggregator, PUNE.0, PUNE.1, &[Severity::Severe; 3], "pune").await;
        seed(&f.aggregator, 19.0760, 72.8777, &[Severity::Moderate; 3], "mumbai").await;

        let notifier = RecordingNotifier::slow(Duration::from_millis(20));
        let (a, b) = tokio::join!(
            f.engine.run_escalation_cycle(2, &notifier),
            f.engine.run_escalation_cycle(2, &notifier),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.succeeded() + b.succeeded(), 2);
        assert_eq!(notifier.messages().len(), 2);
        assert_eq!(a.skipped() + b.skipped(), 2);
    }
}
