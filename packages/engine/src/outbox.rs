//! Outbox worker.
//!
//! The aggregator writes an outbox entry in the same batch as the absorb
//! that makes a hotspot reach the escalation threshold. Draining the
//! outbox runs each entry through the regular claim/notify/commit path.

use chrono::Utc;
use road_intel_database::{Write, WriteBatch};
use road_intel_hotspot_models::{CycleReport, OutboxEntry, OutcomeStatus};

use crate::collaborators::Notifier;
use crate::{EngineError, EscalationEngine};

impl EscalationEngine {
    /// Processes up to `limit` outbox entries, oldest first.
    ///
    /// Entries for hotspots that are escalated (or gone) are dropped,
    /// published entries are deleted, and failed entries keep their place
    /// with an incremented attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the outbox cannot be read.
    pub async fn drain_outbox(
        &self,
        notifier: &dyn Notifier,
        limit: usize,
    ) -> Result<CycleReport, EngineError> {
        let started_at = Utc::now();
        let entries = self.store.outbox(limit)?;
        log::info!("Draining {} outbox entries", entries.len());

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let hotspot = self.store.hotspot(entry.hotspot_id)?;
            if hotspot.is_none_or(|h| h.escalated) {
                log::debug!(
                    "Dropping outbox entry {} for escalated or missing hotspot {}",
                    entry.id,
                    entry.hotspot_id
                );
                self.store
                    .commit(WriteBatch::new().with(Write::DeleteOutbox(entry.id)))?;
                continue;
            }

            let outcome = self.escalate(entry.hotspot_id, notifier).await;
            let update = match &outcome.status {
                OutcomeStatus::Escalated { .. } => Some(Write::DeleteOutbox(entry.id)),
                // A concurrent run holds the claim; try again next drain.
                OutcomeStatus::Skipped { .. } => None,
                OutcomeStatus::Failed { error, .. } => Some(Write::PutOutbox(OutboxEntry {
                    attempts: entry.attempts.saturating_add(1),
                    last_error: Some(error.clone()),
                    ..entry
                })),
            };

            if let Some(update) = update
                && let Err(e) = self.store.commit(WriteBatch::new().with(update))
            {
                log::warn!("Failed to update outbox entry: {e}");
            }
            outcomes.push(outcome);
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        log::info!("Outbox drain finished: {report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::collaborators::fakes::RecordingNotifier;
    use crate::collaborators::{CoordinateNamer, NoTextSimilarity, TemplateMessageGenerator};
    use crate::test_support::{PUNE, report_at};
    use crate::{Aggregator, EngineConfig};
    use road_intel_database::{MemoryStore, Store};
    use road_intel_report_models::Severity;

    fn setup() -> (Arc<MemoryStore>, Aggregator, EscalationEngine) {
        let store = Arc::new(MemoryStore::new());
        let mut config = EngineConfig::default();
        config.hotspot_threshold = 2;
        let config = Arc::new(config);
        let aggregator = Aggregator::new(store.clone(), Arc::new(NoTextSimilarity), config.clone());
        let engine = EscalationEngine::new(
            store.clone(),
            Arc::new(CoordinateNamer),
            Arc::new(TemplateMessageGenerator),
            config,
        );
        (store, aggregator, engine)
    }

    #[tokio::test]
    async fn drains_each_entry_exactly_once() {
        let (store, aggregator, engine) = setup();
        for i in 0..3 {
            aggregator
                .absorb(report_at(PUNE.0, PUNE.1, Severity::Moderate, i))
                .await
                .unwrap();
        }
        assert_eq!(store.outbox(10).unwrap().len(), 1);

        let notifier = RecordingNotifier::default();
        let report = engine.drain_outbox(&notifier, 10).await.unwrap();
        assert_eq!(report.succeeded(), 1);
        assert!(store.outbox(10).unwrap().is_empty());

        let again = engine.drain_outbox(&notifier, 10).await.unwrap();
        assert!(again.outcomes.is_empty());
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_entry_with_attempts() {
        let (store, aggregator, engine) = setup();
        for i in 0..2 {
            aggregator
                .absorb(report_at(PUNE.0, PUNE.1, Severity::Severe, i))
                .await
                .unwrap();
        }

        let failing = RecordingNotifier::failing_when("@PuneMunicipal");
        let report = engine.drain_outbox(&failing, 10).await.unwrap();
        assert_eq!(report.failures().count(), 1);

        let entries = store.outbox(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);
        assert!(entries[0].last_error.is_some());

        let healthy = RecordingNotifier::default();
        assert_eq!(engine.drain_outbox(&healthy, 10).await.unwrap().succeeded(), 1);
        assert!(store.outbox(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_for_escalated_hotspots_are_dropped() {
        let (store, aggregator, engine) = setup();
        for i in 0..2 {
            aggregator
                .absorb(report_at(PUNE.0, PUNE.1, Severity::Minor, i))
                .await
                .unwrap();
        }

        // The periodic cycle gets there first.
        let notifier = RecordingNotifier::default();
        assert_eq!(
            engine.run_escalation_cycle(2, &notifier).await.unwrap().succeeded(),
            1
        );

        let report = engine.drain_outbox(&notifier, 10).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(store.outbox(10).unwrap().is_empty());
        assert_eq!(notifier.messages().len(), 1);
    }
}
