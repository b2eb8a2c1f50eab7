//! In-process [`Store`] implementation.
//!
//! Keeps everything in ordered maps behind a single `Mutex`. Batches are
//! applied in place while recording the previous value of every touched
//! key; a failing write replays that log backwards, so a batch costs only
//! what it touches.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use road_intel_hotspot_models::{
    Hotspot, HotspotFilter, HotspotId, OutboxEntry, OutboxId, ReportFilter, priority_order,
};
use road_intel_report_models::{Report, ReportId, StatusChange};

use crate::{DbError, Store, Write, WriteBatch, apply_limit, lease_cutoff};

#[derive(Debug, Default)]
struct MemoryState {
    reports: BTreeMap<ReportId, Report>,
    hotspots: BTreeMap<HotspotId, Hotspot>,
    /// report -> owning hotspot
    membership: BTreeMap<ReportId, HotspotId>,
    history: BTreeMap<ReportId, Vec<StatusChange>>,
    outbox: BTreeMap<OutboxId, OutboxEntry>,
    claims: BTreeMap<HotspotId, DateTime<Utc>>,
}

/// Previous value of one key touched by a batch.
enum Undo {
    Report(ReportId, Option<Report>),
    History(ReportId, Option<usize>),
    Hotspot(HotspotId, Option<Hotspot>),
    Membership(ReportId, Option<HotspotId>),
    Outbox(OutboxId, Option<OutboxEntry>),
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

impl MemoryState {
    /// Applies every write or none of them.
    fn apply_all(&mut self, writes: Vec<Write>) -> Result<(), DbError> {
        let mut undo = Vec::new();
        for write in writes {
            if let Err(e) = self.apply(write, &mut undo) {
                self.rollback(undo);
                return Err(e);
            }
        }
        Ok(())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Report(id, previous) => restore(&mut self.reports, id, previous),
                Undo::History(id, previous_len) => match previous_len {
                    Some(len) => {
                        if let Some(history) = self.history.get_mut(&id) {
                            history.truncate(len);
                        }
                    }
                    None => {
                        self.history.remove(&id);
                    }
                },
                Undo::Hotspot(id, previous) => restore(&mut self.hotspots, id, previous),
                Undo::Membership(id, previous) => restore(&mut self.membership, id, previous),
                Undo::Outbox(id, previous) => restore(&mut self.outbox, id, previous),
            }
        }
    }

    /// Applies one write. Validation happens before any mutation, so a
    /// failing write leaves nothing to undo itself.
    fn apply(&mut self, write: Write, undo: &mut Vec<Undo>) -> Result<(), DbError> {
        match write {
            Write::InsertReport(report) => {
                if self.reports.contains_key(&report.id) {
                    return Err(DbError::Conflict {
                        message: format!("report {} already exists", report.id),
                    });
                }
                undo.push(Undo::Report(report.id, None));
                self.reports.insert(report.id, report);
            }
            Write::ChangeReportStatus(change) => {
                let report =
                    self.reports
                        .get_mut(&change.report_id)
                        .ok_or_else(|| DbError::NotFound {
                            message: format!("report {}", change.report_id),
                        })?;
                if report.status != change.from {
                    return Err(DbError::Conflict {
                        message: format!(
                            "report {} is {}, expected {}",
                            change.report_id, report.status, change.from
                        ),
                    });
                }
                undo.push(Undo::Report(change.report_id, Some(report.clone())));
                report.status = change.to;
                undo.push(Undo::History(
                    change.report_id,
                    self.history.get(&change.report_id).map(Vec::len),
                ));
                self.history
                    .entry(change.report_id)
                    .or_default()
                    .push(change);
            }
            Write::PutHotspot(hotspot) => self.put_hotspot(hotspot, undo)?,
            Write::PutOutbox(entry) => {
                let id = entry.id;
                let previous = self.outbox.insert(id, entry);
                undo.push(Undo::Outbox(id, previous));
            }
            Write::DeleteOutbox(id) => {
                let previous = self.outbox.remove(&id);
                undo.push(Undo::Outbox(id, previous));
            }
        }
        Ok(())
    }

    fn put_hotspot(&mut self, mut hotspot: Hotspot, undo: &mut Vec<Undo>) -> Result<(), DbError> {
        if hotspot.member_report_ids.is_empty() {
            return Err(DbError::Conflict {
                message: format!("hotspot {} has no members", hotspot.id),
            });
        }

        for report_id in &hotspot.member_report_ids {
            match self.membership.get(report_id) {
                Some(owner) if *owner != hotspot.id => {
                    return Err(DbError::Conflict {
                        message: format!("report {report_id} already belongs to hotspot {owner}"),
                    });
                }
                _ => {}
            }
        }

        // Escalation state, city and founding time never change after the
        // first write.
        if let Some(existing) = self.hotspots.get(&hotspot.id) {
            hotspot.escalated = existing.escalated;
            hotspot.escalated_at = existing.escalated_at;
            hotspot.created_at = existing.created_at;
            hotspot.city.clone_from(&existing.city);
        } else {
            hotspot.escalated = false;
            hotspot.escalated_at = None;
        }

        for report_id in &hotspot.member_report_ids {
            let previous = self.membership.insert(*report_id, hotspot.id);
            undo.push(Undo::Membership(*report_id, previous));
        }
        let id = hotspot.id;
        let previous = self.hotspots.insert(id, hotspot);
        undo.push(Undo::Hotspot(id, previous));
        Ok(())
    }
}

/// A [`Store`] that lives entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, DbError> {
        self.state.lock().map_err(|_| DbError::LockPoisoned)
    }
}

impl Store for MemoryStore {
    fn commit(&self, batch: WriteBatch) -> Result<(), DbError> {
        self.lock()?.apply_all(batch.writes)
    }

    fn report(&self, id: ReportId) -> Result<Option<Report>, DbError> {
        Ok(self.lock()?.reports.get(&id).cloned())
    }

    fn hotspot(&self, id: HotspotId) -> Result<Option<Hotspot>, DbError> {
        Ok(self.lock()?.hotspots.get(&id).cloned())
    }

    fn query_hotspots(&self, filter: &HotspotFilter) -> Result<Vec<Hotspot>, DbError> {
        let state = self.lock()?;
        let mut hotspots: Vec<Hotspot> = state
            .hotspots
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect();
        hotspots.sort_by(priority_order);
        Ok(apply_limit(hotspots, filter.limit))
    }

    fn query_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>, DbError> {
        let state = self.lock()?;
        let mut reports: Vec<Report> = state
            .reports
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reports)
    }

    fn status_history(&self, id: ReportId) -> Result<Vec<StatusChange>, DbError> {
        Ok(self.lock()?.history.get(&id).cloned().unwrap_or_default())
    }

    fn outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, DbError> {
        let state = self.lock()?;
        let mut entries: Vec<OutboxEntry> = state.outbox.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entries.truncate(limit);
        Ok(entries)
    }

    fn try_claim_escalation(
        &self,
        id: HotspotId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, DbError> {
        let mut state = self.lock()?;
        let Some(hotspot) = state.hotspots.get(&id) else {
            return Ok(false);
        };
        if hotspot.escalated {
            return Ok(false);
        }
        if let Some(claimed_at) = state.claims.get(&id)
            && *claimed_at >= lease_cutoff(now, lease)
        {
            return Ok(false);
        }
        state.claims.insert(id, now);
        Ok(true)
    }

    fn complete_escalation(&self, id: HotspotId, at: DateTime<Utc>) -> Result<bool, DbError> {
        let mut state = self.lock()?;
        state.claims.remove(&id);
        let hotspot = state.hotspots.get_mut(&id).ok_or_else(|| DbError::NotFound {
            message: format!("hotspot {id}"),
        })?;
        if hotspot.escalated {
            return Ok(false);
        }
        hotspot.escalated = true;
        hotspot.escalated_at = Some(at);
        Ok(true)
    }

    fn release_escalation_claim(&self, id: HotspotId) -> Result<(), DbError> {
        self.lock()?.claims.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn round_trips_reports_and_hotspots() {
        test_support::round_trips_reports_and_hotspots(&MemoryStore::new());
    }

    #[test]
    fn failed_batch_leaves_no_trace() {
        test_support::failed_batch_leaves_no_trace(&MemoryStore::new());
    }

    #[test]
    fn failed_batch_restores_updated_rows() {
        test_support::failed_batch_restores_updated_rows(&MemoryStore::new());
    }

    #[test]
    fn report_cannot_join_two_hotspots() {
        test_support::report_cannot_join_two_hotspots(&MemoryStore::new());
    }

    #[test]
    fn queries_hotspots_in_priority_order() {
        test_support::queries_hotspots_in_priority_order(&MemoryStore::new());
    }

    #[test]
    fn claims_are_exclusive() {
        test_support::claims_are_exclusive(&MemoryStore::new());
    }

    #[test]
    fn unbounded_lease_never_expires() {
        test_support::unbounded_lease_never_expires(&MemoryStore::new());
    }

    #[test]
    fn membership_updates_keep_escalation() {
        test_support::membership_updates_keep_escalation(&MemoryStore::new());
    }

    #[test]
    fn status_changes_are_compare_and_set() {
        test_support::status_changes_are_compare_and_set(&MemoryStore::new());
    }

    #[test]
    fn filters_reports() {
        test_support::filters_reports(&MemoryStore::new());
    }

    #[test]
    fn outbox_round_trip() {
        test_support::outbox_round_trip(&MemoryStore::new());
    }
}
