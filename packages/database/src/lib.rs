#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Persistence for reports, hotspots, status history and the escalation
//! outbox.
//!
//! The [`Store`] trait is the narrow interface the engine consumes: atomic
//! batched writes ([`Store::commit`]), loads by id, filtered queries in
//! canonical order, and the compare-and-set escalation claim. Two
//! implementations are provided: [`memory::MemoryStore`] for tests and
//! ephemeral runs, and [`duck::DuckDbStore`] backed by a `DuckDB` file.

pub mod duck;
pub mod memory;
pub mod paths;

use chrono::{DateTime, Duration, Utc};
use road_intel_hotspot_models::{
    Hotspot, HotspotFilter, HotspotId, OutboxEntry, OutboxId, ReportFilter,
};
use road_intel_report_models::{Report, ReportId, StatusChange};

pub use duck::DuckDbStore;
pub use memory::MemoryStore;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error while preparing the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be converted back into a model type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A write violated a store invariant (duplicate report, report already
    /// in another hotspot, stale status).
    #[error("Write conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A write referenced a record that does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Inserts a new report. Fails if the id already exists.
    InsertReport(Report),
    /// Moves a report from `change.from` to `change.to` and appends the
    /// change to its history. Fails if the current status is not
    /// `change.from`.
    ChangeReportStatus(StatusChange),
    /// Creates or updates a hotspot's membership, centroid, severity and
    /// text. Never modifies escalation state.
    PutHotspot(Hotspot),
    /// Creates or replaces an outbox entry.
    PutOutbox(OutboxEntry),
    /// Removes an outbox entry (no-op if missing).
    DeleteOutbox(OutboxId),
}

/// An ordered list of writes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { writes: Vec::new() }
    }

    /// Appends a write.
    pub fn push(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    /// Appends a write, builder style.
    #[must_use]
    pub fn with(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// The writes in application order.
    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Whether the batch contains no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Persistence interface for the hotspot engine.
///
/// Implementations must be safe to share across tasks. Every method is
/// atomic with respect to every other method on the same store.
pub trait Store: Send + Sync {
    /// Applies every write in `batch`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any write fails; the store is left unchanged.
    fn commit(&self, batch: WriteBatch) -> Result<(), DbError>;

    /// Loads a report by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn report(&self, id: ReportId) -> Result<Option<Report>, DbError>;

    /// Loads a hotspot by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn hotspot(&self, id: HotspotId) -> Result<Option<Hotspot>, DbError>;

    /// Hotspots matching `filter`, in canonical priority order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn query_hotspots(&self, filter: &HotspotFilter) -> Result<Vec<Hotspot>, DbError>;

    /// Reports matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn query_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>, DbError>;

    /// Status history of a report, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn status_history(&self, id: ReportId) -> Result<Vec<StatusChange>, DbError>;

    /// Up to `limit` outbox entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, DbError>;

    /// Atomically claims a hotspot for escalation.
    ///
    /// Succeeds only if the hotspot exists, is not escalated, and holds no
    /// claim younger than `lease`. Returns whether the claim was taken.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    fn try_claim_escalation(
        &self,
        id: HotspotId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, DbError>;

    /// Marks a hotspot escalated and drops its claim. Returns `false` if it
    /// was already escalated.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    fn complete_escalation(&self, id: HotspotId, at: DateTime<Utc>) -> Result<bool, DbError>;

    /// Drops the claim on an unescalated hotspot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    fn release_escalation_claim(&self, id: HotspotId) -> Result<(), DbError>;
}

/// Applies the `limit` of a hotspot filter to already ordered results.
/// Claims taken before this instant have expired. Saturates at the earliest
/// representable time for leases reaching past it.
fn lease_cutoff(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(lease)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn apply_limit<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}
