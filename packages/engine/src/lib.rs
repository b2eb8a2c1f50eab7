#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Hotspot aggregation and escalation engine.
//!
//! Reports enter through [`ingest::Ingestor`], which normalizes detector
//! output and hands each report to the [`aggregator::Aggregator`]. The
//! aggregator groups reports into hotspots by distance and text similarity
//! and persists every absorb as one atomic batch. The
//! [`escalation::EscalationEngine`] publishes each eligible hotspot at most
//! once through an injected [`collaborators::Notifier`].
//!
//! External services (similarity scoring, reverse geocoding, message
//! generation, publishing) are reached only through the traits in
//! [`collaborators`]; persistence goes through
//! [`road_intel_database::Store`].

pub mod aggregator;
pub mod collaborators;
pub mod config;
pub mod escalation;
pub mod ingest;
pub mod outbox;
pub mod queries;

use road_intel_database::DbError;
use road_intel_hotspot_models::HotspotId;
use road_intel_report_models::{ReportError, ReportId};
use thiserror::Error;

pub use aggregator::Aggregator;
pub use config::{ConfigError, EngineConfig};
pub use escalation::EscalationEngine;
pub use ingest::Ingestor;
pub use queries::Dashboard;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The report data was rejected.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// The store failed; the operation left no partial state behind.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DbError),

    /// No report with this id exists.
    #[error("Report not found: {0}")]
    ReportNotFound(ReportId),

    /// No hotspot with this id exists.
    #[error("Hotspot not found: {0}")]
    HotspotNotFound(HotspotId),
}
