//! Wiring of the store, engine components and collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use road_intel_ai::{EmbeddingSimilarity, LlmLocationExtractor, LlmMessageGenerator, providers};
use road_intel_database::{DuckDbStore, Store};
use road_intel_engine::collaborators::{
    CoordinateNamer, LocationExtractor, LocationNamer, MessageGenerator, NoTextSimilarity, Notifier,
    TemplateMessageGenerator, TextSimilarity,
};
use road_intel_engine::config::DEFAULT_CONFIG_FILE;
use road_intel_engine::{Aggregator, Dashboard, EngineConfig, EscalationEngine, Ingestor};
use road_intel_geocoder::NominatimNamer;
use road_intel_notifier::{LogNotifier, TwitterNotifier};

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Store path; defaults to `data/road_intel.duckdb`.
    pub db: Option<PathBuf>,
    /// Config file; defaults to `road_intel.toml`.
    pub config: Option<PathBuf>,
    /// Use only local collaborators (no network).
    pub offline: bool,
}

/// Fully wired application.
pub struct App {
    pub config: Arc<EngineConfig>,
    pub aggregator: Arc<Aggregator>,
    pub ingestor: Ingestor,
    pub engine: EscalationEngine,
    pub dashboard: Dashboard,
}

impl App {
    /// Loads config, opens the store and builds the engine components.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the store cannot be
    /// opened.
    pub fn open(options: &Options) -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = options
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config = Arc::new(EngineConfig::load(&config_path)?);

        let store: Arc<dyn Store> = Arc::new(open_store(options.db.as_deref())?);

        let aggregator = Arc::new(Aggregator::new(
            store.clone(),
            similarity(options.offline),
            config.clone(),
        ));
        let mut engine = EscalationEngine::new(
            store.clone(),
            namer(options.offline),
            generator(options.offline),
            config.clone(),
        );
        if let Some(extractor) = extractor(options.offline) {
            engine = engine.with_extractor(extractor);
        }
        let dashboard = Dashboard::new(store.clone(), config.clone());

        Ok(Self {
            config,
            ingestor: Ingestor::new(aggregator.clone()),
            aggregator,
            engine,
            dashboard,
        })
    }
}

/// Opens the `DuckDB` store at `path` or the default location.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub fn open_store(path: Option<&Path>) -> Result<DuckDbStore, Box<dyn std::error::Error>> {
    let store = match path {
        Some(path) => DuckDbStore::open(path)?,
        None => DuckDbStore::open_default()?,
    };
    Ok(store)
}

fn similarity(offline: bool) -> Arc<dyn TextSimilarity> {
    if offline {
        return Arc::new(NoTextSimilarity);
    }
    match EmbeddingSimilarity::from_env() {
        Ok(similarity) => Arc::new(similarity),
        Err(e) => {
            log::info!("Text similarity disabled ({e}); clustering by distance only");
            Arc::new(NoTextSimilarity)
        }
    }
}

fn namer(offline: bool) -> Arc<dyn LocationNamer> {
    if offline {
        return Arc::new(CoordinateNamer);
    }
    match NominatimNamer::from_env() {
        Ok(namer) => Arc::new(namer),
        Err(e) => {
            log::warn!("Reverse geocoding unavailable ({e}); naming by coordinates");
            Arc::new(CoordinateNamer)
        }
    }
}

fn extractor(offline: bool) -> Option<Arc<dyn LocationExtractor>> {
    if offline {
        return None;
    }
    match providers::create_provider_from_env() {
        Ok(provider) => Some(Arc::new(LlmLocationExtractor::new(provider))),
        Err(e) => {
            log::debug!("Location extraction unavailable: {e}");
            None
        }
    }
}

fn generator(offline: bool) -> Arc<dyn MessageGenerator> {
    if offline {
        return Arc::new(TemplateMessageGenerator);
    }
    match providers::create_provider_from_env() {
        Ok(provider) => {
            log::info!("Drafting escalation posts with {}", provider.name());
            Arc::new(LlmMessageGenerator::new(provider))
        }
        Err(e) => {
            log::info!("LLM unavailable ({e}); using message templates");
            Arc::new(TemplateMessageGenerator)
        }
    }
}

/// Builds the notifier for publishing commands.
///
/// # Errors
///
/// Returns an error if publishing for real was requested but no
/// credentials are configured.
pub fn notifier(dry_run: bool) -> Result<Box<dyn Notifier>, Box<dyn std::error::Error>> {
    if dry_run {
        return Ok(Box::new(LogNotifier));
    }
    let notifier = TwitterNotifier::from_env()
        .map_err(|e| format!("{e} (use --dry-run to only log messages)"))?;
    Ok(Box::new(notifier))
}
