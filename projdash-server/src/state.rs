//! Application state.

use projdash_core::github::GhCli;
use projdash_core::pipeline::PipelineConfig;
use projdash_core::scan::FsScanner;
use projdash_core::{enrich, Config, Database, Orchestrator, Result};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Database connection
    pub db: Arc<Database>,
    /// Refresh pipeline; owns the single-run guard
    pub orchestrator: Arc<Orchestrator>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire the filesystem scanner, the configured enricher and (unless
    /// disabled) the `gh` client to `db`.
    pub fn new(config: Config, db: Arc<Database>) -> Result<Self> {
        let scanner = Arc::new(FsScanner::new(
            config.scan.dev_root.clone(),
            config.scan.exclude_dirs.clone(),
        ));
        let enricher = enrich::from_config(&config.llm)?;
        let mut orchestrator = Orchestrator::new(
            scanner,
            db.clone(),
            enricher,
            PipelineConfig::from_config(&config),
        );
        if config.github.enabled {
            orchestrator = orchestrator.with_github(Arc::new(GhCli::new()));
        }
        Ok(Self::with_orchestrator(config, db, orchestrator))
    }

    /// Serve an already wired pipeline.
    pub fn with_orchestrator(config: Config, db: Arc<Database>, orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::new(config),
            db,
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
