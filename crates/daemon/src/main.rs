//! stripd entry point.
//!
//! Boots the comic archive daemon: loads layered configuration, opens the
//! state database and archive, then runs the daily scheduler until ctrl-c.
//! Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use strips_client::{DownloaderFacade, FetchClient, FetchConfig};
use strips_core::{
    AppConfig, DuplicateDetector, JsonCatalogStore, RetrievalStatusTracker, StateDb, StripArchive, SystemClock,
    TaskExecutionTracker, load_bootstrap,
};
use strips_daemon::{ComicManagementFacade, Components, Scheduler};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let clock = Arc::new(SystemClock::new(config.tz()?));
    tracing::info!(archive = %config.archive_root.display(), timezone = %config.timezone, "starting stripd");

    let db = StateDb::open(&config.state_db_path)
        .await
        .with_context(|| format!("opening state database {}", config.state_db_path.display()))?;
    let retrievals = Arc::new(RetrievalStatusTracker::new(db.clone(), clock.clone(), config.retention_days));
    let tasks = Arc::new(TaskExecutionTracker::open(db, clock.clone()).await?);

    let fetch = FetchClient::new(FetchConfig::from_app(&config))?;
    #[cfg(feature = "render")]
    let fetch = if config.render_enabled {
        let renderer = strips_client::render::HeadlessRenderer::launch((1280, 2000)).await?;
        fetch.with_renderer(Arc::new(renderer))
    } else {
        fetch
    };
    let downloaders = DownloaderFacade::with_default_sources(Arc::new(fetch))?;

    let archive = StripArchive::new(&config.archive_root, DuplicateDetector::from_config(&config.duplicates))
        .with_max_bytes(config.max_bytes);

    let bootstrap = match &config.bootstrap_path {
        Some(path) => load_bootstrap(path)
            .await
            .with_context(|| format!("loading bootstrap {}", path.display()))?,
        None => Vec::new(),
    };

    let components = Components {
        catalog_store: Arc::new(JsonCatalogStore::new(&config.catalog_path)),
        downloaders: Arc::new(downloaders),
        archive: Arc::new(archive),
        retrievals,
        clock: clock.clone(),
    };
    let facade = Arc::new(
        ComicManagementFacade::open(components, &config.cache)
            .await?
            .with_bootstrap(bootstrap)
            .with_update_concurrency(config.update_concurrency)
            .with_backfill(config.backfill.clone()),
    );

    let mut scheduler = Scheduler::new(&facade, tasks, clock, &config)?;
    scheduler.start().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    scheduler.shutdown().await;

    Ok(())
}
