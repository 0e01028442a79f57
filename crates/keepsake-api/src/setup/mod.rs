//! Application setup and initialization
//!
//! All startup wiring lives here so main.rs stays a thin entry point.

pub mod database;
pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::Result;
use keepsake_core::Config;
use keepsake_db::{PgAssetRepository, PgConfigRepository};
use keepsake_processing::{FfmpegCover, VideoProbe};
use keepsake_services::{
    ConfigResolver, EnrichmentPool, MediaEnricher, MemoryCounterStore, PurgeScheduler,
    RateLimiter, RecycleService, RedisCounterStore, StorageSelector, UploadLimits, UploadService,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Initialize the entire application: database, services, background
/// workers and the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    let pool = database::setup_database(&config).await?;

    let assets: Arc<dyn keepsake_db::AssetRepository> =
        Arc::new(PgAssetRepository::new(pool.clone()));
    let config_repo: Arc<dyn keepsake_db::ConfigRepository> =
        Arc::new(PgConfigRepository::new(pool));

    let configs = Arc::new(ConfigResolver::new(config_repo));
    let selector = Arc::new(StorageSelector::new(configs.clone(), &config.upload_root));

    let counter_store: Arc<dyn keepsake_services::CounterStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis-backed upload counters");
            Arc::new(RedisCounterStore::connect(url).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, upload counters are process-local");
            Arc::new(MemoryCounterStore::new())
        }
    };
    let limiter = RateLimiter::new(counter_store, UploadLimits::default());

    let enricher = Arc::new(MediaEnricher::new(
        assets.clone(),
        selector.clone(),
        VideoProbe::new(&config.ffprobe_path)?,
        FfmpegCover::new(&config.ffmpeg_path)?,
    ));
    let enrichment_queue = EnrichmentPool::start(
        enricher,
        config.enrichment_workers,
        config.enrichment_queue_len,
    );

    let upload_service = UploadService::new(
        assets.clone(),
        configs.clone(),
        limiter,
        selector.clone(),
        enrichment_queue.clone(),
    );

    let recycle_service = Arc::new(RecycleService::new(assets, selector));
    PurgeScheduler::start(recycle_service.clone(), config.purge_hour);

    let local_root = PathBuf::from(&config.upload_root);
    tokio::fs::create_dir_all(&local_root).await?;

    let state = Arc::new(AppState {
        configs,
        upload_service,
        recycle_service,
        enrichment_queue,
        local_root,
    });

    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
