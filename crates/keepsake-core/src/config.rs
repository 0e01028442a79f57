//! Process configuration loaded from the environment.
//!
//! This is infrastructure configuration (database/redis URLs, pool sizing,
//! worker counts). Domain configuration such as quotas and storage selection
//! lives in the database and is resolved per request by the config resolver.

use std::env;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Counter store for upload rate limiting. When unset, an in-process
    /// store is used (single-node deployments and tests).
    pub redis_url: Option<String>,
    pub db_max_connections: u32,
    /// Workers on the I/O-biased enrichment pool. Defaults to twice the
    /// logical core count, minimum 4.
    pub enrichment_workers: usize,
    /// Capacity of the bounded enrichment queue.
    pub enrichment_queue_len: usize,
    /// Default root for the local-disk backend; also the directory served
    /// under the public mount. A database `upload_path` entry overrides it
    /// for new writes.
    pub upload_root: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Hour of day (0-23, UTC) at which the daily recycle-bin purge runs.
    pub purge_hour: u32,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(8)
            .max(4);

        Ok(Config {
            server_port: parse_env("SERVER_PORT", 8080)?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            redis_url: env::var("REDIS_URL").ok(),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 20)?,
            enrichment_workers: parse_env("ENRICHMENT_WORKERS", default_workers)?,
            enrichment_queue_len: parse_env("ENRICHMENT_QUEUE_LEN", 256)?,
            upload_root: env::var("UPLOAD_ROOT").unwrap_or_else(|_| "./uploads".to_string()),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            purge_hour: parse_env("PURGE_HOUR", 2)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
