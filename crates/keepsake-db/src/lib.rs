//! Database repositories for the data access layer.
//!
//! Repositories are defined as traits so services can run against the
//! Postgres implementations in production and the in-memory implementations
//! in tests. The asset repository owns the soft-delete lifecycle; the config
//! repository is a flat key/value table with an optional per-user owner.

pub mod asset;
pub mod config;
pub mod memory;

pub use asset::{AssetRepository, EnrichmentUpdate, NewAsset, PgAssetRepository};
pub use config::{ConfigRepository, PgConfigRepository};
pub use memory::{MemoryAssetRepository, MemoryConfigRepository};
