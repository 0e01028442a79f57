//! Service layer: upload admission, domain configuration, rate limiting,
//! storage selection, enrichment workers, and the recycle bin.
//!
//! Services depend on the repository and storage traits, never on concrete
//! backends, so every policy here is unit-testable against the in-memory
//! implementations.

pub mod config;
pub mod enrichment;
pub mod rate_limit;
pub mod recycle;
pub mod storage_select;
pub mod upload;

pub use config::ConfigResolver;
pub use enrichment::{EnrichmentJob, EnrichmentPool, EnrichmentQueue, MediaEnricher};
pub use rate_limit::{
    CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore, UploadLimits,
};
pub use recycle::{PurgeScheduler, RecycleService};
pub use storage_select::StorageSelector;
pub use upload::{UploadOutcome, UploadService, UploadedFile};
