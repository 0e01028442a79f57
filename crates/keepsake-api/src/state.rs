//! Application state shared by all handlers.

use keepsake_services::{ConfigResolver, EnrichmentQueue, RecycleService, UploadService};
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    pub configs: Arc<ConfigResolver>,
    pub upload_service: UploadService,
    pub recycle_service: Arc<RecycleService>,
    pub enrichment_queue: EnrichmentQueue,
    /// Directory backing the public `/uploads` mount.
    pub local_root: PathBuf,
}
