//! Asynchronous media enrichment.
//!
//! Uploads return as soon as the primary object and row exist; thumbnails,
//! EXIF capture metadata, video duration, and cover frames are produced
//! here afterwards. Jobs flow through a bounded queue into a pool of
//! concurrent workers. Enrichment failures are logged and swallowed: the
//! asset stays valid with null derived fields, and nothing is retried.

use keepsake_core::models::AssetKind;
use keepsake_core::AppError;
use keepsake_db::{AssetRepository, EnrichmentUpdate};
use keepsake_processing::{
    derived_file_name, extract_capture_info, make_thumbnail, FfmpegCover, VideoProbe,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::storage_select::StorageSelector;

/// One unit of enrichment work. Carries the original bytes so workers
/// never re-download from storage.
pub struct EnrichmentJob {
    pub asset_id: Uuid,
    pub kind: AssetKind,
    /// Relative storage path of the primary object. Derived artifact
    /// paths are built from it.
    pub relative_path: String,
    pub data: Vec<u8>,
}

/// Produces derived artifacts and merges them into the asset row.
pub struct MediaEnricher {
    assets: Arc<dyn AssetRepository>,
    selector: Arc<StorageSelector>,
    probe: VideoProbe,
    cover: FfmpegCover,
}

impl MediaEnricher {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        selector: Arc<StorageSelector>,
        probe: VideoProbe,
        cover: FfmpegCover,
    ) -> Self {
        Self {
            assets,
            selector,
            probe,
            cover,
        }
    }

    /// Run one job to completion. Never returns an error to the pool;
    /// every failure path is logged here.
    #[tracing::instrument(skip(self, job), fields(asset_id = %job.asset_id, kind = %job.kind))]
    pub async fn process(&self, job: EnrichmentJob) {
        let start = std::time::Instant::now();
        let asset_id = job.asset_id;

        let update = match job.kind {
            AssetKind::Image => self.enrich_image(&job).await,
            AssetKind::Video => self.enrich_video(&job).await,
        };

        let update = match update {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(error = %e, "Enrichment failed, asset keeps null derived fields");
                return;
            }
        };

        if update.is_empty() {
            tracing::debug!("Enrichment produced nothing, skipping row update");
            return;
        }

        if let Err(e) = self.assets.apply_enrichment(asset_id, update).await {
            tracing::error!(error = %e, "Failed to record enrichment results");
            return;
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            "Enrichment completed"
        );
    }

    async fn enrich_image(&self, job: &EnrichmentJob) -> Result<EnrichmentUpdate, AppError> {
        let capture = {
            let data = job.data.clone();
            tokio::task::spawn_blocking(move || extract_capture_info(&data))
                .await
                .map_err(|e| AppError::Internal(format!("EXIF task panicked: {}", e)))?
                .ok()
                .filter(|info| !info.is_empty())
        };

        // A failed thumbnail only loses the thumbnail; capture metadata
        // is still recorded.
        let derived_url = match self.upload_thumbnail(job).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "Thumbnail generation failed");
                None
            }
        };

        Ok(EnrichmentUpdate {
            derived_url,
            capture,
            duration_secs: None,
        })
    }

    async fn upload_thumbnail(&self, job: &EnrichmentJob) -> Result<String, AppError> {
        let data = job.data.clone();
        let thumbnail = tokio::task::spawn_blocking(move || make_thumbnail(&data))
            .await
            .map_err(|e| AppError::Internal(format!("Thumbnail task panicked: {}", e)))?
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let derived_path = jpeg_derived_path(&job.relative_path);
        let storage = self.selector.current().await?;
        storage
            .upload(thumbnail, &derived_path)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn enrich_video(&self, job: &EnrichmentJob) -> Result<EnrichmentUpdate, AppError> {
        // The scratch dir is removed on every exit path when the guard drops.
        let scratch = tempfile::tempdir()?;
        let input_name = Path::new(&job.relative_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.bin", job.asset_id));
        let input_path = scratch.path().join(input_name);
        tokio::fs::write(&input_path, &job.data).await?;

        let duration_secs = match self.probe.probe(&input_path).await {
            Ok(info) => Some(info.duration_secs.round() as i64),
            Err(e) => {
                tracing::warn!(error = %e, "Video probe failed");
                None
            }
        };

        let derived_url = match self.upload_cover(&input_path, scratch.path(), job).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "Cover frame extraction failed");
                None
            }
        };

        Ok(EnrichmentUpdate {
            derived_url,
            capture: None,
            duration_secs,
        })
    }

    async fn upload_cover(
        &self,
        input_path: &Path,
        scratch: &Path,
        job: &EnrichmentJob,
    ) -> Result<String, AppError> {
        let cover_path = scratch.join("cover.jpg");
        self.cover
            .extract_cover(input_path, &cover_path)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let cover_bytes = tokio::fs::read(&cover_path).await?;
        let derived_path = jpeg_derived_path(&job.relative_path);
        let storage = self.selector.current().await?;
        storage
            .upload(cover_bytes, &derived_path)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }
}

/// Derived artifacts (image thumbnails and video cover frames) are always
/// JPEG, so the derived path swaps the source extension for `.jpg` before
/// taking the thumbnail suffix: `a/pic.png` becomes `a/pic_thumb.jpg`,
/// `a/clip.mp4` becomes `a/clip_thumb.jpg`. The stored object and its URL
/// extension stay in agreement that way.
fn jpeg_derived_path(primary_path: &str) -> String {
    let stem = match primary_path.rfind('.') {
        Some(idx) if !primary_path[idx..].contains('/') => &primary_path[..idx],
        _ => primary_path,
    };
    derived_file_name(&format!("{}.jpg", stem))
}

/// Cloneable handle for submitting jobs to the pool.
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::Sender<EnrichmentJob>,
    shutdown_tx: mpsc::Sender<()>,
}

impl EnrichmentQueue {
    /// Submit a job, waiting when the queue is full. Backpressure reaches
    /// the uploader rather than growing an unbounded backlog.
    pub async fn enqueue(&self, job: EnrichmentJob) -> Result<(), AppError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| AppError::Internal("Enrichment queue is closed".to_string()))
    }

    /// Signal the dispatcher to stop taking jobs. In-flight workers run to
    /// completion; this does not wait for them.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating enrichment pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

pub struct EnrichmentPool;

impl EnrichmentPool {
    /// Spawn the dispatcher and return the submission handle.
    ///
    /// `workers` bounds in-flight jobs via a semaphore; the work is
    /// I/O-heavy (storage round-trips, ffmpeg subprocesses), so counts
    /// above the logical core count are the norm.
    pub fn start(enricher: Arc<MediaEnricher>, workers: usize, queue_len: usize) -> EnrichmentQueue {
        let (tx, mut rx) = mpsc::channel::<EnrichmentJob>(queue_len.max(1));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            tracing::info!(workers = workers, queue_len = queue_len, "Enrichment pool started");
            let semaphore = Arc::new(Semaphore::new(workers.max(1)));

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Enrichment pool shutting down");
                        break;
                    }
                    job = rx.recv() => {
                        let Some(job) = job else { break };
                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let enricher = enricher.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            enricher.process(job).await;
                        });
                    }
                }
            }

            tracing::info!("Enrichment pool stopped");
        });

        EnrichmentQueue { tx, shutdown_tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use keepsake_core::models::Visibility;
    use keepsake_db::{MemoryAssetRepository, MemoryConfigRepository, NewAsset};
    use std::io::Cursor;
    use std::time::Duration;

    use crate::config::ConfigResolver;

    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn enricher_over(
        assets: Arc<MemoryAssetRepository>,
        root: &std::path::Path,
    ) -> Arc<MediaEnricher> {
        let configs = Arc::new(ConfigResolver::new(Arc::new(MemoryConfigRepository::new())));
        let selector = Arc::new(StorageSelector::new(configs, root));
        Arc::new(MediaEnricher::new(
            assets,
            selector,
            VideoProbe::new("ffprobe").unwrap(),
            FfmpegCover::new("ffmpeg").unwrap(),
        ))
    }

    async fn seeded_image_asset(assets: &MemoryAssetRepository, path: &str) -> Uuid {
        let id = Uuid::now_v7();
        assets
            .create(NewAsset {
                id,
                user_id: 2,
                album_id: None,
                kind: AssetKind::Image,
                url: format!("/uploads/{}", path),
                name: "pic.png".to_string(),
                size: 1,
                kind_tag: "png".to_string(),
                visibility: Visibility::Private,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn image_job_writes_thumbnail_and_updates_row() {
        let dir = tempfile::tempdir().unwrap();
        let assets = Arc::new(MemoryAssetRepository::new());
        let enricher = enricher_over(assets.clone(), dir.path());

        let path = "image/2025/01/02/pic.png";
        let id = seeded_image_asset(&assets, path).await;

        enricher
            .process(EnrichmentJob {
                asset_id: id,
                kind: AssetKind::Image,
                relative_path: path.to_string(),
                data: test_png(800, 800),
            })
            .await;

        let stored = assets.snapshot(id).unwrap();
        assert_eq!(
            stored.derived_url.as_deref(),
            Some("/uploads/image/2025/01/02/pic_thumb.jpg")
        );
        assert!(dir.path().join("image/2025/01/02/pic_thumb.jpg").is_file());
        // A PNG from the image crate has no EXIF block.
        assert!(stored.capture.is_none());
    }

    #[tokio::test]
    async fn undecodable_image_leaves_row_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let assets = Arc::new(MemoryAssetRepository::new());
        let enricher = enricher_over(assets.clone(), dir.path());

        let id = seeded_image_asset(&assets, "image/x.png").await;
        enricher
            .process(EnrichmentJob {
                asset_id: id,
                kind: AssetKind::Image,
                relative_path: "image/x.png".to_string(),
                data: b"garbage".to_vec(),
            })
            .await;

        let stored = assets.snapshot(id).unwrap();
        assert!(stored.derived_url.is_none());
        assert!(stored.capture.is_none());
    }

    #[tokio::test]
    async fn pool_processes_queued_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let assets = Arc::new(MemoryAssetRepository::new());
        let enricher = enricher_over(assets.clone(), dir.path());
        let queue = EnrichmentPool::start(enricher, 2, 8);

        let path = "image/pool.png";
        let id = seeded_image_asset(&assets, path).await;
        queue
            .enqueue(EnrichmentJob {
                asset_id: id,
                kind: AssetKind::Image,
                relative_path: path.to_string(),
                data: test_png(500, 200),
            })
            .await
            .unwrap();

        // No completion signal flows back; poll the repository.
        for _ in 0..100 {
            if assets.snapshot(id).unwrap().derived_url.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(
            assets.snapshot(id).unwrap().derived_url.as_deref(),
            Some("/uploads/image/pool_thumb.jpg")
        );
        queue.shutdown().await;
    }

    #[test]
    fn derived_paths_swap_source_extension_for_jpg() {
        assert_eq!(
            jpeg_derived_path("video/2024/01/01/clip.mp4"),
            "video/2024/01/01/clip_thumb.jpg"
        );
        assert_eq!(
            jpeg_derived_path("image/2025/01/02/pic.png"),
            "image/2025/01/02/pic_thumb.jpg"
        );
        assert_eq!(jpeg_derived_path("clip"), "clip_thumb.jpg");
    }
}
