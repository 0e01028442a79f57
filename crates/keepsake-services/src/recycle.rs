//! Recycle bin and scheduled purge.
//!
//! Soft deletion keeps the row and every backing object; only the purge,
//! after the retention window, removes anything physically. During a
//! purge, storage deletes come first and failures never block the batch.
//! The row delete is conditional on the asset still being soft-deleted,
//! so a restore racing the purge keeps the row.

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use keepsake_core::constants::RECYCLE_RETENTION_DAYS;
use keepsake_core::models::Asset;
use keepsake_core::AppError;
use keepsake_db::AssetRepository;
use keepsake_storage::Storage;
use std::sync::Arc;
use uuid::Uuid;

use crate::storage_select::StorageSelector;

pub struct RecycleService {
    assets: Arc<dyn AssetRepository>,
    selector: Arc<StorageSelector>,
}

impl RecycleService {
    pub fn new(assets: Arc<dyn AssetRepository>, selector: Arc<StorageSelector>) -> Self {
        Self { assets, selector }
    }

    /// Move assets into the recycle bin. Ids that are missing, foreign, or
    /// already recycled are skipped; the count of moved assets is returned.
    pub async fn soft_delete(&self, user_id: i64, ids: &[Uuid]) -> Result<usize, AppError> {
        let mut moved = 0;
        for id in ids {
            match self.assets.soft_delete(user_id, *id).await {
                Ok(_) => moved += 1,
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(asset_id = %id, "Skipping recycle of missing or foreign asset");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(user_id = user_id, moved = moved, "Assets moved to recycle bin");
        Ok(moved)
    }

    /// Bring assets back out of the recycle bin. Same skip semantics as
    /// [`soft_delete`](Self::soft_delete).
    pub async fn restore(&self, user_id: i64, ids: &[Uuid]) -> Result<usize, AppError> {
        let mut restored = 0;
        for id in ids {
            match self.assets.restore(user_id, *id).await {
                Ok(_) => restored += 1,
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(asset_id = %id, "Skipping restore of missing or live asset");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(user_id = user_id, restored = restored, "Assets restored");
        Ok(restored)
    }

    /// Page through the user's recycled assets, newest deletion first.
    pub async fn list_deleted(
        &self,
        user_id: i64,
        page: i64,
        per_page: i64,
    ) -> Result<Vec<Asset>, AppError> {
        let per_page = per_page.clamp(1, 200);
        let offset = (page.max(1) - 1) * per_page;
        self.assets.list_deleted(user_id, per_page, offset).await
    }

    /// Permanently remove every asset recycled longer than the retention
    /// window. Returns the number of purged rows. Safe to run repeatedly.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<usize, AppError> {
        let cutoff = Utc::now() - ChronoDuration::days(RECYCLE_RETENTION_DAYS);
        let expired = self.assets.list_expired_deleted(cutoff).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let storage = self.selector.current().await?;
        let mut purged = 0;

        for asset in expired {
            self.delete_objects(storage.as_ref(), &asset).await;

            match self.assets.purge(asset.id).await {
                Ok(true) => purged += 1,
                Ok(false) => {
                    // A restore won the race; the objects may already be
                    // gone, which the owner can see from the dead URL.
                    tracing::warn!(asset_id = %asset.id, "Asset restored during purge, row kept");
                }
                Err(e) => {
                    tracing::error!(asset_id = %asset.id, error = %e, "Row purge failed");
                }
            }
        }

        tracing::info!(purged = purged, "Recycle bin purge completed");
        Ok(purged)
    }

    /// Storage-object deletion for a purge. Errors are logged and the
    /// batch continues; an orphaned object is preferred over a row that
    /// can never be purged.
    async fn delete_objects(&self, storage: &dyn Storage, asset: &Asset) {
        if let Err(e) = storage.delete(&asset.url).await {
            tracing::error!(asset_id = %asset.id, url = %asset.url, error = %e, "Primary object delete failed");
        }
        if let Some(derived) = &asset.derived_url {
            if let Err(e) = storage.delete(derived).await {
                tracing::error!(asset_id = %asset.id, url = %derived, error = %e, "Derived object delete failed");
            }
        }
    }
}

/// Runs the purge once a day at a fixed hour (UTC).
pub struct PurgeScheduler;

impl PurgeScheduler {
    pub fn start(service: Arc<RecycleService>, purge_hour: u32) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(purge_hour = purge_hour, "Purge scheduler started");
            loop {
                let wait = seconds_until_next(purge_hour);
                tokio::time::sleep(std::time::Duration::from_secs(wait)).await;

                if let Err(e) = service.purge_expired().await {
                    tracing::error!(error = %e, "Scheduled purge failed");
                }
            }
        })
    }
}

/// Seconds until the next occurrence of `hour:00:00` UTC.
fn seconds_until_next(hour: u32) -> u64 {
    let now = Utc::now();
    let today_run = now
        .with_hour(hour % 24)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let next = if today_run > now {
        today_run
    } else {
        today_run + ChronoDuration::days(1)
    };

    (next - now).num_seconds().max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigResolver;
    use keepsake_core::models::{AssetKind, Visibility};
    use keepsake_db::{MemoryAssetRepository, MemoryConfigRepository, NewAsset};

    struct Fixture {
        service: RecycleService,
        assets: Arc<MemoryAssetRepository>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let assets = Arc::new(MemoryAssetRepository::new());
        let configs = Arc::new(ConfigResolver::new(Arc::new(MemoryConfigRepository::new())));
        let selector = Arc::new(StorageSelector::new(configs, dir.path()));
        Fixture {
            service: RecycleService::new(assets.clone(), selector),
            assets,
            dir,
        }
    }

    async fn stored_asset(fx: &Fixture, user_id: i64, rel: &str) -> Uuid {
        // Put real bytes on disk so the purge has objects to remove.
        let path = fx.dir.path().join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, b"bytes").await.unwrap();

        let id = Uuid::now_v7();
        fx.assets
            .create(NewAsset {
                id,
                user_id,
                album_id: None,
                kind: AssetKind::Image,
                url: format!("/uploads/{}", rel),
                name: "p.jpg".to_string(),
                size: 5,
                kind_tag: "jpg".to_string(),
                visibility: Visibility::Private,
            })
            .await
            .unwrap();
        id
    }

    /// Backdate a recycled asset past the retention window.
    fn expire(assets: &MemoryAssetRepository, id: Uuid) {
        let mut asset = assets.snapshot(id).unwrap();
        asset.deleted = true;
        asset.deleted_at = Some(Utc::now() - ChronoDuration::days(RECYCLE_RETENTION_DAYS + 1));
        assets.replace(asset);
    }

    #[tokio::test]
    async fn soft_delete_and_restore_round_trip() {
        let fx = fixture();
        let id = stored_asset(&fx, 4, "image/a.jpg").await;

        assert_eq!(fx.service.soft_delete(4, &[id]).await.unwrap(), 1);
        assert!(fx.assets.snapshot(id).unwrap().deleted);

        let listed = fx.service.list_deleted(4, 1, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);

        assert_eq!(fx.service.restore(4, &[id]).await.unwrap(), 1);
        let restored = fx.assets.snapshot(id).unwrap();
        assert!(!restored.deleted);
        assert!(restored.deleted_at.is_none());
    }

    #[tokio::test]
    async fn foreign_and_missing_ids_are_skipped() {
        let fx = fixture();
        let mine = stored_asset(&fx, 4, "image/a.jpg").await;
        let theirs = stored_asset(&fx, 5, "image/b.jpg").await;

        let moved = fx
            .service
            .soft_delete(4, &[mine, theirs, Uuid::now_v7()])
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert!(!fx.assets.snapshot(theirs).unwrap().deleted);
    }

    #[tokio::test]
    async fn purge_removes_expired_rows_and_objects() {
        let fx = fixture();
        let old = stored_asset(&fx, 4, "image/old.jpg").await;
        let fresh = stored_asset(&fx, 4, "image/fresh.jpg").await;

        expire(&fx.assets, old);
        fx.service.soft_delete(4, &[fresh]).await.unwrap();

        assert_eq!(fx.service.purge_expired().await.unwrap(), 1);

        assert!(fx.assets.snapshot(old).is_none());
        assert!(!fx.dir.path().join("image/old.jpg").exists());
        // Inside the retention window: row and object stay.
        assert!(fx.assets.snapshot(fresh).is_some());
        assert!(fx.dir.path().join("image/fresh.jpg").exists());
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let fx = fixture();
        let old = stored_asset(&fx, 4, "image/old.jpg").await;
        expire(&fx.assets, old);

        assert_eq!(fx.service.purge_expired().await.unwrap(), 1);
        assert_eq!(fx.service.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn next_run_is_within_a_day() {
        let wait = seconds_until_next(2);
        assert!(wait >= 1);
        assert!(wait <= 24 * 3600);
    }
}
