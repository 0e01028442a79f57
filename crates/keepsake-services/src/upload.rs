//! Upload admission.
//!
//! Everything on the synchronous upload path happens here, in a fixed
//! order: validation, quota, rate limit, physical upload, row write, and
//! finally the enrichment enqueue. The enqueue happens only after the row
//! exists, so a worker never races a missing row.

use chrono::{Datelike, Utc};
use keepsake_core::models::{Asset, AssetKind, Visibility};
use keepsake_core::AppError;
use keepsake_db::{AssetRepository, NewAsset};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ConfigResolver;
use crate::enrichment::{EnrichmentJob, EnrichmentQueue};
use crate::rate_limit::RateLimiter;
use crate::storage_select::StorageSelector;

/// An upload as received from the HTTP layer.
pub struct UploadedFile {
    /// Original file name as sent by the client.
    pub name: String,
    pub data: Vec<u8>,
}

/// Result of an admitted upload. Categories matching an asset kind
/// (`image`, `video`) create a row; anything else (`avatar`, `cover`, ...)
/// is stored and returns only its URL.
#[derive(Debug)]
pub enum UploadOutcome {
    Asset(Asset),
    Url(String),
}

pub struct UploadService {
    assets: Arc<dyn AssetRepository>,
    configs: Arc<ConfigResolver>,
    limiter: RateLimiter,
    selector: Arc<StorageSelector>,
    enrichment: EnrichmentQueue,
}

impl UploadService {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        configs: Arc<ConfigResolver>,
        limiter: RateLimiter,
        selector: Arc<StorageSelector>,
        enrichment: EnrichmentQueue,
    ) -> Self {
        Self {
            assets,
            configs,
            limiter,
            selector,
            enrichment,
        }
    }

    #[tracing::instrument(skip(self, file), fields(user_id = user_id, category = %category, file_name = %file.name, size_bytes = file.data.len()))]
    pub async fn handle_upload(
        &self,
        user_id: i64,
        file: UploadedFile,
        album_id: Option<i64>,
        category: &str,
    ) -> Result<UploadOutcome, AppError> {
        if file.data.is_empty() {
            return Err(AppError::InvalidInput("File is empty".to_string()));
        }

        let name = file.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("File name is blank".to_string()));
        }
        if name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(AppError::InvalidInput(format!(
                "File name contains path separators: {}",
                name
            )));
        }

        let ext = extension_of(name).ok_or_else(|| {
            AppError::InvalidInput(format!("File name has no extension: {}", name))
        })?;

        validate_category(category)?;

        // Only categories naming an asset kind get a database row.
        let kind = AssetKind::from_str(category).ok();
        let size = file.data.len() as i64;

        // Quota is tracked per kind; free-form categories (avatar, cover)
        // bypass it but still face the single-file ceiling below.
        if let Some(kind) = kind {
            let limit = self.configs.max_storage_bytes(user_id).await?;
            let used = self.assets.used_bytes(user_id, kind).await?;
            if used + size > limit {
                return Err(AppError::QuotaExceeded { used, limit });
            }
        }

        let size_kind = kind.unwrap_or(AssetKind::Image);
        let max_file = self.configs.max_file_bytes(user_id, size_kind).await?;
        if size > max_file {
            return Err(AppError::PayloadTooLarge(format!(
                "{} bytes exceeds the {} byte ceiling",
                size, max_file
            )));
        }

        let allowed = self.configs.allowed_extensions(user_id, size_kind).await?;
        if !allowed.contains(&ext) {
            return Err(AppError::InvalidInput(format!(
                "Extension {} is not allowed",
                ext
            )));
        }

        self.limiter.check(user_id).await?;

        let id = Uuid::now_v7();
        let relative_path = self.build_path(user_id, category, id, &ext).await?;

        let storage = self.selector.current().await?;
        let url = storage
            .upload(file.data.clone(), &relative_path)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let Some(kind) = kind else {
            tracing::info!(url = %url, "Upload stored without asset row");
            return Ok(UploadOutcome::Url(url));
        };

        let asset = self
            .assets
            .create(NewAsset {
                id,
                user_id,
                album_id,
                kind,
                url,
                name: name.to_string(),
                size,
                kind_tag: ext,
                visibility: Visibility::Private,
            })
            .await?;

        self.enrichment
            .enqueue(EnrichmentJob {
                asset_id: asset.id,
                kind,
                relative_path,
                data: file.data,
            })
            .await?;

        tracing::info!(asset_id = %asset.id, url = %asset.url, "Upload admitted");
        Ok(UploadOutcome::Asset(asset))
    }

    /// `[{user_upload_dir}/]{category}/{YYYY}/{MM}/{DD}/{uuid}.{ext}`
    async fn build_path(
        &self,
        user_id: i64,
        category: &str,
        id: Uuid,
        ext: &str,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let dated = format!(
            "{}/{}/{:02}/{:02}/{}.{}",
            category,
            now.year(),
            now.month(),
            now.day(),
            id,
            ext
        );

        Ok(match self.configs.user_upload_dir(user_id).await? {
            Some(dir) => format!("{}/{}", dir, dated),
            None => dated,
        })
    }
}

fn extension_of(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    let ext = &name[idx + 1..];
    (!ext.is_empty()).then(|| ext.to_lowercase())
}

/// Categories are used verbatim as a storage path segment.
fn validate_category(category: &str) -> Result<(), AppError> {
    if category.trim().is_empty() {
        return Err(AppError::InvalidInput("Category is blank".to_string()));
    }
    if category.contains("..") || category.contains('/') || category.contains('\\') {
        return Err(AppError::InvalidInput(format!(
            "Category contains path separators: {}",
            category
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{EnrichmentPool, MediaEnricher};
    use crate::rate_limit::{MemoryCounterStore, UploadLimits};
    use image::{ImageFormat, Rgba, RgbaImage};
    use keepsake_core::constants::config_key;
    use keepsake_db::{MemoryAssetRepository, MemoryConfigRepository};
    use keepsake_processing::{FfmpegCover, VideoProbe};
    use std::io::Cursor;
    use std::time::Duration;

    struct Fixture {
        service: UploadService,
        assets: Arc<MemoryAssetRepository>,
        configs: Arc<ConfigResolver>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with_limits(UploadLimits::default())
    }

    fn fixture_with_limits(limits: UploadLimits) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let assets = Arc::new(MemoryAssetRepository::new());
        let configs = Arc::new(ConfigResolver::new(Arc::new(MemoryConfigRepository::new())));
        let selector = Arc::new(StorageSelector::new(configs.clone(), dir.path()));
        let enricher = Arc::new(MediaEnricher::new(
            assets.clone(),
            selector.clone(),
            VideoProbe::new("ffprobe").unwrap(),
            FfmpegCover::new("ffmpeg").unwrap(),
        ));
        let queue = EnrichmentPool::start(enricher, 2, 16);
        let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), limits);

        Fixture {
            service: UploadService::new(
                assets.clone(),
                configs.clone(),
                limiter,
                selector,
                queue,
            ),
            assets,
            configs,
            _dir: dir,
        }
    }

    fn png_file(name: &str, width: u32, height: u32) -> UploadedFile {
        let img = RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255]));
        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        UploadedFile {
            name: name.to_string(),
            data,
        }
    }

    fn raw_file(name: &str, data: Vec<u8>) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn image_upload_creates_row_and_eventually_a_thumbnail() {
        let fx = fixture();

        let outcome = fx
            .service
            .handle_upload(2, png_file("holiday.png", 600, 600), Some(11), "image")
            .await
            .unwrap();

        let UploadOutcome::Asset(asset) = outcome else {
            panic!("expected an asset row for the image category");
        };
        assert_eq!(asset.user_id, 2);
        assert_eq!(asset.album_id, Some(11));
        assert_eq!(asset.kind_tag, "png");
        assert!(asset.url.starts_with("/uploads/image/"));
        assert!(asset.derived_url.is_none());

        // Enrichment has no completion signal; poll the repository.
        let mut derived = None;
        for _ in 0..100 {
            derived = fx.assets.snapshot(asset.id).unwrap().derived_url;
            if derived.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let derived = derived.expect("thumbnail never appeared");
        assert!(derived.ends_with("_thumb.jpg"), "got {}", derived);
        // The primary URL must not have been touched.
        assert_eq!(fx.assets.snapshot(asset.id).unwrap().url, asset.url);
    }

    #[tokio::test]
    async fn avatar_category_returns_url_without_row() {
        let fx = fixture();

        let outcome = fx
            .service
            .handle_upload(2, png_file("me.png", 64, 64), None, "avatar")
            .await
            .unwrap();

        match outcome {
            UploadOutcome::Url(url) => assert!(url.starts_with("/uploads/avatar/")),
            UploadOutcome::Asset(_) => panic!("avatar uploads must not create rows"),
        }
        assert!(fx.assets.is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_blank_and_traversal_names() {
        let fx = fixture();

        for file in [
            raw_file("a.png", vec![]),
            raw_file("   ", vec![1]),
            raw_file("../evil.png", vec![1]),
            raw_file("a/b.png", vec![1]),
            raw_file("noextension", vec![1]),
        ] {
            match fx.service.handle_upload(2, file, None, "image").await {
                Err(AppError::InvalidInput(_)) => {}
                other => panic!("expected InvalidInput, got {:?}", other.err()),
            }
        }
    }

    #[tokio::test]
    async fn rejects_bad_categories() {
        let fx = fixture();

        for category in ["", "  ", "a/b", "..", "a\\b"] {
            let result = fx
                .service
                .handle_upload(2, raw_file("x.png", vec![1]), None, category)
                .await;
            assert!(result.is_err(), "category {:?} was accepted", category);
        }
    }

    #[tokio::test]
    async fn quota_boundary_admits_exact_fit_then_denies() {
        let fx = fixture();
        fx.configs
            .set_value(None, config_key::MAX_STORAGE_SIZE, "2000")
            .await
            .unwrap();
        // Raise the allow-list check out of the way for raw bytes.
        fx.configs
            .set_value(None, config_key::ALLOWED_EXTENSIONS, "png")
            .await
            .unwrap();

        fx.service
            .handle_upload(2, raw_file("a.png", vec![0u8; 1500]), None, "image")
            .await
            .unwrap();

        // 1500 + 500 lands exactly on the ceiling.
        fx.service
            .handle_upload(2, raw_file("b.png", vec![0u8; 500]), None, "image")
            .await
            .unwrap();

        match fx
            .service
            .handle_upload(2, raw_file("c.png", vec![0u8; 1]), None, "image")
            .await
        {
            Err(AppError::QuotaExceeded { used, limit }) => {
                assert_eq!(used, 2000);
                assert_eq!(limit, 2000);
            }
            other => panic!("expected quota denial, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn user_scoped_quota_override_takes_precedence() {
        let fx = fixture();
        fx.configs
            .set_value(None, config_key::MAX_STORAGE_SIZE, "100")
            .await
            .unwrap();
        fx.configs
            .set_value(None, config_key::ALLOWED_EXTENSIONS, "png")
            .await
            .unwrap();

        match fx
            .service
            .handle_upload(2, raw_file("a.png", vec![0u8; 500]), None, "image")
            .await
        {
            Err(AppError::QuotaExceeded { .. }) => {}
            other => panic!("expected quota denial, got {:?}", other.err()),
        }

        // A user-scoped entry beats the system ceiling for that user.
        // This is why config writes are an admin-only operation at the
        // HTTP layer: a self-scope write would lift the caller's own limit.
        fx.configs
            .set_value(Some(2), config_key::MAX_STORAGE_SIZE, "1000000")
            .await
            .unwrap();
        fx.service
            .handle_upload(2, raw_file("a.png", vec![0u8; 500]), None, "image")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn file_size_ceiling_applies() {
        let fx = fixture();
        fx.configs
            .set_value(None, config_key::MAX_FILE_SIZE, "100")
            .await
            .unwrap();

        match fx
            .service
            .handle_upload(2, raw_file("big.png", vec![0u8; 101]), None, "image")
            .await
        {
            Err(AppError::PayloadTooLarge(_)) => {}
            other => panic!("expected PayloadTooLarge, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn extension_allow_list_is_case_insensitive_and_dot_agnostic() {
        let fx = fixture();
        fx.configs
            .set_value(None, config_key::ALLOWED_EXTENSIONS, ".PNG, jpg")
            .await
            .unwrap();

        fx.service
            .handle_upload(2, raw_file("ok.Png", vec![1]), None, "avatar")
            .await
            .unwrap();

        match fx
            .service
            .handle_upload(2, raw_file("no.webp", vec![1]), None, "avatar")
            .await
        {
            Err(AppError::InvalidInput(msg)) => assert!(msg.contains("webp")),
            other => panic!("expected allow-list denial, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn rate_limit_denies_after_budget_spent() {
        let fx = fixture_with_limits(UploadLimits {
            hourly: 1,
            daily: 100,
            monthly: 100,
        });

        fx.service
            .handle_upload(2, png_file("one.png", 10, 10), None, "image")
            .await
            .unwrap();

        match fx
            .service
            .handle_upload(2, png_file("two.png", 10, 10), None, "image")
            .await
        {
            Err(AppError::RateLimited { window, .. }) => assert_eq!(window, "hour"),
            other => panic!("expected rate limit denial, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn user_upload_dir_prefixes_the_storage_path() {
        let fx = fixture();
        fx.configs
            .set_value(Some(2), config_key::USER_UPLOAD_DIR, "u2")
            .await
            .unwrap();

        let outcome = fx
            .service
            .handle_upload(2, png_file("p.png", 10, 10), None, "image")
            .await
            .unwrap();

        let UploadOutcome::Asset(asset) = outcome else {
            panic!("expected asset");
        };
        assert!(asset.url.starts_with("/uploads/u2/image/"), "got {}", asset.url);
    }
}
