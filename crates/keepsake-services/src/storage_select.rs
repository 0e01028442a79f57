//! Storage backend selection.
//!
//! The active backend is a system-scoped config value, read on every call
//! so an admin change takes effect on the next upload without a restart.
//! Anything unset, unknown, or missing its settings falls back to local
//! disk; an upload never fails because of a half-configured backend.

use keepsake_core::constants::{config_key, UPLOAD_ROOT_PATH};
use keepsake_core::AppError;
use keepsake_storage::{
    CosSettings, CosStorage, LocalStorage, S3Settings, S3Storage, Storage, StorageKind,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ConfigResolver;

pub struct StorageSelector {
    configs: Arc<ConfigResolver>,
    default_local_root: PathBuf,
}

impl StorageSelector {
    pub fn new(configs: Arc<ConfigResolver>, default_local_root: impl Into<PathBuf>) -> Self {
        Self {
            configs,
            default_local_root: default_local_root.into(),
        }
    }

    /// The currently selected backend, rebuilt from config on every call.
    pub async fn current(&self) -> Result<Arc<dyn Storage>, AppError> {
        let configured = self
            .configs
            .get_value(None, config_key::STORAGE_TYPE)
            .await?;

        let kind = match configured.as_deref() {
            Some(raw) => match StorageKind::parse(raw) {
                Some(kind) => kind,
                None => {
                    tracing::warn!(storage_type = %raw, "Unknown storage type, using local disk");
                    StorageKind::Local
                }
            },
            None => StorageKind::Local,
        };

        match kind {
            StorageKind::S3 => match self.s3_settings().await? {
                Some(settings) => match S3Storage::new(settings) {
                    Ok(storage) => return Ok(Arc::new(storage)),
                    Err(e) => {
                        tracing::error!(error = %e, "S3 backend construction failed, using local disk");
                    }
                },
                None => {
                    tracing::warn!("S3 selected but settings incomplete, using local disk");
                }
            },
            StorageKind::Cos => match self.cos_settings().await? {
                Some(settings) => match CosStorage::new(settings) {
                    Ok(storage) => return Ok(Arc::new(storage)),
                    Err(e) => {
                        tracing::error!(error = %e, "COS backend construction failed, using local disk");
                    }
                },
                None => {
                    tracing::warn!("COS selected but settings incomplete, using local disk");
                }
            },
            StorageKind::Local => {}
        }

        self.local().await
    }

    async fn local(&self) -> Result<Arc<dyn Storage>, AppError> {
        let root = self
            .configs
            .get_value(None, config_key::UPLOAD_PATH)
            .await?
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_local_root.clone());

        let storage = LocalStorage::new(root, UPLOAD_ROOT_PATH)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(Arc::new(storage))
    }

    async fn s3_settings(&self) -> Result<Option<S3Settings>, AppError> {
        let endpoint = self.system_value(config_key::S3_ENDPOINT).await?;
        let access_key = self.system_value(config_key::S3_ACCESS_KEY).await?;
        let secret_key = self.system_value(config_key::S3_SECRET_KEY).await?;
        let bucket = self.system_value(config_key::S3_BUCKET).await?;
        let public_domain = self.system_value(config_key::S3_DOMAIN).await?;

        Ok(
            match (endpoint, access_key, secret_key, bucket, public_domain) {
                (
                    Some(endpoint),
                    Some(access_key),
                    Some(secret_key),
                    Some(bucket),
                    Some(public_domain),
                ) => Some(S3Settings {
                    endpoint,
                    access_key,
                    secret_key,
                    bucket,
                    public_domain,
                }),
                _ => None,
            },
        )
    }

    async fn cos_settings(&self) -> Result<Option<CosSettings>, AppError> {
        let secret_id = self.system_value(config_key::COS_SECRET_ID).await?;
        let secret_key = self.system_value(config_key::COS_SECRET_KEY).await?;
        let region = self.system_value(config_key::COS_REGION).await?;
        let bucket = self.system_value(config_key::COS_BUCKET).await?;

        Ok(match (secret_id, secret_key, region, bucket) {
            (Some(secret_id), Some(secret_key), Some(region), Some(bucket)) => Some(CosSettings {
                secret_id,
                secret_key,
                region,
                bucket,
            }),
            _ => None,
        })
    }

    async fn system_value(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .configs
            .get_value(None, key)
            .await?
            .filter(|v| !v.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_db::MemoryConfigRepository;

    fn selector(seed: &[(&str, &str)], root: &std::path::Path) -> StorageSelector {
        let repo = MemoryConfigRepository::new();
        for (key, value) in seed {
            repo.seed(None, key, value);
        }
        StorageSelector::new(Arc::new(ConfigResolver::new(Arc::new(repo))), root)
    }

    #[tokio::test]
    async fn unset_storage_type_selects_local() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(&[], dir.path());
        assert_eq!(selector.current().await.unwrap().kind(), StorageKind::Local);
    }

    #[tokio::test]
    async fn unknown_storage_type_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(&[(config_key::STORAGE_TYPE, "ftp")], dir.path());
        assert_eq!(selector.current().await.unwrap().kind(), StorageKind::Local);
    }

    #[tokio::test]
    async fn s3_without_settings_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(
            &[
                (config_key::STORAGE_TYPE, "S3"),
                (config_key::S3_ENDPOINT, "https://minio.local:9000"),
                // access key, secret, bucket, domain missing
            ],
            dir.path(),
        );
        assert_eq!(selector.current().await.unwrap().kind(), StorageKind::Local);
    }

    #[tokio::test]
    async fn fully_configured_s3_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(
            &[
                (config_key::STORAGE_TYPE, "s3"),
                (config_key::S3_ENDPOINT, "https://minio.local:9000"),
                (config_key::S3_ACCESS_KEY, "ak"),
                (config_key::S3_SECRET_KEY, "sk"),
                (config_key::S3_BUCKET, "media"),
                (config_key::S3_DOMAIN, "https://cdn.example.com"),
            ],
            dir.path(),
        );
        assert_eq!(selector.current().await.unwrap().kind(), StorageKind::S3);
    }

    #[tokio::test]
    async fn selection_follows_config_changes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryConfigRepository::new());
        let configs = Arc::new(ConfigResolver::new(repo));
        let selector = StorageSelector::new(configs.clone(), dir.path());

        assert_eq!(selector.current().await.unwrap().kind(), StorageKind::Local);

        for (key, value) in [
            (config_key::STORAGE_TYPE, "COS"),
            (config_key::COS_SECRET_ID, "id"),
            (config_key::COS_SECRET_KEY, "key"),
            (config_key::COS_REGION, "ap-nanjing"),
            (config_key::COS_BUCKET, "album-125"),
        ] {
            configs.set_value(None, key, value).await.unwrap();
        }

        assert_eq!(selector.current().await.unwrap().kind(), StorageKind::Cos);
    }
}
