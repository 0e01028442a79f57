use crate::traits::{
    strip_url_prefix, validate_relative_path, Storage, StorageError, StorageKind, StorageResult,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Objects live under `base_path` and are served under the fixed public
/// mount `public_prefix` (e.g. `/uploads`). `delete` only acts on URLs
/// carrying that prefix; everything else belongs to another backend.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    public_prefix: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance, ensuring the root directory exists.
    pub async fn new(base_path: impl Into<PathBuf>, public_prefix: &str) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, relative_path: &str) -> StorageResult<PathBuf> {
        validate_relative_path(relative_path)?;
        Ok(self.base_path.join(relative_path))
    }

    fn url_for(&self, relative_path: &str) -> String {
        format!("{}/{}", self.public_prefix, relative_path)
    }

    async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_file(tmp: &Path, dest: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(tmp, dest).await
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, data: Vec<u8>, relative_path: &str) -> StorageResult<String> {
        let path = self.path_for(relative_path)?;
        let size = data.len();

        Self::ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        // Write to a sibling temp file and rename into place, so a failed
        // write never leaves a partial object at the final path.
        let tmp = PathBuf::from(format!("{}.part", path.display()));
        if let Err(e) = Self::write_file(&tmp, &path, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to write file {}: {}",
                path.display(),
                e
            )));
        }

        let url = self.url_for(relative_path);

        tracing::info!(
            path = %path.display(),
            relative_path = %relative_path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(url)
    }

    async fn delete(&self, url: &str) -> StorageResult<()> {
        // Only URLs under the public mount are ours.
        let Some(relative_path) = strip_url_prefix(url, &self.public_prefix) else {
            tracing::debug!(url = %url, "URL outside local mount, skipping delete");
            return Ok(());
        };

        let path = self.path_for(relative_path)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), url = %url, "Local storage delete successful");

        Ok(())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }
}
