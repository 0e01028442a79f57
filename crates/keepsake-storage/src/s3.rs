use crate::traits::{
    strip_url_prefix, validate_relative_path, Storage, StorageError, StorageKind, StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

/// Settings for an S3-compatible backend (MinIO, AWS S3, Cloudflare R2, ...).
/// All values come from system-scope configuration entries.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Public domain under which uploaded objects are reachable,
    /// e.g. `https://media.example.com`.
    pub public_domain: String,
}

/// S3-compatible storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    public_domain: String,
}

impl S3Storage {
    pub fn new(settings: S3Settings) -> StorageResult<Self> {
        let allow_http = settings.endpoint.starts_with("http://");

        let store = AmazonS3Builder::new()
            .with_endpoint(settings.endpoint.clone())
            .with_allow_http(allow_http)
            .with_region("us-east-1")
            .with_bucket_name(settings.bucket.clone())
            .with_access_key_id(settings.access_key.clone())
            .with_secret_access_key(settings.secret_key.clone())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket: settings.bucket,
            public_domain: settings.public_domain.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_domain, key)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, data: Vec<u8>, relative_path: &str) -> StorageResult<String> {
        validate_relative_path(relative_path)?;

        let size = data.len() as u64;
        let bytes = Bytes::from(data);
        let location = Path::from(relative_path.to_string());

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(bytes)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %relative_path,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        let url = self.url_for(relative_path);

        tracing::info!(
            bucket = %self.bucket,
            key = %relative_path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(url)
    }

    async fn delete(&self, url: &str) -> StorageResult<()> {
        // Strip the public domain to recover the object key; foreign URLs
        // belong to another backend.
        let Some(key) = strip_url_prefix(url, &self.public_domain) else {
            tracing::debug!(url = %url, "URL outside S3 public domain, skipping delete");
            return Ok(());
        };

        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> S3Settings {
        S3Settings {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            bucket: "media".to_string(),
            public_domain: "https://media.example.com/".to_string(),
        }
    }

    #[test]
    fn public_domain_trailing_slash_is_normalized() {
        let storage = S3Storage::new(settings()).unwrap();
        assert_eq!(
            storage.url_for("image/a.jpg"),
            "https://media.example.com/image/a.jpg"
        );
    }

    #[tokio::test]
    async fn delete_ignores_urls_under_other_domains() {
        let storage = S3Storage::new(settings()).unwrap();
        // No request must be made for a URL this backend does not own,
        // including a domain that merely starts with ours.
        storage.delete("/uploads/local/file.jpg").await.unwrap();
        storage
            .delete("https://media.example.com.evil/image/a.jpg")
            .await
            .unwrap();
    }
}
