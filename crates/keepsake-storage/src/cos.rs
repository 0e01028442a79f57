use crate::traits::{
    strip_url_prefix, validate_relative_path, Storage, StorageError, StorageKind, StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

/// Settings for Tencent Cloud COS, from system-scope configuration entries.
/// The bucket name must be in the provider's `name-appid` form.
#[derive(Clone, Debug)]
pub struct CosSettings {
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
}

/// Tencent COS storage implementation, driven through the provider's
/// S3-compatible endpoint.
///
/// Unlike the provider SDK's raw put-confirmation (an ETag), `upload` returns
/// a constructed public URL so all backends share one contract.
#[derive(Clone)]
pub struct CosStorage {
    store: AmazonS3,
    bucket: String,
    public_domain: String,
}

impl CosStorage {
    pub fn new(settings: CosSettings) -> StorageResult<Self> {
        let public_domain = format!(
            "https://{}.cos.{}.myqcloud.com",
            settings.bucket, settings.region
        );

        let store = AmazonS3Builder::new()
            .with_endpoint(public_domain.clone())
            .with_virtual_hosted_style_request(true)
            .with_region(settings.region.clone())
            .with_bucket_name(settings.bucket.clone())
            .with_access_key_id(settings.secret_id.clone())
            .with_secret_access_key(settings.secret_key.clone())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(CosStorage {
            store,
            bucket: settings.bucket,
            public_domain,
        })
    }
}

#[async_trait]
impl Storage for CosStorage {
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
                "COS upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        let url = format!("{}/{}", self.public_domain, relative_path);

        tracing::info!(
            bucket = %self.bucket,
            key = %relative_path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "COS upload successful"
        );

        Ok(url)
    }

    async fn delete(&self, url: &str) -> StorageResult<()> {
        let Some(key) = strip_url_prefix(url, &self.public_domain) else {
            tracing::debug!(url = %url, "URL outside COS domain, skipping delete");
            return Ok(());
        };

        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(bucket = %self.bucket, key = %key, "COS delete successful");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "COS delete failed");
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Cos
    }
}
