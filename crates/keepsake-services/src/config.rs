//! Domain configuration resolver.
//!
//! Domain configuration (quotas, allow-lists, storage selection) lives in
//! the database so it can change without a restart. Resolution is
//! hierarchical: a user-scoped entry overrides the system default for the
//! same key. Reads go through a process-local cache that is fully
//! invalidated on any write.

use keepsake_core::constants::{
    self, config_key, DEFAULT_IMAGE_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS,
};
use keepsake_core::models::{AssetKind, ConfigEntry};
use keepsake_core::AppError;
use keepsake_db::ConfigRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type CacheKey = (Option<i64>, String);

pub struct ConfigResolver {
    repo: Arc<dyn ConfigRepository>,
    // Negative results are cached too; a miss on every request would put
    // the database on the upload hot path.
    cache: RwLock<HashMap<CacheKey, Option<String>>>,
}

impl ConfigResolver {
    pub fn new(repo: Arc<dyn ConfigRepository>) -> Self {
        Self {
            repo,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// A user id of 0 means "no owner" in data imported from older
    /// deployments; treat it as the system scope.
    fn normalize_owner(user_id: Option<i64>) -> Option<i64> {
        user_id.filter(|id| *id != 0)
    }

    /// Resolve a key for a user: their own entry first, then the system
    /// default, then `None`.
    pub async fn get_value(
        &self,
        user_id: Option<i64>,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let owner = Self::normalize_owner(user_id);

        if let Some(owner) = owner {
            if let Some(value) = self.scoped_value(Some(owner), key).await? {
                return Ok(Some(value));
            }
        }
        self.scoped_value(None, key).await
    }

    /// Value at exactly one scope, read through the cache.
    async fn scoped_value(
        &self,
        owner: Option<i64>,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let cache_key = (owner, key.to_string());

        if let Some(cached) = self.cache.read().await.get(&cache_key) {
            return Ok(cached.clone());
        }

        let value = self.repo.get(owner, key).await?;
        self.cache
            .write()
            .await
            .insert(cache_key, value.clone());
        Ok(value)
    }

    /// Every system key in system order, with the user's override
    /// substituted where one exists.
    pub async fn effective_configs(&self, user_id: i64) -> Result<Vec<ConfigEntry>, AppError> {
        let owner = Self::normalize_owner(Some(user_id));
        let system = self.repo.list(None).await?;
        let overrides: HashMap<String, String> = match owner {
            Some(owner) => self
                .repo
                .list(Some(owner))
                .await?
                .into_iter()
                .map(|e| (e.config_key, e.config_value))
                .collect(),
            None => HashMap::new(),
        };

        Ok(system
            .into_iter()
            .map(|entry| match overrides.get(&entry.config_key) {
                Some(value) => ConfigEntry {
                    user_id: owner,
                    config_value: value.clone(),
                    ..entry
                },
                None => entry,
            })
            .collect())
    }

    /// Upsert a value and invalidate the whole cache before returning, so
    /// a subsequent read anywhere in the process sees the new value.
    pub async fn set_value(
        &self,
        owner: Option<i64>,
        key: &str,
        value: &str,
    ) -> Result<(), AppError> {
        let owner = Self::normalize_owner(owner);
        self.repo.upsert(owner, key, value).await?;
        self.cache.write().await.clear();
        tracing::info!(config_key = %key, owner = ?owner, "Config value updated");
        Ok(())
    }

    /// Parsed numeric value with a fallback default. Unparseable values
    /// are logged and fall back rather than failing the request.
    pub async fn get_i64(
        &self,
        user_id: Option<i64>,
        key: &str,
        default: i64,
    ) -> Result<i64, AppError> {
        match self.get_value(user_id, key).await? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) => Ok(n),
                Err(_) => {
                    tracing::warn!(config_key = %key, value = %raw, "Config value is not a number, using default");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    pub async fn max_storage_bytes(&self, user_id: i64) -> Result<i64, AppError> {
        self.get_i64(
            Some(user_id),
            config_key::MAX_STORAGE_SIZE,
            constants::DEFAULT_MAX_STORAGE_BYTES,
        )
        .await
    }

    pub async fn max_file_bytes(&self, user_id: i64, kind: AssetKind) -> Result<i64, AppError> {
        let default = match kind {
            AssetKind::Image => constants::DEFAULT_MAX_IMAGE_BYTES,
            AssetKind::Video => constants::DEFAULT_MAX_VIDEO_BYTES,
        };
        self.get_i64(Some(user_id), config_key::MAX_FILE_SIZE, default)
            .await
    }

    /// The extension allow-list for one asset kind, lowercased and bare
    /// (no leading dot). Falls back to the built-in defaults.
    pub async fn allowed_extensions(
        &self,
        user_id: i64,
        kind: AssetKind,
    ) -> Result<Vec<String>, AppError> {
        if let Some(raw) = self
            .get_value(Some(user_id), config_key::ALLOWED_EXTENSIONS)
            .await?
        {
            let parsed = parse_extension_list(&raw);
            if !parsed.is_empty() {
                return Ok(parsed);
            }
        }

        let defaults = match kind {
            AssetKind::Image => DEFAULT_IMAGE_EXTENSIONS,
            AssetKind::Video => DEFAULT_VIDEO_EXTENSIONS,
        };
        Ok(defaults.iter().map(|e| e.to_string()).collect())
    }

    /// Optional per-user sub-directory prepended to storage paths.
    pub async fn user_upload_dir(&self, user_id: i64) -> Result<Option<String>, AppError> {
        let dir = self
            .get_value(Some(user_id), config_key::USER_UPLOAD_DIR)
            .await?
            .map(|d| d.trim_matches('/').to_string())
            .filter(|d| !d.is_empty());
        Ok(dir)
    }
}

/// Parse a comma-separated extension list. Entries are trimmed,
/// lowercased, and a leading dot is stripped so `.JPG` and `jpg` compare
/// equal.
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_db::MemoryConfigRepository;

    fn resolver_with(seed: &[(Option<i64>, &str, &str)]) -> ConfigResolver {
        let repo = MemoryConfigRepository::new();
        for (owner, key, value) in seed {
            repo.seed(*owner, key, value);
        }
        ConfigResolver::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn user_value_overrides_system_default() {
        let resolver = resolver_with(&[
            (None, config_key::MAX_FILE_SIZE, "1000"),
            (Some(7), config_key::MAX_FILE_SIZE, "2000"),
        ]);

        assert_eq!(
            resolver
                .get_value(Some(7), config_key::MAX_FILE_SIZE)
                .await
                .unwrap()
                .as_deref(),
            Some("2000")
        );
        assert_eq!(
            resolver
                .get_value(Some(8), config_key::MAX_FILE_SIZE)
                .await
                .unwrap()
                .as_deref(),
            Some("1000")
        );
        assert_eq!(
            resolver
                .get_value(None, config_key::MAX_FILE_SIZE)
                .await
                .unwrap()
                .as_deref(),
            Some("1000")
        );
    }

    #[tokio::test]
    async fn owner_zero_is_the_system_scope() {
        let resolver = resolver_with(&[(None, config_key::UPLOAD_PATH, "/srv/media")]);

        assert_eq!(
            resolver
                .get_value(Some(0), config_key::UPLOAD_PATH)
                .await
                .unwrap()
                .as_deref(),
            Some("/srv/media")
        );
    }

    #[tokio::test]
    async fn set_value_invalidates_cached_reads() {
        let repo = Arc::new(MemoryConfigRepository::new());
        repo.seed(None, config_key::STORAGE_TYPE, "LOCAL");
        let resolver = ConfigResolver::new(repo.clone());

        // Prime the cache.
        assert_eq!(
            resolver
                .get_value(None, config_key::STORAGE_TYPE)
                .await
                .unwrap()
                .as_deref(),
            Some("LOCAL")
        );

        resolver
            .set_value(None, config_key::STORAGE_TYPE, "S3")
            .await
            .unwrap();

        assert_eq!(
            resolver
                .get_value(None, config_key::STORAGE_TYPE)
                .await
                .unwrap()
                .as_deref(),
            Some("S3")
        );
    }

    #[tokio::test]
    async fn effective_configs_substitute_user_overrides() {
        let resolver = resolver_with(&[
            (None, "a", "1"),
            (None, "b", "2"),
            (Some(5), "b", "20"),
            (Some(5), "c", "ignored, no system key"),
        ]);

        let effective = resolver.effective_configs(5).await.unwrap();
        let pairs: Vec<(&str, &str)> = effective
            .iter()
            .map(|e| (e.config_key.as_str(), e.config_value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "20")]);
    }

    #[tokio::test]
    async fn unparseable_numeric_config_falls_back() {
        let resolver = resolver_with(&[(None, config_key::MAX_FILE_SIZE, "ten megabytes")]);
        assert_eq!(
            resolver
                .get_i64(Some(1), config_key::MAX_FILE_SIZE, 42)
                .await
                .unwrap(),
            42
        );
    }

    #[test]
    fn extension_list_accepts_dotted_and_bare_forms() {
        assert_eq!(
            parse_extension_list(".JPG, png , .Gif,,webp"),
            vec!["jpg", "png", "gif", "webp"]
        );
        assert!(parse_extension_list("  ,, ").is_empty());
    }

    #[tokio::test]
    async fn extension_defaults_differ_by_kind() {
        let resolver = resolver_with(&[]);
        let images = resolver
            .allowed_extensions(1, AssetKind::Image)
            .await
            .unwrap();
        let videos = resolver
            .allowed_extensions(1, AssetKind::Video)
            .await
            .unwrap();
        assert!(images.contains(&"jpg".to_string()));
        assert!(videos.contains(&"mp4".to_string()));
        assert!(!videos.contains(&"jpg".to_string()));
    }
}
