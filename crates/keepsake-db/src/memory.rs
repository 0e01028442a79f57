//! In-memory repository implementations.
//!
//! These back service tests without a database. Behavior mirrors the
//! Postgres implementations, including the restore-wins purge guard and
//! the write-once enrichment merge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_core::models::{Asset, AssetKind, ConfigEntry};
use keepsake_core::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::asset::{AssetRepository, EnrichmentUpdate, NewAsset};
use crate::config::ConfigRepository;

#[derive(Clone, Default)]
pub struct MemoryAssetRepository {
    assets: Arc<Mutex<HashMap<Uuid, Asset>>>,
}

impl MemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one asset, for test assertions.
    pub fn snapshot(&self, id: Uuid) -> Option<Asset> {
        self.assets.lock().unwrap().get(&id).cloned()
    }

    /// Overwrite an asset wholesale, for tests that backdate timestamps.
    pub fn replace(&self, asset: Asset) {
        self.assets.lock().unwrap().insert(asset.id, asset);
    }

    pub fn len(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl AssetRepository for MemoryAssetRepository {
    async fn create(&self, asset: NewAsset) -> Result<Asset, AppError> {
        let now = Utc::now();
        let stored = Asset {
            id: asset.id,
            user_id: asset.user_id,
            album_id: asset.album_id,
            kind: asset.kind,
            url: asset.url,
            derived_url: None,
            name: asset.name,
            size: asset.size,
            kind_tag: asset.kind_tag,
            visibility: asset.visibility,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
            capture: None,
            duration_secs: None,
        };
        self.assets
            .lock()
            .unwrap()
            .insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        Ok(self.assets.lock().unwrap().get(&id).cloned())
    }

    async fn get_owned(&self, user_id: i64, id: Uuid) -> Result<Option<Asset>, AppError> {
        Ok(self
            .assets
            .lock()
            .unwrap()
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn used_bytes(&self, user_id: i64, kind: AssetKind) -> Result<i64, AppError> {
        Ok(self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id && a.kind == kind && !a.deleted)
            .map(|a| a.size)
            .sum())
    }

    async fn soft_delete(&self, user_id: i64, id: Uuid) -> Result<Asset, AppError> {
        let mut assets = self.assets.lock().unwrap();
        match assets.get_mut(&id) {
            Some(a) if a.user_id == user_id && !a.deleted => {
                a.deleted = true;
                a.deleted_at = Some(Utc::now());
                a.updated_at = Utc::now();
                Ok(a.clone())
            }
            _ => Err(AppError::NotFound(format!("Asset {} not found", id))),
        }
    }

    async fn restore(&self, user_id: i64, id: Uuid) -> Result<Asset, AppError> {
        let mut assets = self.assets.lock().unwrap();
        match assets.get_mut(&id) {
            Some(a) if a.user_id == user_id && a.deleted => {
                a.deleted = false;
                a.deleted_at = None;
                a.updated_at = Utc::now();
                Ok(a.clone())
            }
            _ => Err(AppError::NotFound(format!(
                "Asset {} not in recycle bin",
                id
            ))),
        }
    }

    async fn list_deleted(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Asset>, AppError> {
        let mut deleted: Vec<Asset> = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id && a.deleted)
            .cloned()
            .collect();
        deleted.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(deleted
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_expired_deleted(&self, cutoff: DateTime<Utc>) -> Result<Vec<Asset>, AppError> {
        let mut expired: Vec<Asset> = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.deleted && a.deleted_at.map(|t| t <= cutoff).unwrap_or(false))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.deleted_at.cmp(&b.deleted_at));
        Ok(expired)
    }

    async fn purge(&self, id: Uuid) -> Result<bool, AppError> {
        let mut assets = self.assets.lock().unwrap();
        match assets.get(&id) {
            Some(a) if a.deleted => {
                assets.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_enrichment(&self, id: Uuid, update: EnrichmentUpdate) -> Result<(), AppError> {
        if update.is_empty() {
            return Ok(());
        }
        let mut assets = self.assets.lock().unwrap();
        if let Some(a) = assets.get_mut(&id) {
            if a.derived_url.is_none() {
                a.derived_url = update.derived_url;
            }
            if a.capture.is_none() {
                a.capture = update.capture;
            }
            if a.duration_secs.is_none() {
                a.duration_secs = update.duration_secs;
            }
            a.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryConfigRepository {
    entries: Arc<Mutex<HashMap<(Option<i64>, String), String>>>,
}

impl MemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value directly, without going through `upsert`.
    pub fn seed(&self, user_id: Option<i64>, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert((user_id, key.to_string()), value.to_string());
    }
}

#[async_trait]
impl ConfigRepository for MemoryConfigRepository {
    async fn get(&self, user_id: Option<i64>, key: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(user_id, key.to_string()))
            .cloned())
    }

    async fn list(&self, user_id: Option<i64>) -> Result<Vec<ConfigEntry>, AppError> {
        let mut entries: Vec<ConfigEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|((owner, key), value)| ConfigEntry {
                user_id: *owner,
                config_key: key.clone(),
                config_value: value.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.config_key.cmp(&b.config_key));
        Ok(entries)
    }

    async fn upsert(&self, user_id: Option<i64>, key: &str, value: &str) -> Result<(), AppError> {
        self.entries
            .lock()
            .unwrap()
            .insert((user_id, key.to_string()), value.to_string());
        Ok(())
    }
}
