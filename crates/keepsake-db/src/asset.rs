use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_core::models::{Asset, AssetKind, AssetRow, CaptureInfo, Visibility};
use keepsake_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Fields needed to insert a new asset row. The id is assigned by the
/// caller so the storage path and the row share the same identifier.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub id: Uuid,
    pub user_id: i64,
    pub album_id: Option<i64>,
    pub kind: AssetKind,
    pub url: String,
    pub name: String,
    pub size: i64,
    pub kind_tag: String,
    pub visibility: Visibility,
}

/// Enrichment results to merge into an existing row. Every field is
/// optional; a `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentUpdate {
    pub derived_url: Option<String>,
    pub capture: Option<CaptureInfo>,
    pub duration_secs: Option<i64>,
}

impl EnrichmentUpdate {
    pub fn is_empty(&self) -> bool {
        self.derived_url.is_none() && self.capture.is_none() && self.duration_secs.is_none()
    }
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn create(&self, asset: NewAsset) -> Result<Asset, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Asset>, AppError>;

    /// Fetch a row only if it belongs to `user_id`.
    async fn get_owned(&self, user_id: i64, id: Uuid) -> Result<Option<Asset>, AppError>;

    /// Sum of `size` over the user's non-deleted assets of one kind.
    async fn used_bytes(&self, user_id: i64, kind: AssetKind) -> Result<i64, AppError>;

    /// Move an asset into the recycle bin. Already-deleted rows are left
    /// as they are so the original deletion timestamp is preserved.
    async fn soft_delete(&self, user_id: i64, id: Uuid) -> Result<Asset, AppError>;

    /// Bring an asset back out of the recycle bin.
    async fn restore(&self, user_id: i64, id: Uuid) -> Result<Asset, AppError>;

    async fn list_deleted(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Asset>, AppError>;

    /// Recycled assets whose `deleted_at` is at or before `cutoff`.
    async fn list_expired_deleted(&self, cutoff: DateTime<Utc>) -> Result<Vec<Asset>, AppError>;

    /// Permanently remove a recycled row. Returns `false` when the row no
    /// longer exists or was restored since it was listed, in which case the
    /// restore wins and the row survives.
    async fn purge(&self, id: Uuid) -> Result<bool, AppError>;

    /// Merge enrichment outputs into the row. Each column is written at
    /// most once; a value already present is never overwritten.
    async fn apply_enrichment(&self, id: Uuid, update: EnrichmentUpdate) -> Result<(), AppError>;
}

/// Postgres-backed asset repository.
#[derive(Clone)]
pub struct PgAssetRepository {
    pool: PgPool,
}

impl PgAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetRepository for PgAssetRepository {
    #[tracing::instrument(skip(self, asset), fields(db.table = "assets", db.operation = "insert", asset_id = %asset.id))]
    async fn create(&self, asset: NewAsset) -> Result<Asset, AppError> {
        let now = Utc::now();

        let row: AssetRow = sqlx::query_as::<Postgres, AssetRow>(
            r#"
            INSERT INTO assets (
                id, user_id, album_id, kind,
                url, derived_url, name, size, kind_tag, visibility,
                created_at, updated_at, deleted, deleted_at,
                capture, duration_secs
            )
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, $8, $9, $10, $10, FALSE, NULL, NULL, NULL)
            RETURNING *
            "#,
        )
        .bind(asset.id)
        .bind(asset.user_id)
        .bind(asset.album_id)
        .bind(asset.kind)
        .bind(&asset.url)
        .bind(&asset.name)
        .bind(asset.size)
        .bind(&asset.kind_tag)
        .bind(asset.visibility)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_asset())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        let row: Option<AssetRow> =
            sqlx::query_as::<Postgres, AssetRow>("SELECT * FROM assets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(AssetRow::into_asset))
    }

    async fn get_owned(&self, user_id: i64, id: Uuid) -> Result<Option<Asset>, AppError> {
        let row: Option<AssetRow> = sqlx::query_as::<Postgres, AssetRow>(
            "SELECT * FROM assets WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AssetRow::into_asset))
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "select"))]
    async fn used_bytes(&self, user_id: i64, kind: AssetKind) -> Result<i64, AppError> {
        let used: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(size), 0)::BIGINT
            FROM assets
            WHERE user_id = $1 AND kind = $2 AND deleted = FALSE
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(used)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update", asset_id = %id))]
    async fn soft_delete(&self, user_id: i64, id: Uuid) -> Result<Asset, AppError> {
        let row: Option<AssetRow> = sqlx::query_as::<Postgres, AssetRow>(
            r#"
            UPDATE assets
            SET deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AssetRow::into_asset)
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update", asset_id = %id))]
    async fn restore(&self, user_id: i64, id: Uuid) -> Result<Asset, AppError> {
        let row: Option<AssetRow> = sqlx::query_as::<Postgres, AssetRow>(
            r#"
            UPDATE assets
            SET deleted = FALSE, deleted_at = NULL, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted = TRUE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AssetRow::into_asset)
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not in recycle bin", id)))
    }

    async fn list_deleted(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Asset>, AppError> {
        let rows: Vec<AssetRow> = sqlx::query_as::<Postgres, AssetRow>(
            r#"
            SELECT * FROM assets
            WHERE user_id = $1 AND deleted = TRUE
            ORDER BY deleted_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AssetRow::into_asset).collect())
    }

    async fn list_expired_deleted(&self, cutoff: DateTime<Utc>) -> Result<Vec<Asset>, AppError> {
        let rows: Vec<AssetRow> = sqlx::query_as::<Postgres, AssetRow>(
            r#"
            SELECT * FROM assets
            WHERE deleted = TRUE AND deleted_at <= $1
            ORDER BY deleted_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AssetRow::into_asset).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "delete", asset_id = %id))]
    async fn purge(&self, id: Uuid) -> Result<bool, AppError> {
        // The deleted = TRUE guard makes a concurrent restore win the row.
        let result = sqlx::query("DELETE FROM assets WHERE id = $1 AND deleted = TRUE")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "assets", db.operation = "update", asset_id = %id))]
    async fn apply_enrichment(&self, id: Uuid, update: EnrichmentUpdate) -> Result<(), AppError> {
        if update.is_empty() {
            return Ok(());
        }

        let capture_json = match &update.capture {
            Some(info) => Some(serde_json::to_value(info)?),
            None => None,
        };

        // COALESCE keeps any already-written value, so each column is
        // effectively write-once.
        sqlx::query(
            r#"
            UPDATE assets
            SET derived_url = COALESCE(derived_url, $2),
                capture = COALESCE(capture, $3),
                duration_secs = COALESCE(duration_secs, $4),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.derived_url)
        .bind(capture_json)
        .bind(update.duration_secs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
